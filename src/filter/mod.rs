//! Filter policy module
//!
//! Compiles the user-facing rule language into the decision structure
//! consulted on the hot path: `rule` holds the rule model, the grammar
//! parser and the macro expander; `trie` holds the compiled multi-level
//! trie and its evaluator.

pub mod rule;
pub mod trie;

pub use rule::{
    ActionMask, ApplyTo, Axis, FilterRule, LogChannel, LogMask, LogState, MacroTable, Matcher,
    RuleAction, RuleOutcome,
};
pub use trie::{ClientMatch, FilterTrie, FilterVerdict};
