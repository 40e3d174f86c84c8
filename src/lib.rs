//! tlswedge: transparent TLS/TCP interception proxy core
//!
//! This library implements the configuration and filter-policy engine of
//! a transparent interception proxy. It parses proxy specifications
//! (listener, protocol, destination resolution strategy), compiles the
//! filter rule mini-language with macro expansion into a multi-level
//! decision trie, and freezes the result into an immutable configuration
//! root shared with every connection handler.
//!
//! # Example
//!
//! ```no_run
//! use tlswedge::config::{Global, LoadState};
//!
//! fn main() -> tlswedge::Result<()> {
//!     let mut global = Global::new();
//!     let mut natengine = None;
//!     let mut state = LoadState::default();
//!
//!     global.load_conffile("tlswedge.conf", &mut natengine, &mut state)?;
//!     global.set_option_kv("Debug=yes", &mut natengine, &mut state)?;
//!
//!     let frozen = global.freeze()?;
//!     for spec in &frozen.specs {
//!         println!("{}", spec);
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod filter;
pub mod nat;

// Re-export commonly used structures and functions for convenience
pub use common::{ProxyError, Result};
pub use config::{Global, OptionSet, ProxySpec};
pub use filter::{ClientMatch, FilterTrie, FilterVerdict};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
