//! Configuration module
//!
//! This module handles the startup configuration: the per-scope option
//! set, proxy specifications, and the global configuration root with its
//! line/block config-file grammar and `key=value` command line overrides.

pub mod defaults;
pub mod global;
pub mod opts;
pub mod spec;

pub use global::{Global, LeafCert, LoadState};
pub use opts::{CertStore, OptionSet, TlsSelection, TlsVersion, TlsVersionSet, UserList};
pub use spec::{DestMode, Proto, ProxySpec};
