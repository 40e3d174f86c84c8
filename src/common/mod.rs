//! Common module
//!
//! Shared error types, logging setup, and small filesystem/network
//! helpers used throughout the configuration core.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;

pub use error::{ProxyError, Result};
pub use log::init_logger;
pub use net::{parse_port, parse_sockaddr};
