//! Error handling module
//!
//! This module defines the error types and result type alias used in the
//! application. Every failure produced while parsing configuration or
//! compiling filter policy maps to a distinct variant, so the startup
//! driver can print one diagnostic line and exit.

use thiserror::Error;
use std::io;

/// tlswedge error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Unrecognized directive or malformed name/value pair
    #[error("syntax error on line {line}: {msg}")]
    ConfigSyntax { line: u32, msg: String },

    /// Option value out of range or of the wrong shape
    #[error("invalid {option} on line {line}: {msg}")]
    ConfigValue { line: u32, option: String, msg: String },

    /// Structured proxyspec missing a required address/port
    #[error("incomplete proxyspec on line {line}")]
    ProxySpecIncomplete { line: u32 },

    /// Filter rule references a macro that was never defined
    #[error("undefined macro '{name}' on line {line}")]
    MacroUndefined { line: u32, name: String },

    /// Macro defined twice
    #[error("macro '{name}' redefined on line {line}")]
    MacroRedefined { line: u32, name: String },

    /// User or keyword filter clause without user authentication enabled
    #[error("user filter requires user auth (line {line})")]
    UserAuthRequired { line: u32 },

    /// Proxyspec protocol tag not recognized
    #[error("unknown connection type '{token}'")]
    UnknownProtocol { token: String },

    /// NAT engine name not registered on this platform
    #[error("no such nat engine '{token}'")]
    UnknownNatEngine { token: String },

    /// Include directive used from within an included file
    #[error("Include not allowed in include files (line {line})")]
    IncludeRecursion { line: u32 },

    /// Allocation or setrlimit failure
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Certificate, key or DH parameters could not be loaded
    #[error("failed to load crypto material from '{path}': {msg}")]
    CryptoLoad { path: String, msg: String },
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// Build a `ConfigValue` error in the message style used throughout
    /// the config parser: the offending value followed by the accepted
    /// bounds.
    pub(crate) fn value(line: u32, option: &str, value: &str, bounds: &str) -> Self {
        ProxyError::ConfigValue {
            line,
            option: option.to_string(),
            msg: format!("'{}', use {}", value, bounds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let proxy_err: ProxyError = io_err.into();

        match proxy_err {
            ProxyError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::value(12, "UserTimeout", "90000", "0-86400");
        let err_str = format!("{}", err);
        assert!(err_str.contains("UserTimeout"));
        assert!(err_str.contains("90000"));
        assert!(err_str.contains("line 12"));

        let err = ProxyError::MacroUndefined { line: 3, name: "$ips".to_string() };
        assert!(format!("{}", err).contains("$ips"));
    }
}
