//! Logging utility functions
//!
//! This module provides utility functions for the logging system.

/// Initialize the logging system
///
/// # Arguments
///
/// * `level` - Log level
pub fn init_logger(level: &str) {
    // First check TLSWEDGE_LOG_LEVEL environment variable
    let log_level = std::env::var("TLSWEDGE_LOG_LEVEL").unwrap_or_else(|_| level.to_string());

    // If log_level doesn't contain a module name, scope it to this crate
    let log_level = if !log_level.contains('=') && !log_level.is_empty() {
        format!("tlswedge={}", log_level)
    } else {
        log_level
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", &log_level);

    // Try to initialize the logger, but don't panic if it's already initialized
    if let Err(e) = env_logger::try_init_from_env(env) {
        eprintln!("Failed to initialize logger: {}", e);
    } else {
        log::debug!("Logger initialized with level: {}", log_level);
    }
}

/// Map a `DebugLevel` config value to a log level string.
///
/// Levels 2-4 select increasingly fine debug output; anything else is
/// rejected by the caller.
pub fn debug_level_to_filter(level: &str) -> Option<&'static str> {
    match level {
        "2" => Some("debug"),
        "3" | "4" => Some("trace"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger() {
        // This test might affect other tests since it initializes the
        // global logger, so we just ensure the function doesn't crash.
        init_logger("debug");
    }

    #[test]
    fn test_debug_level_mapping() {
        assert_eq!(debug_level_to_filter("2"), Some("debug"));
        assert_eq!(debug_level_to_filter("4"), Some("trace"));
        assert_eq!(debug_level_to_filter("5"), None);
    }
}
