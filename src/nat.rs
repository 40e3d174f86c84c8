//! NAT engine registry
//!
//! The actual NAT state table lookups live outside this crate; the
//! configuration parser only needs to know which engine names exist on
//! this platform so it can validate proxyspecs and pick a default.

#[cfg(target_os = "linux")]
const ENGINES: &[&str] = &["netfilter", "tproxy"];

#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd"))]
const ENGINES: &[&str] = &["pf", "ipfw"];

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd"
)))]
const ENGINES: &[&str] = &[];

/// Whether a NAT engine with this name is available.
pub fn exists(name: &str) -> bool {
    ENGINES.contains(&name)
}

/// The platform default NAT engine, if any.
pub fn default_engine() -> Option<&'static str> {
    ENGINES.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        assert!(!exists("no-such-engine"));
        if let Some(engine) = default_engine() {
            assert!(exists(engine));
        }
    }
}
