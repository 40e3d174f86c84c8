//! Default configuration values
//!
//! This module centralizes all default values and accepted ranges in one
//! place, for both the global configuration and the per-scope option set.

use crate::config::opts::TlsVersion;

/// Default state of the divert flag: divert mode is on until a spec turns
/// out to have no divert address.
pub fn divert() -> bool {
    true
}

/// SSL/TLS compression is enabled unless configured off.
pub fn sslcomp() -> bool {
    true
}

/// The HTTP Referer header is removed by default.
pub fn remove_http_referer() -> bool {
    true
}

/// Upstream peer certificates are verified by default.
pub fn verify_peer() -> bool {
    true
}

/// Default user authentication idle timeout in seconds.
pub fn user_timeout() -> u32 {
    300
}

/// Default maximum HTTP header size in bytes.
pub fn max_http_header_size() -> u32 {
    8192
}

/// Lowest TLS protocol version enabled by default.
pub fn min_tls() -> TlsVersion {
    TlsVersion::Tls10
}

/// Highest TLS protocol version supported.
pub fn max_tls() -> TlsVersion {
    TlsVersion::Tls13
}

/// Default RSA key size for forged leaf certificates.
pub fn leafkey_rsabits() -> u32 {
    2048
}

/// Default connection idle timeout in seconds.
pub fn conn_idle_timeout() -> u32 {
    120
}

/// Default period for expired connection checks in seconds.
pub fn expired_conn_check_period() -> u32 {
    10
}

/// Default statistics logging period in seconds.
pub fn stats_period() -> u32 {
    1
}

/// Default divert and return address for split-path specs.
pub const LOOPBACK_ADDR: &str = "127.0.0.1";

/// Accepted range for `UserTimeout`.
pub const USER_TIMEOUT_RANGE: (u32, u32) = (0, 86400);

/// Accepted range for `MaxHTTPHeaderSize`.
pub const MAX_HTTP_HEADER_SIZE_RANGE: (u32, u32) = (1024, 65536);

/// Accepted range for `ConnIdleTimeout`.
pub const CONN_IDLE_TIMEOUT_RANGE: (u32, u32) = (10, 3600);

/// Accepted range for `ExpiredConnCheckPeriod`.
pub const EXPIRED_CONN_CHECK_PERIOD_RANGE: (u32, u32) = (10, 60);

/// Accepted range for `StatsPeriod`.
pub const STATS_PERIOD_RANGE: (u32, u32) = (1, 10);

/// Accepted range for `OpenFilesLimit`.
pub const OPEN_FILES_LIMIT_RANGE: (u32, u32) = (50, 10000);

/// Accepted values for `LeafKeyRSABits`.
pub const LEAFKEY_RSABITS_VALUES: [u32; 4] = [1024, 2048, 3072, 4096];

/// Maximum number of users accepted in a DivertUsers/PassUsers list.
pub const MAX_USERS: usize = 50;

/// Maximum number of tokens in a single-line proxyspec.
pub const MAX_SPEC_TOKENS: usize = 8;
