//! Network utility functions
//!
//! This module provides utility functions for parsing listen, target,
//! divert and return addresses out of the configuration. Name resolution
//! is deliberately not performed here: proxyspec addresses are IP
//! literals, and anything else is a configuration error.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use super::error::{ProxyError, Result};

/// Parse an IP literal and a port string into a socket address.
///
/// # Arguments
///
/// * `addr` - IP address literal (IPv4 or IPv6)
/// * `port` - Port number string
pub fn parse_sockaddr(addr: &str, port: &str, line: u32) -> Result<SocketAddr> {
    let ip = IpAddr::from_str(addr).map_err(|_| ProxyError::ConfigValue {
        line,
        option: "address".to_string(),
        msg: format!("'{}' is not an IP address", addr),
    })?;
    let port = parse_port(port, line)?;
    Ok(SocketAddr::new(ip, port))
}

/// Parse a non-zero port number.
pub fn parse_port(port: &str, line: u32) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ProxyError::ConfigValue {
            line,
            option: "port".to_string(),
            msg: format!("invalid port '{}'", port),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sockaddr() {
        let addr = parse_sockaddr("127.0.0.1", "8080", 0).unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.is_ipv4());

        let addr = parse_sockaddr("::1", "8443", 0).unwrap();
        assert!(addr.is_ipv6());

        assert!(parse_sockaddr("not-an-ip", "80", 0).is_err());
        assert!(parse_sockaddr("127.0.0.1", "0", 0).is_err());
        assert!(parse_sockaddr("127.0.0.1", "99999", 0).is_err());
    }
}
