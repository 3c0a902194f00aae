//! Remote endpoint addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::RpcError;

/// Identifies a remote endpoint by host and port.
///
/// Addresses are plain values: two addresses are the same endpoint exactly
/// when host and port compare equal, which makes them usable as cache keys.
/// No DNS resolution happens here; that is left to the connector.
///
/// # Example
///
/// ```
/// use rpclink_common::Address;
///
/// let address: Address = "localhost:4801".parse().unwrap();
/// assert_eq!(address, Address::new("localhost", 4801));
/// assert_eq!(address.to_string(), "localhost:4801");
///
/// let v6: Address = "[::1]:4801".parse().unwrap();
/// assert_eq!(v6.host, "::1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Address {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| RpcError::InvalidAddress(format!("'{}' is missing a port", s)))?;

        let host = match host.strip_prefix('[') {
            Some(rest) => rest.strip_suffix(']').ok_or_else(|| {
                RpcError::InvalidAddress(format!("'{}' has an unterminated IPv6 host", s))
            })?,
            None if host.contains(':') => {
                return Err(RpcError::InvalidAddress(format!(
                    "'{}' must bracket an IPv6 host",
                    s
                )))
            }
            None => host,
        };

        if host.is_empty() {
            return Err(RpcError::InvalidAddress(format!("'{}' has an empty host", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| RpcError::InvalidAddress(format!("'{}' has an invalid port: {}", s, e)))?;

        Ok(Self::new(host, port))
    }
}

impl From<std::net::SocketAddr> for Address {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_port() {
        let address: Address = "example.com:8080".parse().unwrap();
        assert_eq!(address.host, "example.com");
        assert_eq!(address.port, 8080);
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let address: Address = "[fe80::1]:9000".parse().unwrap();
        assert_eq!(address.host, "fe80::1");
        assert_eq!(address.to_string(), "[fe80::1]:9000");
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        assert!(matches!(
            "example.com".parse::<Address>(),
            Err(RpcError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!("example.com:http".parse::<Address>().is_err());
        assert!("example.com:70000".parse::<Address>().is_err());
    }

    #[test]
    fn test_parse_rejects_unbracketed_ipv6() {
        assert!("fe80::1:9000".parse::<Address>().is_err());
    }

    #[test]
    fn test_parse_rejects_empty_host() {
        assert!(":9000".parse::<Address>().is_err());
    }

    #[test]
    fn test_from_socket_addr() {
        let socket: std::net::SocketAddr = "127.0.0.1:4801".parse().unwrap();
        assert_eq!(Address::from(socket), Address::new("127.0.0.1", 4801));
    }

    #[test]
    fn test_serde_as_string() {
        let address = Address::new("node-1", 4801);
        let value = serde_json::to_value(&address).unwrap();
        assert_eq!(value, serde_json::json!("node-1:4801"));

        let back: Address = serde_json::from_value(value).unwrap();
        assert_eq!(back, address);
    }
}
