//! Network addresses exchanged over the gossip wire.
//!
//! An [`Address`] is a tagged union over the transports a gossip node can be
//! reached on. Both forms serialize with an explicit tag so the wire encoding
//! stays self-describing, and both order lexicographically by their canonical
//! string form, which is the order used by the redundant-link tie-break.

use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error parsing a textual peer address.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The input is not a valid `host:port` pair.
    #[error("invalid peer address {input:?}: {reason}")]
    Invalid {
        /// Offending input text.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Network address of a gossip node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "addr", rename_all = "snake_case")]
pub enum Address {
    /// TCP endpoint (`ip:port`).
    Tcp(SocketAddr),
    /// Local (Unix domain) socket path.
    Unix(PathBuf),
}

impl Address {
    /// Parse a `host:port` pair into a TCP address.
    ///
    /// # Errors
    /// Returns [`AddressError::Invalid`] if the input does not parse as a
    /// socket address.
    pub fn parse_tcp(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        trimmed
            .parse::<SocketAddr>()
            .map(Self::Tcp)
            .map_err(|err| AddressError::Invalid {
                input: trimmed.to_string(),
                reason: err.to_string(),
            })
    }

    /// Canonical string form, used for display and ordering.
    #[must_use]
    pub fn canonical(&self) -> String {
        match self {
            Self::Tcp(addr) => addr.to_string(),
            Self::Unix(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

// Ordering is lexicographic on the canonical string form. The tie-break that
// resolves mutual client connections depends on every node agreeing on this
// order regardless of address kind.
impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn parse_tcp_accepts_host_port() {
        let addr = Address::parse_tcp("127.0.0.1:9000").unwrap();
        assert_eq!(addr, Address::Tcp("127.0.0.1:9000".parse().unwrap()));
    }

    #[test]
    fn parse_tcp_trims_whitespace() {
        let addr = Address::parse_tcp("  127.0.0.1:9000 ").unwrap();
        assert_eq!(addr.canonical(), "127.0.0.1:9000");
    }

    #[test]
    fn parse_tcp_rejects_garbage() {
        let err = Address::parse_tcp("not-an-address").unwrap_err();
        assert!(matches!(err, AddressError::Invalid { .. }));
    }

    // ========================================================================
    // Ordering and display
    // ========================================================================

    #[test]
    fn ordering_is_lexicographic_on_canonical_form() {
        let a = Address::parse_tcp("127.0.0.1:9000").unwrap();
        let b = Address::parse_tcp("127.0.0.1:9001").unwrap();
        assert!(a < b);

        // "127.0.0.1:10000" sorts before "127.0.0.1:9000" lexicographically.
        let c = Address::parse_tcp("127.0.0.1:10000").unwrap();
        assert!(c < a);
    }

    #[test]
    fn unix_and_tcp_share_one_order() {
        let tcp = Address::parse_tcp("127.0.0.1:9000").unwrap();
        let unix = Address::Unix(PathBuf::from("/tmp/gossip-0.sock"));
        // '/' (0x2f) sorts before '1' (0x31).
        assert!(unix < tcp);
    }

    #[test]
    fn display_matches_canonical() {
        let addr = Address::Unix(PathBuf::from("/tmp/node.sock"));
        assert_eq!(addr.to_string(), "/tmp/node.sock");
    }

    // ========================================================================
    // Serde
    // ========================================================================

    #[test]
    fn serde_roundtrip_is_tagged() {
        let addr = Address::parse_tcp("10.0.0.1:26257").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.contains("tcp"));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
