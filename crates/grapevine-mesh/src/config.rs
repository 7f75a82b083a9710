//! Gossip node configuration.

use std::time::Duration;

use tracing::warn;

use grapevine_core::Address;

/// Default interval at which fresh info is gossiped to peers.
pub const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_secs(2);

/// Configuration for one gossip node (builder-style).
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Address this node serves gossip on; also its identity on the wire.
    pub node_addr: Address,
    /// Optional human-readable node name, attached to log output.
    pub name: Option<String>,
    /// Bootstrap candidates for joining the network.
    pub bootstrap: Vec<Address>,
    /// Approximate interval for gossiping new information to peers.
    pub interval: Duration,
}

impl GossipConfig {
    /// Create a config with defaults for the node at `node_addr`.
    #[must_use]
    pub const fn new(node_addr: Address) -> Self {
        Self {
            node_addr,
            name: None,
            bootstrap: Vec::new(),
            interval: DEFAULT_GOSSIP_INTERVAL,
        }
    }

    /// Attach a node name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the bootstrap candidates.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: Vec<Address>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Parse a comma-separated `host:port` list into bootstrap candidates.
    /// Invalid entries are logged and skipped.
    #[must_use]
    pub fn with_bootstrap_list(mut self, list: &str) -> Self {
        self.bootstrap = parse_bootstrap_list(list);
        self
    }

    /// Override the gossip interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Parse the `gossip_bootstrap` configuration value: comma-separated
/// `host:port` pairs. Entries that fail to parse are logged and skipped.
#[must_use]
pub fn parse_bootstrap_list(list: &str) -> Vec<Address> {
    let mut addrs = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match Address::parse_tcp(entry) {
            Ok(addr) => addrs.push(addr),
            Err(err) => warn!(%err, "skipping gossip bootstrap address"),
        }
    }
    addrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_two_seconds_and_no_bootstrap() {
        let config = GossipConfig::new(Address::parse_tcp("127.0.0.1:9000").unwrap());
        assert_eq!(config.interval, Duration::from_secs(2));
        assert!(config.bootstrap.is_empty());
        assert!(config.name.is_none());
    }

    #[test]
    fn bootstrap_list_parses_comma_separated_pairs() {
        let addrs = parse_bootstrap_list("127.0.0.1:9000, 127.0.0.1:9001");
        assert_eq!(
            addrs,
            vec![
                Address::parse_tcp("127.0.0.1:9000").unwrap(),
                Address::parse_tcp("127.0.0.1:9001").unwrap(),
            ]
        );
    }

    #[test]
    fn bootstrap_list_skips_invalid_entries() {
        let addrs = parse_bootstrap_list("127.0.0.1:9000,bogus,,127.0.0.1:9001");
        assert_eq!(addrs.len(), 2);
    }

    #[test]
    fn builder_chains() {
        let config = GossipConfig::new(Address::parse_tcp("127.0.0.1:9000").unwrap())
            .with_name("node0")
            .with_bootstrap_list("127.0.0.1:9001")
            .with_interval(Duration::from_millis(50));
        assert_eq!(config.name.as_deref(), Some("node0"));
        assert_eq!(config.bootstrap.len(), 1);
        assert_eq!(config.interval, Duration::from_millis(50));
    }
}
