//! The atomic unit of gossip: one typed, TTL-bounded fact.

use grapevine_core::{Address, InfoValue, ValueError};

/// One fact traded over the gossip network.
///
/// `peer` and `seq` are local bookkeeping: `seq` is assigned by the owning
/// infostore when the info is inserted or updated, and `peer` records which
/// session delivered it. Neither travels on the wire.
#[derive(Debug, Clone)]
pub struct Info {
    /// Dotted key; the text before the last `.` names the owning group.
    pub key: String,
    /// Typed value.
    pub value: InfoValue,
    /// Origination wall time, Unix nanoseconds.
    pub timestamp: i64,
    /// Wall time at which the info expires.
    pub ttl_stamp: i64,
    /// Number of relays since origination.
    pub hops: u32,
    /// Address of the originating node.
    pub origin: Address,
    /// Address the info most recently arrived from.
    pub(crate) peer: Address,
    /// Local sequence watermark, assigned at insert.
    pub(crate) seq: i64,
}

impl Info {
    /// Whether the TTL has passed at `now`.
    #[must_use]
    pub const fn expired(&self, now: i64) -> bool {
        self.ttl_stamp <= now
    }

    /// Whether this info belongs in a delta for `peer` above `since_seq`:
    /// inserted after the watermark, and neither authored by nor received
    /// from that peer.
    pub(crate) fn qualifies_for(&self, peer: &Address, since_seq: i64) -> bool {
        self.seq > since_seq && self.origin != *peer && self.peer != *peer
    }

    /// Value order against another info.
    ///
    /// # Errors
    /// Returns [`ValueError::TypeMismatch`] if the values are not of the same
    /// variant.
    pub fn less_than(&self, other: &Self) -> Result<bool, ValueError> {
        self.value.less_than(&other.value)
    }
}

/// The group prefix of a key: everything before the last `.`, or the empty
/// string for an undotted key.
#[must_use]
pub fn key_prefix(key: &str) -> &str {
    key.rfind('.').map_or("", |idx| &key[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> Address {
        Address::parse_tcp(&format!("127.0.0.1:{port}")).unwrap()
    }

    fn info(key: &str, seq: i64, origin: u16, peer: u16) -> Info {
        Info {
            key: key.to_string(),
            value: InfoValue::from(1),
            timestamp: 100,
            ttl_stamp: 1_000,
            hops: 0,
            origin: addr(origin),
            peer: addr(peer),
            seq,
        }
    }

    // ========================================================================
    // Key prefixes
    // ========================================================================

    #[test]
    fn key_prefix_is_text_before_last_dot() {
        assert_eq!(key_prefix("node-id.7"), "node-id");
        assert_eq!(key_prefix("a.b.c"), "a.b");
        assert_eq!(key_prefix("sentinel"), "");
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    #[test]
    fn expired_at_or_after_ttl_stamp() {
        let i = info("x", 1, 1, 1);
        assert!(!i.expired(999));
        assert!(i.expired(1_000));
        assert!(i.expired(2_000));
    }

    // ========================================================================
    // Delta qualification
    // ========================================================================

    #[test]
    fn qualifies_requires_seq_above_watermark() {
        let i = info("x", 5, 1, 2);
        let other = addr(9);
        assert!(i.qualifies_for(&other, 4));
        assert!(!i.qualifies_for(&other, 5));
    }

    #[test]
    fn never_ships_back_to_author_or_sender() {
        let i = info("x", 5, 1, 2);
        assert!(!i.qualifies_for(&addr(1), 0), "origin is excluded");
        assert!(!i.qualifies_for(&addr(2), 0), "proximate peer is excluded");
        assert!(i.qualifies_for(&addr(3), 0));
    }
}
