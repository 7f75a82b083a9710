//! Well-known gossip keys.
//!
//! The dotted-key convention reserves everything before the final `.` as the
//! group prefix, so node-ID mappings under [`NODE_ID_PREFIX`] can live in a
//! bounded group while the scalar keys stand alone.

/// Presence of this key signals that a healthy, well-connected partition of
/// the cluster is reachable. Its absence is treated as a partition.
pub const KEY_SENTINEL: &str = "sentinel";

/// Count of nodes in the cluster, used to derive the tolerated hop diameter.
pub const KEY_NODE_COUNT: &str = "node-count";

/// Group prefix for node-ID-to-address mappings.
pub const NODE_ID_PREFIX: &str = "node-id";

/// Key under which a node advertises its ID-to-address mapping.
#[must_use]
pub fn node_id_key(node_id: u64) -> String {
    format!("{NODE_ID_PREFIX}.{node_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_key_lives_under_the_group_prefix() {
        assert_eq!(node_id_key(42), "node-id.42");
        assert!(node_id_key(7).starts_with(NODE_ID_PREFIX));
    }
}
