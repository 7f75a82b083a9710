//! Simulation harness smoke tests.

use std::time::Duration;

use grapevine_mesh::{
    simulate_network, AddrAllocator, SimNetworkKind, KEY_NODE_COUNT, KEY_SENTINEL,
};

#[tokio::test]
async fn five_node_network_converges_on_the_sentinel() {
    let mut allocator = AddrAllocator::new(SimNetworkKind::Tcp);
    let mut converged_at = None;

    simulate_network(
        5,
        Duration::from_millis(50),
        &mut allocator,
        |cycle, nodes| {
            let all_have_sentinel = nodes
                .iter()
                .all(|node| node.get_info(KEY_SENTINEL).is_ok());
            if all_have_sentinel && converged_at.is_none() {
                converged_at = Some(cycle);
            }
            // Run a few extra cycles after convergence, give up after 60.
            converged_at.is_none() && cycle < 60
        },
    )
    .await
    .unwrap();

    assert!(
        converged_at.is_some(),
        "sentinel never reached every simulated node"
    );
}

#[tokio::test]
async fn unix_flavored_simulation_converges_on_the_node_count() {
    let mut allocator = AddrAllocator::new(SimNetworkKind::Unix);
    let mut converged = false;

    simulate_network(
        3,
        Duration::from_millis(50),
        &mut allocator,
        |cycle, nodes| {
            converged = nodes
                .iter()
                .all(|node| matches!(node.get_info(KEY_NODE_COUNT), Ok(v) if v.as_i64() == Some(3)));
            !converged && cycle < 60
        },
    )
    .await
    .unwrap();

    assert!(converged, "node count never reached every simulated node");
}
