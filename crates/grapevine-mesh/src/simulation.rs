//! Gossip network simulation harness.
//!
//! Builds an N-node network over the in-memory transport with a compressed
//! gossip interval. Node 0 publishes the node count once and the sentinel
//! every cycle; the caller's callback observes the nodes after each cycle
//! and ends the simulation by returning `false`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use grapevine_core::{Address, KEY_NODE_COUNT, KEY_SENTINEL};

use crate::config::GossipConfig;
use crate::error::{StoreError, TransportError};
use crate::gossip::Gossip;
use crate::mem::MemNetwork;
use crate::transport::RpcTransport;

/// TTL for the simulation's node-count and sentinel infos.
const SIM_INFO_TTL: Duration = Duration::from_secs(3600);

/// First port handed out by a TCP-flavored [`AddrAllocator`].
const SIM_BASE_PORT: u16 = 9000;

/// Address family used for simulated node identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimNetworkKind {
    /// `127.0.0.1:port` identities.
    Tcp,
    /// Synthetic local-socket path identities.
    Unix,
}

/// Hands out unique simulated node addresses.
///
/// The harness takes the allocator as a parameter so two simulations never
/// share address state.
#[derive(Debug)]
pub struct AddrAllocator {
    kind: SimNetworkKind,
    next: u16,
}

impl AddrAllocator {
    /// Create an allocator for the given address family.
    #[must_use]
    pub const fn new(kind: SimNetworkKind) -> Self {
        Self { kind, next: 0 }
    }

    /// Allocate the next unused address.
    pub fn next_addr(&mut self) -> Address {
        self.next += 1;
        match self.kind {
            SimNetworkKind::Tcp => Address::Tcp(SocketAddr::from((
                [127, 0, 0, 1],
                SIM_BASE_PORT + self.next,
            ))),
            SimNetworkKind::Unix => {
                Address::Unix(PathBuf::from(format!("/sim/gossip-{}.sock", self.next)))
            }
        }
    }
}

/// Errors surfaced while driving a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A node failed to start or stop serving.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A simulated publish was rejected.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run `node_count` gossip nodes until `cycle_fn` returns `false`.
///
/// The bootstrap list is the first three node addresses (or all of them for
/// smaller networks). The callback runs once per gossip interval with the
/// cycle number and the nodes, in allocation order.
///
/// # Errors
/// Returns a [`SimulationError`] if a node fails to start or a simulated
/// publish is rejected.
pub async fn simulate_network<F>(
    node_count: usize,
    interval: Duration,
    allocator: &mut AddrAllocator,
    mut cycle_fn: F,
) -> Result<(), SimulationError>
where
    F: FnMut(usize, &[Arc<Gossip>]) -> bool,
{
    info!(node_count, "simulating gossip network");
    let transport: Arc<dyn RpcTransport> = Arc::new(MemNetwork::new());

    let addrs: Vec<Address> = (0..node_count).map(|_| allocator.next_addr()).collect();
    let bootstrap: Vec<Address> = addrs.iter().take(node_count.min(3)).cloned().collect();

    let mut nodes = Vec::with_capacity(node_count);
    for (index, addr) in addrs.iter().enumerate() {
        let config = GossipConfig::new(addr.clone())
            .with_name(format!("node{index}"))
            .with_bootstrap(bootstrap.clone())
            .with_interval(interval);
        let node = Arc::new(Gossip::new(config, Arc::clone(&transport)));
        node.start().await?;
        if index == 0 {
            let count = i64::try_from(node_count).unwrap_or(i64::MAX);
            node.add_info(KEY_NODE_COUNT, count, SIM_INFO_TTL)?;
        }
        nodes.push(node);
    }

    let mut cycle = 0_usize;
    loop {
        tokio::time::sleep(interval).await;
        // Node 0 refreshes the sentinel every cycle.
        let stamp = i64::try_from(cycle).unwrap_or(i64::MAX);
        match nodes[0].add_info(KEY_SENTINEL, stamp, SIM_INFO_TTL) {
            Ok(()) | Err(StoreError::Stale { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        if !cycle_fn(cycle, &nodes) {
            break;
        }
        cycle += 1;
    }

    for node in &nodes {
        node.stop().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_hands_out_unique_tcp_addresses() {
        let mut alloc = AddrAllocator::new(SimNetworkKind::Tcp);
        let a = alloc.next_addr();
        let b = alloc.next_addr();
        assert_ne!(a, b);
        assert!(matches!(a, Address::Tcp(_)));
    }

    #[test]
    fn allocator_hands_out_unique_unix_addresses() {
        let mut alloc = AddrAllocator::new(SimNetworkKind::Unix);
        let a = alloc.next_addr();
        let b = alloc.next_addr();
        assert_ne!(a, b);
        assert!(matches!(a, Address::Unix(_)));
    }

    #[test]
    fn independent_allocators_do_not_share_state() {
        let mut first = AddrAllocator::new(SimNetworkKind::Tcp);
        let mut second = AddrAllocator::new(SimNetworkKind::Tcp);
        assert_eq!(first.next_addr(), second.next_addr());
    }
}
