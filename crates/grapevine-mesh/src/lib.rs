//! Grapevine Mesh - the gossip subsystem of a distributed database.
//!
//! Cluster nodes exchange small, typed, TTL-bounded facts ("infos") over a
//! peer-to-peer epidemic protocol. Facts originate at one node and reach
//! every other node within a bounded hop count while the overlay continuously
//! retightens itself toward near-optimal fan-out.
//!
//! The pieces:
//! - [`store::InfoStore`]: versioned, TTL-aware store of facts with
//!   sequence-number deltas, bounded aggregation groups, and hop tracking
//! - [`gossip::Gossip`]: the coordinator; runs the bootstrap and manage
//!   loops and exposes the local key/value surface (publish, read, group
//!   queries, prefix subscriptions)
//! - the peer client and server driving the pairwise exchange protocol
//! - [`transport`]: the narrow RPC seam the core consumes, with socket and
//!   in-memory implementations
//! - [`simulation`]: an N-node in-process network harness

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod addrset;
mod client;
pub mod config;
pub mod error;
pub mod group;
pub mod info;
pub mod mem;
pub mod protocol;
mod server;
pub mod simulation;
pub mod store;
pub mod transport;

pub mod gossip;

pub use addrset::AddressSet;
pub use config::{parse_bootstrap_list, GossipConfig, DEFAULT_GOSSIP_INTERVAL};
pub use error::{ClientError, StoreError, TransportError};
pub use gossip::{Gossip, PrefixCallbackFn, MAX_PEERS};
pub use group::{GroupKind, GroupSpec};
pub use info::{key_prefix, Info};
pub use mem::MemNetwork;
pub use simulation::{simulate_network, AddrAllocator, SimNetworkKind, SimulationError};
pub use store::InfoStore;
pub use transport::{GossipHandler, RpcConnection, RpcTransport, ServerHandle, TcpTransport};

// Re-export the core vocabulary so most users need only this crate.
pub use grapevine_core::{
    node_id_key, Address, InfoValue, Ordered, ValueError, KEY_NODE_COUNT, KEY_SENTINEL,
    NODE_ID_PREFIX,
};
