//! The gossip coordinator.
//!
//! Each node contacts peer nodes to gather all infos in the system with
//! minimal total hops:
//!
//! 1. On start, the node serves the gossip protocol and selects a random
//!    peer from the bootstrap list (excluding itself) for its first outgoing
//!    client.
//! 2. Each outgoing client exchanges infostore deltas with its peer,
//!    crediting the peer for fresh info and cutting it off when it stops
//!    producing any. If the node loses its last outgoing connection, or the
//!    sentinel info disappears, the bootstrap loop is woken to try again.
//! 3. The manage loop periodically looks for infos that arrived over too
//!    many hops and tightens the overlay: it either opens a client directly
//!    to the distant originator or, at the fan-out bound, closes the least
//!    useful existing client to make room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tracing::{info, warn};

use grapevine_core::{Address, InfoValue, KEY_NODE_COUNT, KEY_SENTINEL};

use crate::addrset::AddressSet;
use crate::client::PeerClient;
use crate::config::GossipConfig;
use crate::error::{StoreError, TransportError};
use crate::group::GroupKind;
use crate::server::PeerServer;
use crate::store::InfoStore;
use crate::transport::{RpcTransport, ServerHandle};

/// Maximum number of connected gossip peers in each direction.
pub const MAX_PEERS: usize = 10;

/// Node count assumed before the cluster gossips its real size under
/// [`KEY_NODE_COUNT`]. Set purposefully high to avoid premature tightening
/// while the network is still forming.
const DEFAULT_NODE_COUNT: i64 = 1000;

/// Callback invoked for accepted infos matching a registered prefix.
pub type PrefixCallbackFn = Box<dyn Fn(&str, &InfoValue) + Send + Sync>;

struct PrefixCallback {
    prefix: String,
    func: PrefixCallbackFn,
}

/// Coordinator-side handle on a running peer client.
pub(crate) struct ClientHandle {
    close_tx: oneshot::Sender<()>,
}

impl ClientHandle {
    /// Flip the client's one-shot close signal.
    pub(crate) fn close(self) {
        let _ = self.close_tx.send(());
    }
}

/// The mutex-protected coordinator state bundle. Everything structural lives
/// under one lock; the lock is never held across I/O.
pub(crate) struct State {
    pub(crate) store: InfoStore,
    pub(crate) bootstraps: AddressSet,
    pub(crate) incoming: AddressSet,
    pub(crate) outgoing: AddressSet,
    pub(crate) clients: HashMap<Address, ClientHandle>,
    pub(crate) closed: bool,
    has_connected: bool,
}

impl State {
    /// Addresses from `candidates` not already connected in either
    /// direction.
    fn filter_extant(&self, candidates: &AddressSet) -> AddressSet {
        candidates.filter(|addr| !self.outgoing.contains(addr) && !self.incoming.contains(addr))
    }
}

/// State and signals shared by the coordinator loops, the peer server, and
/// every peer client.
pub(crate) struct Shared {
    pub(crate) node_addr: Address,
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) transport: Arc<dyn RpcTransport>,
    pub(crate) state: Mutex<State>,
    /// Condition signalled when bootstrap is needed; waiters re-check the
    /// predicate after waking.
    pub(crate) stalled: Notify,
    connected_tx: watch::Sender<bool>,
    pub(crate) disconnected_tx: mpsc::Sender<PeerClient>,
    callbacks: Mutex<Vec<PrefixCallback>>,
}

impl Shared {
    /// Invoke registered prefix callbacks for freshly accepted infos.
    /// Callers must not hold the state lock.
    pub(crate) fn run_callbacks(&self, fresh: &[(String, InfoValue)]) {
        if fresh.is_empty() {
            return;
        }
        let callbacks = self.callbacks.lock();
        for (key, value) in fresh {
            for callback in callbacks.iter() {
                if key.starts_with(&callback.prefix) {
                    (callback.func)(key, value);
                }
            }
        }
    }

    /// Launch a new client to `addr` and account for it in the outgoing set.
    pub(crate) fn start_client(self: &Arc<Self>, state: &mut State, addr: Address) {
        if state.closed || addr == self.node_addr || state.clients.contains_key(&addr) {
            return;
        }
        if !state.outgoing.add(addr.clone()) {
            return;
        }
        let (close_tx, close_rx) = oneshot::channel();
        state.clients.insert(addr.clone(), ClientHandle { close_tx });
        let client = PeerClient::new(addr, close_rx);
        tokio::spawn(client.run(Arc::clone(self)));
    }
}

/// Uniform random duration in roughly `[0.5, 1.5] ×` the gossip interval.
pub(crate) fn jittered(interval: Duration) -> Duration {
    interval.mul_f64(rand::thread_rng().gen_range(0.5..1.5))
}

/// An instance of a gossip node.
///
/// Owns the infostore and the peer topology; exposes the local key/value
/// surface (publish, read, group queries, prefix subscriptions).
pub struct Gossip {
    shared: Arc<Shared>,
    connected_rx: watch::Receiver<bool>,
    disconnected_rx: Mutex<Option<mpsc::Receiver<PeerClient>>>,
    exited_rx: Mutex<Option<oneshot::Receiver<()>>>,
    server: Mutex<Option<ServerHandle>>,
}

impl Gossip {
    /// Create a gossip node from its configuration and transport.
    #[must_use]
    pub fn new(config: GossipConfig, transport: Arc<dyn RpcTransport>) -> Self {
        let (connected_tx, connected_rx) = watch::channel(false);
        let (disconnected_tx, disconnected_rx) = mpsc::channel(MAX_PEERS);

        let mut bootstraps = AddressSet::new(MAX_PEERS);
        for addr in config.bootstrap {
            if addr != config.node_addr {
                bootstraps.add(addr);
            }
        }
        if bootstraps.is_empty() {
            warn!(node = %config.node_addr, "no bootstrap hosts for gossip network");
        }

        let name = config
            .name
            .unwrap_or_else(|| config.node_addr.canonical());
        let shared = Arc::new(Shared {
            node_addr: config.node_addr.clone(),
            name,
            interval: config.interval,
            transport,
            state: Mutex::new(State {
                store: InfoStore::new(config.node_addr),
                bootstraps,
                incoming: AddressSet::new(MAX_PEERS),
                outgoing: AddressSet::new(MAX_PEERS),
                clients: HashMap::new(),
                closed: false,
                has_connected: false,
            }),
            stalled: Notify::new(),
            connected_tx,
            disconnected_tx,
            callbacks: Mutex::new(Vec::new()),
        });

        Self {
            shared,
            connected_rx,
            disconnected_rx: Mutex::new(Some(disconnected_rx)),
            exited_rx: Mutex::new(None),
            server: Mutex::new(None),
        }
    }

    /// Start serving the gossip protocol and launch the bootstrap and
    /// manage loops.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the node address cannot be bound.
    pub async fn start(&self) -> Result<(), TransportError> {
        let server = PeerServer::new(Arc::clone(&self.shared));
        let handle = self
            .shared
            .transport
            .serve(&self.shared.node_addr, Arc::new(server))
            .await?;
        *self.server.lock() = Some(handle);

        let (exited_tx, exited_rx) = oneshot::channel();
        *self.exited_rx.lock() = Some(exited_rx);
        let disconnected_rx = self.disconnected_rx.lock().take();
        if let Some(rx) = disconnected_rx {
            tokio::spawn(manage(Arc::clone(&self.shared), rx, exited_tx));
            tokio::spawn(bootstrap(Arc::clone(&self.shared)));
        }
        Ok(())
    }

    /// Shut the node down: close every outgoing client, wait for the manage
    /// loop to drain, and stop the server.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            for (_, handle) in state.clients.drain() {
                handle.close();
            }
        }
        self.shared.stalled.notify_one();

        let exited = self.exited_rx.lock().take();
        if let Some(rx) = exited {
            let _ = rx.await;
        }
        let server = self.server.lock().take();
        if let Some(handle) = server {
            handle.shutdown().await;
        }
    }

    /// Publish an info into the local store with the given TTL.
    ///
    /// # Errors
    /// Returns [`StoreError::Stale`] or [`StoreError::GroupRejected`] under
    /// the infostore's admission rules.
    pub fn add_info(
        &self,
        key: &str,
        value: impl Into<InfoValue>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let value = value.into();
        {
            let mut state = self.shared.state.lock();
            let info = state.store.new_info(key, value.clone(), ttl);
            state.store.add_info(info)?;
        }
        self.shared
            .run_callbacks(&[(key.to_string(), value)]);
        Ok(())
    }

    /// Read an info value by key.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the key is unknown or expired.
    pub fn get_info(&self, key: &str) -> Result<InfoValue, StoreError> {
        let state = self.shared.state.lock();
        state
            .store
            .get_info(key)
            .map(|info| info.value.clone())
            .ok_or_else(|| StoreError::NotFound {
                name: key.to_string(),
            })
    }

    /// Read all live values of a registered group, in the group's retention
    /// order.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no group is registered at
    /// `prefix`.
    pub fn get_group_infos(&self, prefix: &str) -> Result<Vec<InfoValue>, StoreError> {
        let state = self.shared.state.lock();
        Ok(state
            .store
            .get_group_infos(prefix)?
            .into_iter()
            .map(|info| info.value)
            .collect())
    }

    /// Register a bounded aggregation group.
    ///
    /// # Errors
    /// Returns [`StoreError::AlreadyRegistered`] if the prefix is taken.
    pub fn register_group(
        &self,
        prefix: &str,
        limit: usize,
        kind: GroupKind,
    ) -> Result<(), StoreError> {
        let mut state = self.shared.state.lock();
        state.store.register_group(prefix, limit, kind)
    }

    /// Subscribe to infos by key prefix. The callback runs for every
    /// locally-published or merged info whose key starts with `prefix`,
    /// outside the coordinator lock.
    pub fn register_callback(&self, prefix: &str, func: PrefixCallbackFn) {
        self.shared.callbacks.lock().push(PrefixCallback {
            prefix: prefix.to_string(),
            func,
        });
    }

    /// Maximum number of hops to reach the furthest info currently held.
    #[must_use]
    pub fn max_hops(&self) -> u32 {
        self.shared.state.lock().store.max_hops()
    }

    /// Addresses of peers currently being served.
    #[must_use]
    pub fn incoming(&self) -> Vec<Address> {
        self.shared.state.lock().incoming.as_vec()
    }

    /// Addresses of peers this node is gossiping to. Entries may still be
    /// mid-dial or already failed but not yet reaped.
    #[must_use]
    pub fn outgoing(&self) -> Vec<Address> {
        self.shared.state.lock().outgoing.as_vec()
    }

    /// This node's gossip address.
    #[must_use]
    pub fn node_addr(&self) -> &Address {
        &self.shared.node_addr
    }

    /// Wait for the node's first successful connection to the network.
    /// Fires at most once per node lifetime, even across reconnections.
    pub async fn connected(&self) {
        let mut rx = self.connected_rx.clone();
        let _ = rx.wait_for(|connected| *connected).await;
    }
}

/// Maximum hops the network should exhibit when optimally tightened, from
/// the gossiped node count and the fan-out bound. Doubled plus one to cover
/// distance measured in either direction plus slack.
fn max_tolerated_hops(state: &State) -> u32 {
    let node_count = state
        .store
        .get_info(KEY_NODE_COUNT)
        .and_then(|info| info.value.as_i64())
        .unwrap_or(DEFAULT_NODE_COUNT)
        .max(1);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let diameter = ((node_count as f64).ln() / (MAX_PEERS as f64).ln()).ceil() as u32;
    diameter * 2 + 1
}

/// Bootstrap loop: connect the node to the gossip network whenever it has no
/// outgoing clients or the sentinel info is missing, then block on the
/// stalled condition until connectivity is lost again.
async fn bootstrap(shared: Arc<Shared>) {
    loop {
        {
            let mut state = shared.state.lock();
            if state.closed {
                break;
            }
            let avail = state.filter_extant(&state.bootstraps);
            if !avail.is_empty() {
                let have_clients = !state.outgoing.is_empty();
                let have_sentinel = state.store.get_info(KEY_SENTINEL).is_some();
                if !have_clients || !have_sentinel {
                    if let Some(addr) = avail.select_random() {
                        info!(node = %shared.name, %addr, "bootstrapping gossip network");
                        shared.start_client(&mut state, addr);
                    }
                }
            }
        }
        // Re-check the predicate after every wake.
        shared.stalled.notified().await;
    }
}

/// Manage loop: reap disconnected clients, tighten the overlay toward
/// distant originators, and signal the bootstrap loop when connectivity or
/// the sentinel is lost.
async fn manage(
    shared: Arc<Shared>,
    mut disconnected_rx: mpsc::Receiver<PeerClient>,
    exited_tx: oneshot::Sender<()>,
) {
    loop {
        let exit = tokio::select! {
            maybe_client = disconnected_rx.recv() => {
                let mut state = shared.state.lock();
                if let Some(client) = maybe_client {
                    handle_disconnect(&shared, &mut state, client);
                }
                post_pass(&shared, &mut state)
            }
            () = tokio::time::sleep(jittered(shared.interval)) => {
                let mut state = shared.state.lock();
                tighten_pass(&shared, &mut state);
                post_pass(&shared, &mut state)
            }
        };
        if exit {
            break;
        }
    }
    let _ = exited_tx.send(());
}

/// Take a finished client out of the accounting and follow its forwarding
/// address if one was proposed.
fn handle_disconnect(shared: &Arc<Shared>, state: &mut State, client: PeerClient) {
    if let Some(err) = &client.err {
        warn!(node = %shared.name, addr = %client.addr, %err, "gossip client disconnected");
    }
    state.outgoing.remove(&client.addr);
    state.clients.remove(&client.addr);

    if let Some(forward) = client.forward_addr {
        info!(node = %shared.name, from = %client.addr, to = %forward, "following gossip forward");
        shared.start_client(state, forward);
    }
}

/// Check whether the overlay needs tightening to accommodate distant infos.
fn tighten_pass(shared: &Arc<Shared>, state: &mut State) {
    let threshold = max_tolerated_hops(state);
    let distant = state
        .filter_extant(&state.store.distant(threshold))
        .filter(|addr| *addr != shared.node_addr);
    if distant.is_empty() {
        return;
    }
    if state.outgoing.len() < MAX_PEERS {
        if let Some(addr) = distant.select_random() {
            shared.start_client(state, addr);
        }
    } else if let Some(victim) = state.store.least_useful(&state.outgoing) {
        info!(node = %shared.name, %victim, "closing least useful client to tighten overlay");
        if let Some(handle) = state.clients.remove(&victim) {
            handle.close();
        }
    }
}

/// After each manage pass: signal the bootstrapper if connectivity or the
/// sentinel is gone, fire the one-shot connected event otherwise, and report
/// whether the loop should exit.
fn post_pass(shared: &Arc<Shared>, state: &mut State) -> bool {
    if state.outgoing.is_empty() && !state.filter_extant(&state.bootstraps).is_empty() {
        warn!(node = %shared.name, "no outgoing gossip hosts; signaling bootstrap");
        shared.stalled.notify_one();
    } else if state.store.get_info(KEY_SENTINEL).is_none() {
        warn!(node = %shared.name, key = KEY_SENTINEL, "missing sentinel gossip; assuming partition and reconnecting");
        shared.stalled.notify_one();
    } else if !state.has_connected {
        state.has_connected = true;
        let _ = shared.connected_tx.send(true);
    }

    state.closed && state.outgoing.is_empty()
}
