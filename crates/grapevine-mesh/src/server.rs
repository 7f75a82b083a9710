//! Inbound gossip handler: one logical session per serving peer.
//!
//! Admission is bounded: past the fan-out limit, new callers are redirected
//! to a random already-served peer. First contact is answered immediately so
//! newcomers fetch state quickly; steady-state calls are held for a jittered
//! interval and answered with whatever accumulated, or an empty keep-alive so
//! the caller's own timeout is not tripped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use grapevine_core::Address;

use crate::gossip::{jittered, Shared, MAX_PEERS};
use crate::protocol::{GossipRequest, GossipResponse};
use crate::transport::{GossipHandler, SessionId};

/// Server half of the gossip protocol.
pub(crate) struct PeerServer {
    shared: Arc<Shared>,
    /// Inbound session to sender address, for unregistration on close.
    sessions: Mutex<HashMap<SessionId, Address>>,
}

impl PeerServer {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl GossipHandler for PeerServer {
    async fn gossip(&self, session: SessionId, request: GossipRequest) -> GossipResponse {
        let first_contact = request.max_seq == -1;

        // Admission, registration, and the request-delta merge all happen
        // under the state lock; the jittered reply wait never does.
        let fresh = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return GossipResponse {
                    alternate: None,
                    delta: None,
                };
            }
            if !state.incoming.contains(&request.sender) {
                if state.incoming.len() >= MAX_PEERS {
                    let alternate = state.incoming.select_random();
                    debug!(node = %self.shared.name, sender = %request.sender,
                        "at incoming capacity; redirecting gossip request");
                    return GossipResponse {
                        alternate,
                        delta: None,
                    };
                }
                state.incoming.add(request.sender.clone());
            }

            match &request.delta {
                Some(bundle) => state.store.combine(bundle, &request.sender),
                None => Vec::new(),
            }
        };
        self.sessions
            .lock()
            .insert(session, request.sender.clone());
        self.shared.run_callbacks(&fresh);

        if !first_contact {
            tokio::time::sleep(jittered(self.shared.interval)).await;
        }

        let delta = {
            let state = self.shared.state.lock();
            state.store.delta(&request.sender, request.max_seq)
        };
        GossipResponse {
            alternate: None,
            delta,
        }
    }

    async fn session_closed(&self, session: SessionId) {
        let addr = self.sessions.lock().remove(&session);
        if let Some(addr) = addr {
            let mut state = self.shared.state.lock();
            state.incoming.remove(&addr);
            debug!(node = %self.shared.name, %addr, "incoming gossip session closed");
        }
    }
}
