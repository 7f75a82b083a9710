//! Outgoing gossip session: one client per peer.
//!
//! The client drives the pairwise exchange: it ships the local delta,
//! merges the reply, and keeps freshness accounting that decides whether the
//! peer is worth keeping. Every exit path reports the client back on the
//! coordinator's disconnected channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use grapevine_core::{unix_nanos_now, Address};

use crate::error::ClientError;
use crate::gossip::Shared;
use crate::protocol::GossipRequest;

/// Minimum wait for new gossip before a peer is considered a poor source and
/// cut off.
pub(crate) const MAX_WAIT_FOR_NEW_GOSSIP: Duration = Duration::from_secs(10);

/// Timeout for establishing a session to a gossip server.
pub(crate) const GOSSIP_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// A client-side gossip session to one peer node.
pub(crate) struct PeerClient {
    /// Peer node address.
    pub(crate) addr: Address,
    /// Set if the peer declined the session and proposed an alternate.
    pub(crate) forward_addr: Option<Address>,
    /// Set if the session ended in error.
    pub(crate) err: Option<ClientError>,
    /// Wall time the peer last contributed fresh info.
    last_fresh: i64,
    close_rx: oneshot::Receiver<()>,
}

impl PeerClient {
    pub(crate) fn new(addr: Address, close_rx: oneshot::Receiver<()>) -> Self {
        Self {
            addr,
            forward_addr: None,
            err: None,
            last_fresh: 0,
            close_rx,
        }
    }

    /// Dial the peer and gossip until error, timeout, or close; then report
    /// on the disconnected channel.
    pub(crate) async fn run(mut self, shared: Arc<Shared>) {
        if let Err(err) = self.gossip_loop(&shared).await {
            self.err = Some(err);
        }
        let _ = shared.disconnected_tx.send(self).await;
    }

    async fn gossip_loop(&mut self, shared: &Arc<Shared>) -> Result<(), ClientError> {
        let dialed = tokio::time::timeout(GOSSIP_DIAL_TIMEOUT, shared.transport.dial(&self.addr))
            .await
            .map_err(|_| ClientError::DialTimeout {
                addr: self.addr.clone(),
                timeout: GOSSIP_DIAL_TIMEOUT,
            })?;
        let mut conn = dialed?;

        self.last_fresh = unix_nanos_now();
        let reply_timeout = shared.interval * 2;
        let mut local_max_seq = 0_i64;
        let mut remote_max_seq = -1_i64;

        loop {
            // An incoming session from the same peer makes this client
            // redundant. Only the lexicographically smaller address drops
            // its outgoing side, so exactly one link survives per pair.
            let delta = {
                let state = shared.state.lock();
                if state.incoming.contains(&self.addr) && shared.node_addr < self.addr {
                    debug!(node = %shared.name, addr = %self.addr,
                        "dropping redundant outgoing client; peer already incoming");
                    return Ok(());
                }
                let delta = state.store.delta(&self.addr, local_max_seq);
                if let Some(bundle) = &delta {
                    local_max_seq = bundle.max_seq;
                }
                delta
            };

            let request = GossipRequest {
                sender: shared.node_addr.clone(),
                sender_local: conn.local_addr(),
                max_seq: remote_max_seq,
                delta,
            };
            let reply = tokio::select! {
                result = conn.call(request) => result?,
                () = tokio::time::sleep(reply_timeout) => {
                    return Err(ClientError::ReplyTimeout {
                        addr: self.addr.clone(),
                        timeout: reply_timeout,
                    });
                }
                _ = &mut self.close_rx => return Ok(()),
            };

            // The peer declined and proposed an alternate; the manage loop
            // reconnects there.
            if let Some(alternate) = reply.alternate {
                info!(node = %shared.name, from = %self.addr, to = %alternate,
                    "received gossip forward");
                self.forward_addr = Some(alternate);
                return Ok(());
            }

            let now = unix_nanos_now();
            if let Some(bundle) = reply.delta {
                let fresh = {
                    let mut state = shared.state.lock();
                    state.store.combine(&bundle, &self.addr)
                };
                if !fresh.is_empty() {
                    self.last_fresh = now;
                }
                remote_max_seq = bundle.max_seq;
                shared.run_callbacks(&fresh);
            }

            let idle = now.saturating_sub(self.last_fresh);
            if idle > i64::try_from(MAX_WAIT_FOR_NEW_GOSSIP.as_nanos()).unwrap_or(i64::MAX) {
                return Err(ClientError::PeerBoring {
                    addr: self.addr.clone(),
                    idle: MAX_WAIT_FOR_NEW_GOSSIP,
                });
            }
        }
    }
}
