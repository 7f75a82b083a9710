//! In-memory transport for tests and network simulation.
//!
//! One [`MemNetwork`] value is a whole network: every node serves and dials
//! through the same shared registry, addressed by the same [`Address`] values
//! a socket transport would use. Frames still round-trip through the wire
//! codec, so the encoding path is exercised end to end.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use grapevine_core::Address;

use crate::error::TransportError;
use crate::protocol::{request_schema, response_schema, GossipRequest, GossipResponse};
use crate::transport::{GossipHandler, RpcConnection, RpcTransport, ServerHandle, SessionId};

enum SessionEvent {
    Call {
        session: SessionId,
        frame: Vec<u8>,
        reply: oneshot::Sender<Vec<u8>>,
    },
    Closed {
        session: SessionId,
    },
}

struct Inner {
    listeners: Mutex<HashMap<Address, mpsc::UnboundedSender<SessionEvent>>>,
    next_session: AtomicU64,
}

/// A simulated network: a registry of listeners shared by every node.
#[derive(Clone)]
pub struct MemNetwork {
    inner: Arc<Inner>,
}

impl Default for MemNetwork {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: Mutex::new(HashMap::new()),
                next_session: AtomicU64::new(0),
            }),
        }
    }
}

impl MemNetwork {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemConnection {
    peer: Address,
    local: Address,
    session: SessionId,
    sender: mpsc::UnboundedSender<SessionEvent>,
}

#[async_trait]
impl RpcConnection for MemConnection {
    fn local_addr(&self) -> Address {
        self.local.clone()
    }

    async fn call(&mut self, request: GossipRequest) -> Result<GossipResponse, TransportError> {
        let frame = grapevine_cbor::encode(&request, &request_schema())?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionEvent::Call {
                session: self.session,
                frame,
                reply: reply_tx,
            })
            .map_err(|_| TransportError::ConnectionClosed {
                addr: self.peer.clone(),
            })?;
        let reply = reply_rx
            .await
            .map_err(|_| TransportError::ConnectionClosed {
                addr: self.peer.clone(),
            })?;
        Ok(grapevine_cbor::decode(&reply, &response_schema())?)
    }
}

impl Drop for MemConnection {
    fn drop(&mut self) {
        let _ = self.sender.send(SessionEvent::Closed {
            session: self.session,
        });
    }
}

#[async_trait]
impl RpcTransport for MemNetwork {
    async fn dial(&self, addr: &Address) -> Result<Box<dyn RpcConnection>, TransportError> {
        let sender = self
            .inner
            .listeners
            .lock()
            .get(addr)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable { addr: addr.clone() })?;
        let session = self.inner.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Box::new(MemConnection {
            peer: addr.clone(),
            local: Address::Unix(PathBuf::from(format!("mem/session-{session}"))),
            session,
            sender,
        }))
    }

    async fn serve(
        &self,
        addr: &Address,
        handler: Arc<dyn GossipHandler>,
    ) -> Result<ServerHandle, TransportError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut listeners = self.inner.listeners.lock();
            if listeners.contains_key(addr) {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    format!("listener already registered at {addr}"),
                )));
            }
            listeners.insert(addr.clone(), tx);
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = rx.recv() => match event {
                        Some(SessionEvent::Call { session, frame, reply }) => {
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move {
                                let request = match grapevine_cbor::decode(&frame, &request_schema()) {
                                    Ok(request) => request,
                                    Err(err) => {
                                        debug!(%err, "dropping undecodable gossip frame");
                                        return;
                                    }
                                };
                                let response = handler.gossip(session, request).await;
                                if let Ok(frame) =
                                    grapevine_cbor::encode(&response, &response_schema())
                                {
                                    let _ = reply.send(frame);
                                }
                            });
                        }
                        Some(SessionEvent::Closed { session }) => {
                            handler.session_closed(session).await;
                        }
                        None => break,
                    }
                }
            }
        });

        let inner = Arc::clone(&self.inner);
        let registered = addr.clone();
        let cleanup: Box<dyn FnOnce() + Send> = Box::new(move || {
            inner.listeners.lock().remove(&registered);
        });
        Ok(ServerHandle::new(
            addr.clone(),
            shutdown_tx,
            task,
            Some(cleanup),
        ))
    }
}
