//! RPC transport seam.
//!
//! The gossip core consumes a narrow surface from its transport: dial an
//! address and issue request-with-reply calls on the resulting session, and
//! accept inbound sessions, dispatching one handler invocation per call with
//! a notification when the session ends. Everything else (framing, sockets)
//! stays behind these traits.
//!
//! [`TcpTransport`] is the production implementation: length-prefixed
//! `grapevine-cbor` frames over TCP or Unix domain sockets. An in-memory
//! implementation for tests and simulation lives in [`crate::mem`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use grapevine_cbor::MAX_FRAME_BYTES;
use grapevine_core::Address;

use crate::error::TransportError;
use crate::protocol::{request_schema, response_schema, GossipRequest, GossipResponse};

/// Identifier of one inbound session on a listener. Unique per listener.
pub type SessionId = u64;

/// An established outgoing session.
#[async_trait]
pub trait RpcConnection: Send {
    /// Transport-local address of this session.
    fn local_addr(&self) -> Address;

    /// Issue one `gossip.gossip` call and await the reply.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the session fails or the frame cannot
    /// be encoded or decoded.
    async fn call(&mut self, request: GossipRequest) -> Result<GossipResponse, TransportError>;
}

/// Receiver side of the gossip RPC method.
#[async_trait]
pub trait GossipHandler: Send + Sync {
    /// Handle one call on the given inbound session.
    async fn gossip(&self, session: SessionId, request: GossipRequest) -> GossipResponse;

    /// The inbound session closed; no further calls will arrive on it.
    async fn session_closed(&self, session: SessionId);
}

/// Dial-and-serve surface the gossip core consumes.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Establish an outgoing session to `addr`.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if no listener is reachable.
    async fn dial(&self, addr: &Address) -> Result<Box<dyn RpcConnection>, TransportError>;

    /// Accept inbound sessions at `addr`, dispatching calls to `handler`.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the address cannot be bound.
    async fn serve(
        &self,
        addr: &Address,
        handler: Arc<dyn GossipHandler>,
    ) -> Result<ServerHandle, TransportError>;
}

/// Handle on a running listener.
pub struct ServerHandle {
    local_addr: Address,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl ServerHandle {
    pub(crate) fn new(
        local_addr: Address,
        shutdown: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<()>,
        cleanup: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        Self {
            local_addr,
            shutdown: Some(shutdown),
            task: Some(task),
            cleanup: Some(cleanup.unwrap_or_else(|| Box::new(|| {}))),
        }
    }

    /// Address the listener is bound to (resolved, if bound to port 0).
    #[must_use]
    pub const fn local_addr(&self) -> &Address {
        &self.local_addr
    }

    /// Stop accepting sessions and wait for the accept loop to end.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame I/O
// ─────────────────────────────────────────────────────────────────────────────

async fn write_frame<S>(stream: &mut S, frame: &[u8]) -> Result<(), TransportError>
where
    S: AsyncWrite + Unpin,
{
    let len = u32::try_from(frame.len()).map_err(|_| {
        TransportError::Codec(grapevine_cbor::CodecError::FrameTooLarge {
            len: frame.len(),
            max: MAX_FRAME_BYTES,
        })
    })?;
    stream.write_u32(len).await?;
    stream.write_all(frame).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>, TransportError>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u32().await? as usize;
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::Codec(
            grapevine_cbor::CodecError::FrameTooLarge {
                len,
                max: MAX_FRAME_BYTES,
            },
        ));
    }
    let mut frame = vec![0_u8; len];
    stream.read_exact(&mut frame).await?;
    Ok(frame)
}

// ─────────────────────────────────────────────────────────────────────────────
// TCP / Unix socket transport
// ─────────────────────────────────────────────────────────────────────────────

trait FrameStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> FrameStream for T {}

enum AnyListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl AnyListener {
    async fn accept(&self) -> std::io::Result<Box<dyn FrameStream>> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
            Self::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }
}

/// Socket transport: length-prefixed CBOR frames over TCP or Unix sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

struct StreamConnection {
    stream: Box<dyn FrameStream>,
    local: Address,
    peer: Address,
}

#[async_trait]
impl RpcConnection for StreamConnection {
    fn local_addr(&self) -> Address {
        self.local.clone()
    }

    async fn call(&mut self, request: GossipRequest) -> Result<GossipResponse, TransportError> {
        let frame = grapevine_cbor::encode(&request, &request_schema())?;
        write_frame(&mut self.stream, &frame).await?;
        let reply = match read_frame(&mut self.stream).await {
            Ok(reply) => reply,
            Err(TransportError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(TransportError::ConnectionClosed {
                    addr: self.peer.clone(),
                });
            }
            Err(err) => return Err(err),
        };
        Ok(grapevine_cbor::decode(&reply, &response_schema())?)
    }
}

#[async_trait]
impl RpcTransport for TcpTransport {
    async fn dial(&self, addr: &Address) -> Result<Box<dyn RpcConnection>, TransportError> {
        match addr {
            Address::Tcp(sock) => {
                let stream = TcpStream::connect(sock).await?;
                let local = Address::Tcp(stream.local_addr()?);
                Ok(Box::new(StreamConnection {
                    stream: Box::new(stream),
                    local,
                    peer: addr.clone(),
                }))
            }
            Address::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                let local = unix_local_addr(&stream);
                Ok(Box::new(StreamConnection {
                    stream: Box::new(stream),
                    local,
                    peer: addr.clone(),
                }))
            }
        }
    }

    async fn serve(
        &self,
        addr: &Address,
        handler: Arc<dyn GossipHandler>,
    ) -> Result<ServerHandle, TransportError> {
        let (listener, local_addr, cleanup) = match addr {
            Address::Tcp(sock) => {
                let listener = TcpListener::bind(sock).await?;
                let local = Address::Tcp(listener.local_addr()?);
                (AnyListener::Tcp(listener), local, None)
            }
            Address::Unix(path) => {
                let listener = UnixListener::bind(path)?;
                let path = path.clone();
                let cleanup: Box<dyn FnOnce() + Send> = Box::new(move || {
                    let _ = std::fs::remove_file(&path);
                });
                (AnyListener::Unix(listener), addr.clone(), Some(cleanup))
            }
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut next_session: SessionId = 0;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => match accepted {
                        Ok(stream) => {
                            next_session += 1;
                            tokio::spawn(serve_session(stream, next_session, Arc::clone(&handler)));
                        }
                        Err(err) => {
                            warn!(%err, "gossip listener terminated");
                            break;
                        }
                    }
                }
            }
        });

        Ok(ServerHandle::new(local_addr, shutdown_tx, task, cleanup))
    }
}

/// Serve one inbound session to completion: one call, one reply, repeated
/// until the peer hangs up or a frame fails to parse.
async fn serve_session(
    mut stream: Box<dyn FrameStream>,
    session: SessionId,
    handler: Arc<dyn GossipHandler>,
) {
    loop {
        let Ok(frame) = read_frame(&mut stream).await else {
            break;
        };
        let request = match grapevine_cbor::decode(&frame, &request_schema()) {
            Ok(request) => request,
            Err(err) => {
                debug!(%err, "dropping undecodable gossip frame");
                break;
            }
        };
        let response = handler.gossip(session, request).await;
        let Ok(reply) = grapevine_cbor::encode(&response, &response_schema()) else {
            break;
        };
        if write_frame(&mut stream, &reply).await.is_err() {
            break;
        }
    }
    handler.session_closed(session).await;
}

fn unix_local_addr(stream: &UnixStream) -> Address {
    stream
        .local_addr()
        .ok()
        .and_then(|sock| sock.as_pathname().map(Path::to_path_buf))
        .map_or_else(
            || Address::Unix(PathBuf::from("unnamed")),
            Address::Unix,
        )
}
