//! Error types for the gossip subsystem.
//!
//! No error here is fatal to a node. Store errors return to the caller;
//! client errors funnel through the disconnected channel, where the manage
//! loop logs them and reacts structurally.

use std::time::Duration;

use thiserror::Error;

use grapevine_cbor::CodecError;
use grapevine_core::{Address, ValueError};

/// Errors from infostore operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An incoming info's timestamp is not newer than the stored one.
    /// Expected and benign during normal gossip.
    #[error("stale info for {key:?}: incoming timestamp {incoming} <= stored {stored}")]
    Stale {
        /// Key being updated.
        key: String,
        /// Incoming origination timestamp.
        incoming: i64,
        /// Stored origination timestamp.
        stored: i64,
    },

    /// The owning group is full and the value ranks below every retained
    /// member.
    #[error("group {prefix:?} is full and rejects {key:?}")]
    GroupRejected {
        /// Group prefix.
        prefix: String,
        /// Rejected key.
        key: String,
    },

    /// A group with this prefix is already registered.
    #[error("group {prefix:?} is already registered")]
    AlreadyRegistered {
        /// Duplicated prefix.
        prefix: String,
    },

    /// No live entry under this key or group prefix.
    #[error("{name:?} does not exist or has expired")]
    NotFound {
        /// Key or group prefix looked up.
        name: String,
    },

    /// Two values under one key disagreed on their type.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Errors from the RPC transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No listener is reachable at the address.
    #[error("no gossip listener at {addr}")]
    Unreachable {
        /// Dialed address.
        addr: Address,
    },

    /// The session closed underneath a pending call.
    #[error("connection to {addr} closed")]
    ConnectionClosed {
        /// Remote address.
        addr: Address,
    },

    /// Frame encoding or decoding failed.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// Underlying socket failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal outcomes of a peer client's exchange loop.
///
/// Clean exits (close signal, redundant link, forwarding) are not errors and
/// do not appear here.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not establish a session within the dial timeout.
    #[error("timeout dialing {addr} after {timeout:?}")]
    DialTimeout {
        /// Dialed address.
        addr: Address,
        /// Configured dial timeout.
        timeout: Duration,
    },

    /// No reply arrived within twice the gossip interval.
    #[error("no gossip reply from {addr} within {timeout:?}")]
    ReplyTimeout {
        /// Peer address.
        addr: Address,
        /// Reply deadline that elapsed.
        timeout: Duration,
    },

    /// The peer produced no fresh info for the boredom window.
    #[error("peer {addr} yielded nothing fresh for {idle:?}")]
    PeerBoring {
        /// Peer address.
        addr: Address,
        /// Idle window that elapsed.
        idle: Duration,
    },

    /// Any other transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
