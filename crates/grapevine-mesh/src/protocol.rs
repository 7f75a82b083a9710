//! Wire messages for the `gossip.gossip` RPC method.
//!
//! Frames are encoded with `grapevine-cbor`: a schema-hash prefix followed by
//! deterministic CBOR. An info on the wire carries only the replicated
//! fields; `peer` and `seq` are reassigned by the receiving infostore.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};

use grapevine_cbor::SchemaId;
use grapevine_core::{Address, InfoValue};

use crate::group::GroupSpec;
use crate::info::Info;

/// Wire namespace for gossip messages.
const SCHEMA_NAMESPACE: &str = "grapevine.mesh";

/// Schema for [`GossipRequest`] frames.
#[must_use]
pub fn request_schema() -> SchemaId {
    SchemaId::new(SCHEMA_NAMESPACE, "GossipRequest", Version::new(1, 0, 0))
}

/// Schema for [`GossipResponse`] frames.
#[must_use]
pub fn response_schema() -> SchemaId {
    SchemaId::new(SCHEMA_NAMESPACE, "GossipResponse", Version::new(1, 0, 0))
}

/// One info as replicated between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireInfo {
    /// Dotted key.
    pub key: String,
    /// Typed value.
    pub value: InfoValue,
    /// Origination wall time, Unix nanoseconds.
    pub timestamp: i64,
    /// Expiration wall time, Unix nanoseconds.
    pub ttl_stamp: i64,
    /// Relay count at the sender.
    pub hops: u32,
    /// Originating node address.
    pub origin: Address,
}

impl From<&Info> for WireInfo {
    fn from(info: &Info) -> Self {
        Self {
            key: info.key.clone(),
            value: info.value.clone(),
            timestamp: info.timestamp,
            ttl_stamp: info.ttl_stamp,
            hops: info.hops,
            origin: info.origin.clone(),
        }
    }
}

/// A batch of infos the sender believes the receiver has not seen, bounded
/// by a sequence watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoBundle {
    /// Maximum `seq` among the included infos; the receiver uses it as the
    /// next `since_seq` watermark.
    pub max_seq: i64,
    /// Included infos, keyed by info key.
    pub infos: BTreeMap<String, WireInfo>,
    /// Registered groups, included on the first delta between two peers so
    /// the receiver can recreate aggregation policy.
    pub groups: Vec<GroupSpec>,
}

/// Request body of `gossip.gossip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipRequest {
    /// The caller's gossip server address.
    pub sender: Address,
    /// The caller's transport-local address for this session.
    pub sender_local: Address,
    /// Highest remote `seq` the caller has merged; `-1` on first contact.
    pub max_seq: i64,
    /// The caller's delta for the callee, if any.
    pub delta: Option<InfoBundle>,
}

/// Response body of `gossip.gossip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipResponse {
    /// Set when the callee declines the session and redirects the caller.
    pub alternate: Option<Address>,
    /// The callee's delta for the caller, if any.
    pub delta: Option<InfoBundle>,
}
