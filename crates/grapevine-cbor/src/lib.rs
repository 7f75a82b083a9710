//! Grapevine wire encoding: deterministic CBOR frames with a schema prefix.
//!
//! Every gossip message travels as `schema_hash (32 bytes) || cbor_bytes`.
//! The schema hash binds the frame to a named, versioned message type, so a
//! receiver can reject frames of the wrong kind before deserializing them.
//! The CBOR body is encoded deterministically (RFC 8949 §4.2: minimal-length
//! integers, map keys sorted by their encoded bytes), which keeps frames
//! byte-stable across nodes even when the in-memory representation uses
//! unordered maps.
//!
//! The value side of an info is polymorphic (integer, float, string, or a
//! user-defined key), which is why the body is self-describing CBOR rather
//! than a positional encoding.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::fmt;

use ciborium::value::Value;
use semver::Version;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain separator mixed into every schema hash.
const SCHEMA_DOMAIN: &[u8] = b"GRAPEVINE-SCHEMA-V1";

/// Length of the schema hash prefix on every frame.
pub const SCHEMA_HASH_LEN: usize = 32;

/// Upper bound on one encoded frame. A gossip delta is a bounded batch of
/// small facts; anything near this limit indicates a runaway sender.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Identifies a wire message type by namespace, name, and version.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct SchemaId {
    /// Namespace, e.g. `grapevine.mesh`.
    pub namespace: String,
    /// Message type name, e.g. `GossipRequest`.
    pub name: String,
    /// Semantic version of the message layout.
    pub version: Version,
}

impl SchemaId {
    /// Create a new schema identifier.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version,
        }
    }

    /// Canonical text form: `{namespace}:{name}@{version}`.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}@{}", self.namespace, self.name, self.version)
    }

    /// Fixed-size hash of the canonical form.
    #[must_use]
    pub fn hash(&self) -> SchemaHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(SCHEMA_DOMAIN);
        hasher.update(self.canonical().as_bytes());
        SchemaHash(*hasher.finalize().as_bytes())
    }
}

/// 32-byte hash of a [`SchemaId`], prefixed to every frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaHash([u8; SCHEMA_HASH_LEN]);

impl SchemaHash {
    /// Raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SCHEMA_HASH_LEN] {
        &self.0
    }
}

impl fmt::Debug for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchemaHash").field(&self.to_string()).finish()
    }
}

impl fmt::Display for SchemaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Errors encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is shorter than the schema hash prefix.
    #[error("frame missing schema hash prefix")]
    MissingPrefix,

    /// The prefix names a different message type than expected.
    #[error("schema mismatch (expected {expected}, got {got})")]
    SchemaMismatch {
        /// Hash the receiver expected.
        expected: SchemaHash,
        /// Hash found on the frame.
        got: SchemaHash,
    },

    /// The frame exceeds [`MAX_FRAME_BYTES`].
    #[error("frame too large ({len} bytes > {max} bytes)")]
    FrameTooLarge {
        /// Observed frame length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Bytes remain after the first CBOR item.
    #[error("trailing bytes after CBOR value")]
    TrailingBytes,

    /// A map contains two entries with the same key.
    #[error("duplicate map key in frame body")]
    DuplicateMapKey,

    /// The value cannot be represented as a dynamic CBOR value.
    #[error("cbor value error: {0}")]
    CborValue(#[from] ciborium::value::Error),

    /// CBOR serialization failed.
    #[error("cbor encode error: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),

    /// CBOR deserialization failed.
    #[error("cbor decode error: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
}

/// Encode a message into a schema-prefixed deterministic frame.
///
/// # Errors
/// Returns [`CodecError::Encode`] if CBOR serialization fails,
/// [`CodecError::DuplicateMapKey`] if the value contains a map with duplicate
/// keys, and [`CodecError::FrameTooLarge`] if the result exceeds
/// [`MAX_FRAME_BYTES`].
pub fn encode<T: Serialize>(value: &T, schema: &SchemaId) -> Result<Vec<u8>, CodecError> {
    let mut frame = Vec::with_capacity(SCHEMA_HASH_LEN + 128);
    frame.extend_from_slice(schema.hash().as_bytes());

    let mut body = Value::serialized(value)?;
    sort_maps(&mut body)?;
    ciborium::ser::into_writer(&body, &mut frame)?;

    if frame.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge {
            len: frame.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    Ok(frame)
}

/// Decode a schema-prefixed frame into a message.
///
/// Verifies the schema prefix and rejects oversized or trailing input. Body
/// bytes are not required to be in deterministic form; peers inside one
/// cluster always produce it, and gossip makes no integrity claims beyond
/// that (message authentication is an explicit non-goal).
///
/// # Errors
/// Returns [`CodecError::MissingPrefix`], [`CodecError::SchemaMismatch`],
/// [`CodecError::FrameTooLarge`], [`CodecError::TrailingBytes`], or
/// [`CodecError::Decode`] as appropriate.
pub fn decode<T: DeserializeOwned>(frame: &[u8], schema: &SchemaId) -> Result<T, CodecError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge {
            len: frame.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    if frame.len() < SCHEMA_HASH_LEN {
        return Err(CodecError::MissingPrefix);
    }

    let mut got = [0_u8; SCHEMA_HASH_LEN];
    got.copy_from_slice(&frame[..SCHEMA_HASH_LEN]);
    let got = SchemaHash(got);
    let expected = schema.hash();
    if got != expected {
        return Err(CodecError::SchemaMismatch { expected, got });
    }

    let mut body = &frame[SCHEMA_HASH_LEN..];
    let value = ciborium::de::from_reader(&mut body)?;
    if !body.is_empty() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(value)
}

/// Recursively rewrite map entries into deterministic order.
///
/// RFC 8949 §4.2.1: keys sort by encoded length first, then lexicographically
/// by encoded bytes.
fn sort_maps(value: &mut Value) -> Result<(), CodecError> {
    match value {
        Value::Array(items) => {
            for item in items {
                sort_maps(item)?;
            }
        }
        Value::Tag(_, inner) => sort_maps(inner)?,
        Value::Map(entries) => {
            let mut keyed = Vec::with_capacity(entries.len());
            for (mut key, mut val) in std::mem::take(entries) {
                sort_maps(&mut key)?;
                sort_maps(&mut val)?;
                let mut key_bytes = Vec::new();
                ciborium::ser::into_writer(&key, &mut key_bytes)?;
                keyed.push((key_bytes, key, val));
            }
            keyed.sort_by(|(a, _, _), (b, _, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
            for pair in keyed.windows(2) {
                if pair[0].0 == pair[1].0 {
                    return Err(CodecError::DuplicateMapKey);
                }
            }
            *entries = keyed.into_iter().map(|(_, k, v)| (k, v)).collect();
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_schema(name: &str) -> SchemaId {
        SchemaId::new("grapevine.test", name, Version::new(1, 0, 0))
    }

    // ========================================================================
    // Schema identity
    // ========================================================================

    #[test]
    fn canonical_form_is_namespace_name_version() {
        let schema = test_schema("Demo");
        assert_eq!(schema.canonical(), "grapevine.test:Demo@1.0.0");
    }

    #[test]
    fn hash_is_deterministic_and_distinguishes_types() {
        let a = test_schema("GossipRequest");
        let b = test_schema("GossipResponse");
        assert_eq!(a.hash(), a.hash());
        assert_ne!(a.hash(), b.hash());

        let v2 = SchemaId::new("grapevine.test", "GossipRequest", Version::new(2, 0, 0));
        assert_ne!(a.hash(), v2.hash());
    }

    #[test]
    fn hash_displays_as_hex() {
        let display = test_schema("Demo").hash().to_string();
        assert_eq!(display.len(), 64);
        assert!(display.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // ========================================================================
    // Frame roundtrips
    // ========================================================================

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Fact {
        key: String,
        hops: u32,
        timestamp: i64,
    }

    #[test]
    fn roundtrip_struct() {
        let schema = test_schema("Fact");
        let fact = Fact {
            key: "node-id.7".to_string(),
            hops: 3,
            timestamp: -1,
        };
        let frame = encode(&fact, &schema).unwrap();
        let back: Fact = decode(&frame, &schema).unwrap();
        assert_eq!(back, fact);
    }

    #[test]
    fn roundtrip_tagged_enum() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "kind", content = "value", rename_all = "snake_case")]
        enum Poly {
            I64(i64),
            F64(f64),
            Str(String),
        }

        let schema = test_schema("Poly");
        for value in [Poly::I64(-42), Poly::F64(2.5), Poly::Str("x".into())] {
            let frame = encode(&value, &schema).unwrap();
            let back: Poly = decode(&frame, &schema).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn roundtrip_optionals() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Reply {
            alternate: Option<String>,
            delta: Option<Vec<u8>>,
        }

        let schema = test_schema("Reply");
        let reply = Reply {
            alternate: None,
            delta: Some(vec![1, 2, 3]),
        };
        let frame = encode(&reply, &schema).unwrap();
        let back: Reply = decode(&frame, &schema).unwrap();
        assert_eq!(back, reply);
    }

    // ========================================================================
    // Determinism
    // ========================================================================

    #[test]
    fn map_insertion_order_does_not_change_the_frame() {
        let schema = test_schema("Map");

        let mut forward = HashMap::new();
        forward.insert("sentinel", 1);
        forward.insert("node-count", 2);
        forward.insert("node-id.1", 3);

        let mut reverse = HashMap::new();
        reverse.insert("node-id.1", 3);
        reverse.insert("node-count", 2);
        reverse.insert("sentinel", 1);

        assert_eq!(
            encode(&forward, &schema).unwrap(),
            encode(&reverse, &schema).unwrap()
        );
    }

    #[test]
    fn map_keys_sort_length_first() {
        let schema = test_schema("Map");
        let mut map = HashMap::new();
        map.insert("bb", 1);
        map.insert("a", 2);
        map.insert("z", 3);
        map.insert("aaa", 4);

        let frame = encode(&map, &schema).unwrap();
        let body: Value = ciborium::de::from_reader(&frame[SCHEMA_HASH_LEN..]).unwrap();
        let Value::Map(entries) = body else {
            panic!("expected map body");
        };
        let keys: Vec<_> = entries
            .iter()
            .filter_map(|(k, _)| match k {
                Value::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["a", "z", "bb", "aaa"]);
    }

    #[test]
    fn nested_maps_are_sorted_too() {
        #[derive(Serialize)]
        struct Outer {
            inner: HashMap<String, i64>,
        }

        let schema = test_schema("Outer");
        let mut inner = HashMap::new();
        for k in ["delta", "alpha", "gamma", "beta"] {
            inner.insert(k.to_string(), 0);
        }
        let a = encode(&Outer { inner: inner.clone() }, &schema).unwrap();
        let b = encode(&Outer { inner }, &schema).unwrap();
        assert_eq!(a, b);
    }

    // ========================================================================
    // Rejection paths
    // ========================================================================

    #[test]
    fn decode_rejects_wrong_schema() {
        let frame = encode(&7_u64, &test_schema("A")).unwrap();
        let err = decode::<u64>(&frame, &test_schema("B")).unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { .. }));
    }

    #[test]
    fn decode_rejects_short_frame() {
        let err = decode::<u64>(&[0_u8; 8], &test_schema("A")).unwrap_err();
        assert!(matches!(err, CodecError::MissingPrefix));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut frame = encode(&7_u64, &test_schema("A")).unwrap();
        frame.push(0x00);
        let err = decode::<u64>(&frame, &test_schema("A")).unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes));
    }

    #[test]
    fn decode_rejects_truncated_body() {
        let schema = test_schema("Str");
        let mut frame = Vec::new();
        frame.extend_from_slice(schema.hash().as_bytes());
        // Text string claiming length 10 with 2 bytes present.
        frame.extend_from_slice(&[0x6A, b'h', b'i']);
        let err = decode::<String>(&frame, &schema).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let frame = vec![0_u8; MAX_FRAME_BYTES + 1];
        let err = decode::<Vec<u8>>(&frame, &test_schema("A")).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = "x".repeat(MAX_FRAME_BYTES);
        let err = encode(&payload, &test_schema("A")).unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { .. }));
    }
}
