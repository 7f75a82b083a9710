//! Bounded aggregation groups over key prefixes.
//!
//! A group caps how many infos sharing a prefix are retained at once. The
//! policy keeps the `limit` smallest (MIN) or largest (MAX) values by the
//! value type's total order; membership itself lives here while the infos
//! stay in the store's main index.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Which end of the value order a group retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Retain the `limit` smallest values.
    Min,
    /// Retain the `limit` largest values.
    Max,
}

/// Wire description of a group, shipped with the first delta between two
/// peers so the receiver can recreate the aggregation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Key prefix the group owns.
    pub prefix: String,
    /// Maximum simultaneously retained members.
    pub limit: usize,
    /// Retention policy.
    pub kind: GroupKind,
}

/// A registered group and its current membership.
#[derive(Debug, Clone)]
pub(crate) struct Group {
    pub(crate) prefix: String,
    pub(crate) limit: usize,
    pub(crate) kind: GroupKind,
    /// Keys of current members; the infos live in the store index.
    pub(crate) keys: HashSet<String>,
}

impl Group {
    pub(crate) fn new(prefix: String, limit: usize, kind: GroupKind) -> Self {
        Self {
            prefix,
            limit,
            kind,
            keys: HashSet::new(),
        }
    }

    pub(crate) fn spec(&self) -> GroupSpec {
        GroupSpec {
            prefix: self.prefix.clone(),
            limit: self.limit,
            kind: self.kind,
        }
    }
}
