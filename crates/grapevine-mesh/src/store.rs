//! The infostore: a versioned, TTL-aware index of gossip facts.
//!
//! Every mutation assigns a fresh local sequence number, which is the
//! watermark deltas are extracted against. Sequence numbers never cross the
//! wire as authority; each store numbers its own inserts. Expired infos are
//! logically absent from every read path but are left in the index so the
//! timestamp rule still arbitrates late arrivals for the same key.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use grapevine_core::{unix_nanos_now, ttl_stamp, Address, InfoValue};

use crate::addrset::AddressSet;
use crate::error::StoreError;
use crate::group::{Group, GroupKind};
use crate::info::{key_prefix, Info};
use crate::protocol::{InfoBundle, WireInfo};

/// Per-node index of current gossip facts.
#[derive(Debug)]
pub struct InfoStore {
    node_addr: Address,
    infos: HashMap<String, Info>,
    groups: HashMap<String, Group>,
    seq_gen: i64,
}

impl InfoStore {
    /// Create an empty store owned by the node at `node_addr`.
    #[must_use]
    pub fn new(node_addr: Address) -> Self {
        Self {
            node_addr,
            infos: HashMap::new(),
            groups: HashMap::new(),
            seq_gen: 0,
        }
    }

    /// Address of the owning node.
    #[must_use]
    pub const fn node_addr(&self) -> &Address {
        &self.node_addr
    }

    /// Build a locally originated info: zero hops, origin and proximate peer
    /// both set to this node.
    #[must_use]
    pub fn new_info(
        &self,
        key: impl Into<String>,
        value: impl Into<InfoValue>,
        ttl: Duration,
    ) -> Info {
        let now = unix_nanos_now();
        Info {
            key: key.into(),
            value: value.into(),
            timestamp: now,
            ttl_stamp: ttl_stamp(now, ttl),
            hops: 0,
            origin: self.node_addr.clone(),
            peer: self.node_addr.clone(),
            seq: 0,
        }
    }

    /// Insert or update an info keyed by `info.key`.
    ///
    /// On success the info receives the next local sequence number and, if
    /// its key prefix names a registered group, group membership is updated
    /// (possibly evicting the worst current member).
    ///
    /// # Errors
    /// - [`StoreError::Stale`] if the key exists with an equal-or-newer
    ///   timestamp; the store is unchanged.
    /// - [`StoreError::GroupRejected`] if the owning group is full and the
    ///   value ranks below every retained member.
    /// - [`StoreError::Value`] if the value cannot be ordered against a group
    ///   member.
    pub fn add_info(&mut self, mut info: Info) -> Result<(), StoreError> {
        if let Some(existing) = self.infos.get(&info.key) {
            if info.timestamp <= existing.timestamp {
                return Err(StoreError::Stale {
                    key: info.key,
                    incoming: info.timestamp,
                    stored: existing.timestamp,
                });
            }
        }

        let prefix = key_prefix(&info.key);
        if !prefix.is_empty() {
            if let Some(group) = self.groups.get_mut(prefix) {
                Self::admit_to_group(&mut self.infos, group, &info)?;
            }
        }

        self.seq_gen += 1;
        info.seq = self.seq_gen;
        self.infos.insert(info.key.clone(), info);
        Ok(())
    }

    /// Make room for `incoming` in `group`, evicting the worst retained
    /// member if the group is full and `incoming` outranks it.
    fn admit_to_group(
        infos: &mut HashMap<String, Info>,
        group: &mut Group,
        incoming: &Info,
    ) -> Result<(), StoreError> {
        if group.keys.contains(&incoming.key) {
            // Update of an existing member; the timestamp rule has already
            // arbitrated.
            return Ok(());
        }

        let now = unix_nanos_now();
        group
            .keys
            .retain(|k| infos.get(k).is_some_and(|i| !i.expired(now)));

        if group.keys.len() < group.limit {
            group.keys.insert(incoming.key.clone());
            return Ok(());
        }

        // Worst member: largest value for a MIN group, smallest for MAX.
        let mut worst: Option<&Info> = None;
        for key in &group.keys {
            let Some(member) = infos.get(key) else {
                continue;
            };
            worst = match worst {
                None => Some(member),
                Some(current) => {
                    let member_is_worse = match group.kind {
                        GroupKind::Min => current.less_than(member)?,
                        GroupKind::Max => member.less_than(current)?,
                    };
                    if member_is_worse {
                        Some(member)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        let Some(worst) = worst else {
            group.keys.insert(incoming.key.clone());
            return Ok(());
        };

        let outranks_worst = match group.kind {
            GroupKind::Min => incoming.value.less_than(&worst.value)?,
            GroupKind::Max => worst.value.less_than(&incoming.value)?,
        };
        if !outranks_worst {
            return Err(StoreError::GroupRejected {
                prefix: group.prefix.clone(),
                key: incoming.key.clone(),
            });
        }

        let evicted = worst.key.clone();
        group.keys.remove(&evicted);
        infos.remove(&evicted);
        group.keys.insert(incoming.key.clone());
        Ok(())
    }

    /// The info under `key`, if present and not expired. O(1).
    #[must_use]
    pub fn get_info(&self, key: &str) -> Option<&Info> {
        let now = unix_nanos_now();
        self.infos.get(key).filter(|i| !i.expired(now))
    }

    /// All live members of the group registered at `prefix`, sorted
    /// ascending for MIN and descending for MAX.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no group is registered at
    /// `prefix`.
    pub fn get_group_infos(&self, prefix: &str) -> Result<Vec<Info>, StoreError> {
        let group = self.groups.get(prefix).ok_or_else(|| StoreError::NotFound {
            name: prefix.to_string(),
        })?;
        let now = unix_nanos_now();
        let mut members: Vec<Info> = group
            .keys
            .iter()
            .filter_map(|k| self.infos.get(k))
            .filter(|i| !i.expired(now))
            .cloned()
            .collect();
        // Mixed variants cannot enter a full group (admission compares
        // values), but an under-filled group could hold them; they sort as
        // equal rather than poisoning the whole result.
        members.sort_by(|a, b| a.value.try_cmp(&b.value).unwrap_or(Ordering::Equal));
        if group.kind == GroupKind::Max {
            members.reverse();
        }
        Ok(members)
    }

    /// Register a bounded aggregation group at `prefix`.
    ///
    /// # Errors
    /// Returns [`StoreError::AlreadyRegistered`] if the prefix is taken.
    pub fn register_group(
        &mut self,
        prefix: &str,
        limit: usize,
        kind: GroupKind,
    ) -> Result<(), StoreError> {
        if self.groups.contains_key(prefix) {
            return Err(StoreError::AlreadyRegistered {
                prefix: prefix.to_string(),
            });
        }
        let mut group = Group::new(prefix.to_string(), limit, kind);
        // Adopt any existing infos under the prefix, so a group registered
        // after facts already arrived still aggregates them.
        for key in self.infos.keys() {
            if key_prefix(key) == prefix && group.keys.len() < limit {
                group.keys.insert(key.clone());
            }
        }
        self.groups.insert(prefix.to_string(), group);
        Ok(())
    }

    /// Extract the delta of infos the peer at `peer` has not seen: live
    /// infos above `since_seq` that the peer neither authored nor delivered.
    ///
    /// Returns `None` when nothing qualifies. The bundle's `max_seq` is the
    /// highest sequence number among the included infos; registered groups
    /// ride along on the first exchange (`since_seq <= 0`).
    #[must_use]
    pub fn delta(&self, peer: &Address, since_seq: i64) -> Option<InfoBundle> {
        let now = unix_nanos_now();
        let mut infos = std::collections::BTreeMap::new();
        let mut max_seq = since_seq;
        for info in self.infos.values() {
            if info.expired(now) || !info.qualifies_for(peer, since_seq) {
                continue;
            }
            max_seq = max_seq.max(info.seq);
            infos.insert(info.key.clone(), WireInfo::from(info));
        }
        if infos.is_empty() {
            return None;
        }
        let groups = if since_seq <= 0 {
            self.groups.values().map(Group::spec).collect()
        } else {
            Vec::new()
        };
        Some(InfoBundle {
            max_seq,
            infos,
            groups,
        })
    }

    /// Merge a delta received from `sender` into the store.
    ///
    /// Each incoming info gains a hop and is attributed to `sender`; it is
    /// accepted only if its key is absent or its origination timestamp is
    /// strictly newer than the stored copy. Stale and group-rejected infos
    /// are dropped silently. Groups carried by the bundle are registered if
    /// not already present.
    ///
    /// Returns the accepted `(key, value)` pairs; the fresh count is their
    /// number.
    pub fn combine(&mut self, bundle: &InfoBundle, sender: &Address) -> Vec<(String, InfoValue)> {
        for spec in &bundle.groups {
            let _ = self.register_group(&spec.prefix, spec.limit, spec.kind);
        }

        let now = unix_nanos_now();
        let mut fresh = Vec::new();
        for wire in bundle.infos.values() {
            if wire.ttl_stamp <= now {
                continue;
            }
            let info = Info {
                key: wire.key.clone(),
                value: wire.value.clone(),
                timestamp: wire.timestamp,
                ttl_stamp: wire.ttl_stamp,
                hops: wire.hops.saturating_add(1),
                origin: wire.origin.clone(),
                peer: sender.clone(),
                seq: 0,
            };
            match self.add_info(info) {
                Ok(()) => fresh.push((wire.key.clone(), wire.value.clone())),
                Err(StoreError::Stale { .. } | StoreError::GroupRejected { .. }) => {}
                Err(err) => {
                    debug!(key = %wire.key, %err, "dropping gossiped info");
                }
            }
        }
        fresh
    }

    /// Maximum hop count across all live infos; 0 when empty.
    #[must_use]
    pub fn max_hops(&self) -> u32 {
        let now = unix_nanos_now();
        self.infos
            .values()
            .filter(|i| !i.expired(now))
            .map(|i| i.hops)
            .max()
            .unwrap_or(0)
    }

    /// Origin addresses of live infos that arrived over more than
    /// `max_hops` relays. These are the candidates for overlay tightening.
    #[must_use]
    pub fn distant(&self, max_hops: u32) -> AddressSet {
        let now = unix_nanos_now();
        let mut set = AddressSet::new(self.infos.len().max(1));
        for info in self.infos.values() {
            if !info.expired(now) && info.hops > max_hops {
                set.add(info.origin.clone());
            }
        }
        set
    }

    /// Among `candidates`, the address with the fewest live infos attributed
    /// to it as proximate peer; ties break toward the lexicographically
    /// smaller address. This is a heuristic for which outgoing connection is
    /// contributing least.
    #[must_use]
    pub fn least_useful(&self, candidates: &AddressSet) -> Option<Address> {
        if candidates.is_empty() {
            return None;
        }
        let now = unix_nanos_now();
        let mut counts: HashMap<&Address, usize> =
            candidates.iter().map(|addr| (addr, 0)).collect();
        for info in self.infos.values() {
            if info.expired(now) {
                continue;
            }
            if let Some(count) = counts.get_mut(&info.peer) {
                *count += 1;
            }
        }
        counts
            .into_iter()
            .min_by(|(addr_a, count_a), (addr_b, count_b)| {
                count_a.cmp(count_b).then_with(|| addr_a.cmp(addr_b))
            })
            .map(|(addr, _)| addr.clone())
    }
}
