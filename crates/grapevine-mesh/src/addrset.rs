//! Bounded set of peer addresses with uniform random selection.

use std::collections::HashSet;

use rand::seq::IteratorRandom;

use grapevine_core::Address;

/// A bounded set of network addresses.
///
/// None of the operations block; random selection draws uniformly from the
/// current members.
#[derive(Debug, Clone)]
pub struct AddressSet {
    capacity: usize,
    addrs: HashSet<Address>,
}

impl AddressSet {
    /// Create an empty set bounded at `capacity` members.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            addrs: HashSet::with_capacity(capacity),
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Whether the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Membership test.
    #[must_use]
    pub fn contains(&self, addr: &Address) -> bool {
        self.addrs.contains(addr)
    }

    /// Add an address. Returns `false` if the set is full or the address is
    /// already present.
    pub fn add(&mut self, addr: Address) -> bool {
        if self.addrs.len() >= self.capacity && !self.addrs.contains(&addr) {
            return false;
        }
        self.addrs.insert(addr)
    }

    /// Remove an address. Returns whether it was present.
    pub fn remove(&mut self, addr: &Address) -> bool {
        self.addrs.remove(addr)
    }

    /// Pick a member uniformly at random.
    #[must_use]
    pub fn select_random(&self) -> Option<Address> {
        self.addrs.iter().choose(&mut rand::thread_rng()).cloned()
    }

    /// New set (same capacity) retaining members satisfying `pred`.
    #[must_use]
    pub fn filter(&self, pred: impl Fn(&Address) -> bool) -> Self {
        Self {
            capacity: self.capacity,
            addrs: self.addrs.iter().filter(|a| pred(a)).cloned().collect(),
        }
    }

    /// Iterate over members in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.addrs.iter()
    }

    /// Members as a vector, in arbitrary order.
    #[must_use]
    pub fn as_vec(&self) -> Vec<Address> {
        self.addrs.iter().cloned().collect()
    }
}
