//! Bounded in-memory witness store.
//!
//! A keyed collection with a hard capacity and two independent,
//! idempotent eviction paths:
//!
//! - **Expiry sweep**: callers run [`BoundedStore::sweep_expired`] on a
//!   timer; expired entries are removed and their ids returned so the
//!   engine can emit tombstones on record-oriented transports.
//! - **Capacity eviction**: when the set would exceed capacity, the
//!   least-recently-touched entries (smallest `max(last_witnessed,
//!   created_at)`) are dropped. Purely local policy — each client sizes
//!   its own working set, and evictions are never replicated and never an
//!   error.
//!
//! Intentionally no durability: witnesses are ephemeral by design, so the
//! process losing this map is correct behavior, not data loss.

use std::collections::HashMap;

use tracing::{debug, trace};
use vigil_core::{Witness, WitnessId};

/// Bounded keyed witness collection.
#[derive(Debug)]
pub struct BoundedStore {
    entries: HashMap<WitnessId, Witness>,
    capacity: usize,
}

impl BoundedStore {
    /// Create an empty store with a hard capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a witness by id.
    pub fn get(&self, id: &WitnessId) -> Option<&Witness> {
        self.entries.get(id)
    }

    /// Whether an id is present.
    pub fn contains(&self, id: &WitnessId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or replace a witness.
    ///
    /// Inserting a new id at capacity proactively evicts the single
    /// least-recently-touched entry first, so creation and merge are
    /// never blocked. Returns the evicted id, if any.
    pub fn upsert(&mut self, witness: Witness) -> Option<WitnessId> {
        let mut evicted = None;
        if !self.entries.contains_key(&witness.id) && self.entries.len() >= self.capacity {
            evicted = self.evict_one();
        }
        trace!(id = %witness.id, count = witness.witness_count, "upsert");
        self.entries.insert(witness.id.clone(), witness);
        evicted
    }

    /// Remove a witness, returning it if present.
    pub fn remove(&mut self, id: &WitnessId) -> Option<Witness> {
        self.entries.remove(id)
    }

    /// All stored witnesses, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &Witness> {
        self.entries.values()
    }

    /// Witnesses still active at `now`.
    pub fn active(&self, now: u64) -> impl Iterator<Item = &Witness> + '_ {
        self.entries.values().filter(move |w| w.is_active(now))
    }

    /// Number of stored witnesses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry whose expiry has passed, returning the removed
    /// ids so the caller can emit deletions. Idempotent: a second sweep
    /// at the same instant removes nothing.
    pub fn sweep_expired(&mut self, now: u64) -> Vec<WitnessId> {
        let expired: Vec<WitnessId> = self
            .entries
            .values()
            .filter(|w| !w.is_active(now))
            .map(|w| w.id.clone())
            .collect();
        for id in &expired {
            self.entries.remove(id);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), remaining = self.entries.len(), "expiry sweep");
        }
        expired
    }

    /// Evict least-recently-touched entries until at or below capacity.
    /// Returns the evicted ids. Idempotent once within capacity.
    pub fn evict_overflow(&mut self) -> Vec<WitnessId> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_one() {
                Some(id) => evicted.push(id),
                None => break,
            }
        }
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), capacity = self.capacity, "capacity eviction");
        }
        evicted
    }

    /// Drop the single least-recently-touched entry.
    fn evict_one(&mut self) -> Option<WitnessId> {
        let oldest = self
            .entries
            .values()
            .min_by_key(|w| (w.touched_at(), w.id.clone()))
            .map(|w| w.id.clone())?;
        self.entries.remove(&oldest);
        trace!(id = %oldest, "evicted");
        Some(oldest)
    }
}
