//! Bounded bidirectional name/address cache.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::protocol::Direction;

/// Number of slots used when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 3;

/// How a full cache picks the slot to overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Overwrite slots in turn, ignoring how recently they were used.
    #[default]
    RoundRobin,
    /// Overwrite the slot that was least recently inserted or hit.
    LeastRecentlyUsed,
}

/// One name/address mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub name: String,
    pub address: String,
}

impl CacheEntry {
    fn key(&self, direction: Direction) -> &str {
        match direction {
            Direction::Forward => &self.name,
            Direction::Reverse => &self.address,
        }
    }

    fn value(&self, direction: Direction) -> &str {
        match direction {
            Direction::Forward => &self.address,
            Direction::Reverse => &self.name,
        }
    }
}

struct Slot {
    entry: CacheEntry,
    last_used: u64,
}

struct Slots {
    slots: Vec<Option<Slot>>,
    /// Next slot to overwrite under round-robin.
    cursor: usize,
    /// Logical clock for recency.
    clock: u64,
}

impl Slots {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Small shared cache keyed by name (forward) or address (reverse).
///
/// All operations take one mutex for their whole body, so an entry is never
/// visible half-written and no two slots share a name or an address.
pub struct LookupCache {
    inner: Mutex<Slots>,
    policy: EvictionPolicy,
}

impl LookupCache {
    /// Create a cache with [`DEFAULT_CAPACITY`] round-robin slots.
    pub fn new() -> Self {
        Self::with_policy(DEFAULT_CAPACITY, EvictionPolicy::RoundRobin)
    }

    /// Create a cache with `capacity` slots (at least one).
    pub fn with_policy(capacity: usize, policy: EvictionPolicy) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            inner: Mutex::new(Slots {
                slots,
                cursor: 0,
                clock: 0,
            }),
            policy,
        }
    }

    /// Return the opposite-axis value of the entry matching `key`, if any.
    pub fn lookup(&self, direction: Direction, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let now = inner.tick();

        let slot = inner
            .slots
            .iter_mut()
            .flatten()
            .find(|slot| slot.entry.key(direction) == key)?;
        slot.last_used = now;

        Some(slot.entry.value(direction).to_string())
    }

    /// Store a mapping, overwriting a slot if the cache is full.
    ///
    /// An entry that already holds `name` or `address` is rewritten in place
    /// and the cursor stays where it is.
    pub fn insert(&self, name: &str, address: &str) {
        let mut inner = self.lock();
        let now = inner.tick();
        let entry = CacheEntry {
            name: name.to_string(),
            address: address.to_string(),
        };

        let mut colliding = inner.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .filter(|s| s.entry.name == name || s.entry.address == address)
                .map(|_| index)
        });
        if let Some(first) = colliding.next() {
            // Name and address may each collide with a different slot.
            let others: Vec<usize> = colliding.collect();
            for index in others {
                inner.slots[index] = None;
            }
            inner.slots[first] = Some(Slot {
                entry,
                last_used: now,
            });
            return;
        }

        let index = match self.policy {
            EvictionPolicy::RoundRobin => {
                let index = inner.cursor;
                inner.cursor = (index + 1) % inner.slots.len();
                index
            }
            EvictionPolicy::LeastRecentlyUsed => least_recently_used(&inner.slots),
        };
        inner.slots[index] = Some(Slot {
            entry,
            last_used: now,
        });
    }

    /// Consistent snapshot of occupied slots, in slot order.
    pub fn dump(&self) -> Vec<CacheEntry> {
        self.lock()
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Slot writes are single assignments, so a panicking holder cannot
        // leave a torn entry behind.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::new()
    }
}

/// First empty slot, otherwise the slot with the oldest use.
fn least_recently_used(slots: &[Option<Slot>]) -> usize {
    if let Some(index) = slots.iter().position(Option::is_none) {
        return index;
    }
    slots
        .iter()
        .enumerate()
        .min_by_key(|(_, slot)| slot.as_ref().map_or(0, |s| s.last_used))
        .map_or(0, |(index, _)| index)
}
