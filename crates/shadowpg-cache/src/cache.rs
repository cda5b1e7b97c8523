//! Resident page bookkeeping.

use shadowpg_arch_amd64::Amd64;
use shadowpg_core::{Pa, Va};

/// A backing slot of the resident page pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidentEntry {
    /// Whether the slot currently backs a guest page.
    pub in_use: bool,

    /// Insertion stamp of the current occupant.
    pub creation_index: u64,

    /// Page-aligned guest virtual address of the current occupant.
    pub va: Va,

    /// Guest physical address of the slot. Fixed for the lifetime of the
    /// cache.
    pub pa: Pa,
}

/// Fixed-capacity record of the resident guest pages.
///
/// Each slot owns one guest physical page, assigned when the cache is
/// created. Slots are reclaimed oldest-first by insertion order (FIFO), not
/// by access recency.
#[derive(Debug)]
pub struct EvictionCache {
    entries: Box<[ResidentEntry]>,
    next_creation_index: u64,
}

impl EvictionCache {
    /// Creates a cache of `capacity` free slots whose physical pages start at
    /// `pool_base`.
    pub fn new(pool_base: Pa, capacity: usize) -> Self {
        let entries = (0..capacity)
            .map(|slot| ResidentEntry {
                in_use: false,
                creation_index: 0,
                va: Va(0),
                pa: pool_base + slot as u64 * Amd64::PAGE_SIZE,
            })
            .collect();

        Self {
            entries,
            next_creation_index: 0,
        }
    }

    /// Returns the number of slots.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Returns the number of slots in use.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Checks whether no slot is in use.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stamp the next inserted page will receive.
    pub fn next_creation_index(&self) -> u64 {
        self.next_creation_index
    }

    /// Returns the slot at `slot`, whether in use or not.
    pub fn entry(&self, slot: usize) -> Option<&ResidentEntry> {
        self.entries.get(slot)
    }

    /// Iterates over the slots in use, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ResidentEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.in_use)
    }

    /// Returns the slot holding the page `va`.
    pub fn find(&self, va: Va) -> Option<usize> {
        self.iter()
            .find(|(_, entry)| entry.va == va)
            .map(|(slot, _)| slot)
    }

    /// Returns the first free slot.
    pub fn free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|entry| !entry.in_use)
    }

    /// Returns the slot in use with the smallest creation index.
    pub fn oldest(&self) -> Option<usize> {
        self.iter()
            .min_by_key(|(_, entry)| entry.creation_index)
            .map(|(slot, _)| slot)
    }

    /// Binds `va` to `slot` and stamps it with the next creation index.
    ///
    /// Returns the stamp.
    pub(crate) fn occupy(&mut self, slot: usize, va: Va) -> u64 {
        let creation_index = self.next_creation_index;
        let entry = &mut self.entries[slot];

        debug_assert!(!entry.in_use, "occupying a slot in use");
        entry.in_use = true;
        entry.va = va;
        entry.creation_index = creation_index;

        self.next_creation_index += 1;
        creation_index
    }

    /// Marks `slot` as free and returns its previous state.
    pub(crate) fn release(&mut self, slot: usize) -> ResidentEntry {
        let entry = &mut self.entries[slot];
        let previous = *entry;

        entry.in_use = false;
        previous
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
