//! GridKeyHashTable - `(level, global_id) -> storage_id` index.
//!
//! Open addressing with linear probing over a power-of-two table. Deletion
//! is tombstone-free: after emptying a slot, later entries of the same probe
//! chain are shifted back into the hole so every surviving key stays
//! reachable from its home slot.
//!
//! # Usage
//!
//! ```ignore
//! let mut table = GridKeyHashTable::new(1024);
//! table.update(0, 1, 42)?;
//! assert_eq!(table.get(1, 42), Some(0));
//! table.delete(1, 42);
//! ```

use crate::constants::{table_size_for, EMPTY_SLOT, FNV_OFFSET_BASIS, FNV_PRIME};
use crate::error::{GridError, GridResult};

/// FNV-1a over the level byte then the global id, in wrapping `u32`.
#[inline]
pub fn fnv1a(level: u8, global_id: u32) -> u32 {
  let mut hash = FNV_OFFSET_BASIS;
  hash ^= level as u32;
  hash = hash.wrapping_mul(FNV_PRIME);
  hash ^= global_id;
  hash.wrapping_mul(FNV_PRIME)
}

#[derive(Clone, Debug)]
pub struct GridKeyHashTable {
  levels: Vec<u8>,
  global_ids: Vec<u32>,
  storage_ids: Vec<u32>,
  mask: usize,
  len: usize,
  capacity: usize,
}

impl GridKeyHashTable {
  /// Table able to hold `expected_cells` live keys.
  pub fn new(expected_cells: usize) -> Self {
    let size = table_size_for(expected_cells);
    Self {
      levels: vec![0; size],
      global_ids: vec![0; size],
      storage_ids: vec![EMPTY_SLOT; size],
      mask: size - 1,
      len: 0,
      capacity: expected_cells,
    }
  }

  #[inline]
  fn home_slot(&self, level: u8, global_id: u32) -> usize {
    fnv1a(level, global_id) as usize & self.mask
  }

  #[inline]
  fn is_empty_slot(&self, slot: usize) -> bool {
    self.storage_ids[slot] == EMPTY_SLOT
  }

  #[inline]
  fn matches(&self, slot: usize, level: u8, global_id: u32) -> bool {
    self.levels[slot] == level && self.global_ids[slot] == global_id
  }

  /// Slot holding the key, if present.
  fn find(&self, level: u8, global_id: u32) -> Option<usize> {
    let mut slot = self.home_slot(level, global_id);
    for _ in 0..self.table_size() {
      if self.is_empty_slot(slot) {
        return None;
      }
      if self.matches(slot, level, global_id) {
        return Some(slot);
      }
      slot = (slot + 1) & self.mask;
    }
    None
  }

  /// Storage id of the key, `None` when absent.
  pub fn get(&self, level: u8, global_id: u32) -> Option<u32> {
    self.find(level, global_id).map(|slot| self.storage_ids[slot])
  }

  pub fn contains(&self, level: u8, global_id: u32) -> bool {
    self.find(level, global_id).is_some()
  }

  /// Insert the key or re-point it at `storage_id`.
  ///
  /// Inserting a new key once `capacity()` keys are live fails with
  /// `CapacityExceeded`; re-pointing an existing key always succeeds.
  pub fn update(&mut self, storage_id: u32, level: u8, global_id: u32) -> GridResult<()> {
    debug_assert!(storage_id != EMPTY_SLOT, "storage id collides with the empty marker");

    let mut slot = self.home_slot(level, global_id);
    for _ in 0..self.table_size() {
      if self.is_empty_slot(slot) {
        if self.len >= self.capacity {
          return Err(GridError::CapacityExceeded {
            requested: self.len + 1,
            capacity: self.capacity,
          });
        }
        self.levels[slot] = level;
        self.global_ids[slot] = global_id;
        self.storage_ids[slot] = storage_id;
        self.len += 1;
        return Ok(());
      }
      if self.matches(slot, level, global_id) {
        self.storage_ids[slot] = storage_id;
        return Ok(());
      }
      slot = (slot + 1) & self.mask;
    }

    Err(GridError::CapacityExceeded {
      requested: self.len + 1,
      capacity: self.capacity,
    })
  }

  /// Remove the key. Returns the storage id it mapped to; absent keys are a
  /// no-op.
  pub fn delete(&mut self, level: u8, global_id: u32) -> Option<u32> {
    let found = self.find(level, global_id)?;
    let removed = self.storage_ids[found];
    self.storage_ids[found] = EMPTY_SLOT;
    self.len -= 1;

    // Backward shift: an entry may fill the hole unless its home slot lies
    // cyclically in (hole, current].
    let mut hole = found;
    let mut current = (found + 1) & self.mask;
    for _ in 0..self.table_size() {
      if self.is_empty_slot(current) {
        break;
      }
      let home = self.home_slot(self.levels[current], self.global_ids[current]);
      if !cyclic_in_range(home, hole, current) {
        self.levels[hole] = self.levels[current];
        self.global_ids[hole] = self.global_ids[current];
        self.storage_ids[hole] = self.storage_ids[current];
        self.storage_ids[current] = EMPTY_SLOT;
        hole = current;
      }
      current = (current + 1) & self.mask;
    }

    Some(removed)
  }

  /// Drop every key, keeping the allocation.
  pub fn clear(&mut self) {
    self.storage_ids.fill(EMPTY_SLOT);
    self.len = 0;
  }

  /// Live keys.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Maximum number of live keys.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Number of slots in the table.
  pub fn table_size(&self) -> usize {
    self.storage_ids.len()
  }

  /// Iterate `(level, global_id, storage_id)` over live entries, in slot
  /// order.
  pub fn iter(&self) -> impl Iterator<Item = (u8, u32, u32)> + '_ {
    (0..self.table_size())
      .filter(|&slot| !self.is_empty_slot(slot))
      .map(|slot| (self.levels[slot], self.global_ids[slot], self.storage_ids[slot]))
  }
}

/// `home` in the cyclic interval `(start, end]`.
#[inline]
fn cyclic_in_range(home: usize, start: usize, end: usize) -> bool {
  if start <= end {
    start < home && home <= end
  } else {
    home > start || home <= end
  }
}

#[cfg(test)]
#[path = "key_table_test.rs"]
mod key_table_test;
