use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::constants::MIN_TABLE_SIZE;

/// First `count` level-1 global ids whose home slot equals that of id 0.
fn colliding_ids(table: &GridKeyHashTable, count: usize) -> Vec<u32> {
  let target = table.home_slot(1, 0);
  (0u32..)
    .filter(|&id| table.home_slot(1, id) == target)
    .take(count)
    .collect()
}

/// Every live key maps to its expected value and nothing else is present.
fn assert_bijection(table: &GridKeyHashTable, expected: &HashMap<(u8, u32), u32>) {
  assert_eq!(table.len(), expected.len());
  for (&(level, global_id), &storage_id) in expected {
    assert_eq!(
      table.get(level, global_id),
      Some(storage_id),
      "key ({level}, {global_id}) lost"
    );
  }
  assert_eq!(table.iter().count(), expected.len());
}

// =============================================================================
// Hashing & sizing
// =============================================================================

#[test]
fn test_fnv1a_matches_reference() {
  // Hand-computed FNV-1a over (0, 0).
  let expected = 2_166_136_261u32
    .wrapping_mul(16_777_619)
    .wrapping_mul(16_777_619);
  assert_eq!(fnv1a(0, 0), expected);
  assert_ne!(fnv1a(1, 0), fnv1a(0, 1));
}

#[test]
fn test_table_size() {
  assert_eq!(GridKeyHashTable::new(10).table_size(), MIN_TABLE_SIZE);
  assert_eq!(GridKeyHashTable::new(5000).table_size(), 16384);
  assert_eq!(GridKeyHashTable::new(5000).capacity(), 5000);
}

// =============================================================================
// Basic operations
// =============================================================================

#[test]
fn test_insert_get_relocate() {
  let mut table = GridKeyHashTable::new(64);
  table.update(0, 1, 42).unwrap();
  table.update(1, 2, 42).unwrap();
  assert_eq!(table.get(1, 42), Some(0));
  assert_eq!(table.get(2, 42), Some(1));

  table.update(7, 1, 42).unwrap();
  assert_eq!(table.get(1, 42), Some(7));
  assert_eq!(table.len(), 2);
}

/// Absent keys are a lookup miss and a delete no-op.
#[test]
fn test_absent_keys() {
  let mut table = GridKeyHashTable::new(64);
  table.update(0, 1, 1).unwrap();
  assert_eq!(table.get(3, 99), None);
  assert_eq!(table.delete(3, 99), None);
  assert_eq!(table.len(), 1);
}

#[test]
fn test_capacity_exceeded_on_new_key_only() {
  let mut table = GridKeyHashTable::new(2);
  table.update(0, 1, 0).unwrap();
  table.update(1, 1, 1).unwrap();

  let err = table.update(2, 1, 2).unwrap_err();
  assert!(matches!(
    err,
    GridError::CapacityExceeded {
      requested: 3,
      capacity: 2
    }
  ));

  // Re-pointing a live key is still allowed at capacity.
  table.update(5, 1, 1).unwrap();
  assert_eq!(table.get(1, 1), Some(5));
}

// =============================================================================
// Probe chains
// =============================================================================

/// Five keys sharing one home slot; deleting the middle keeps the rest
/// reachable.
#[test]
fn test_delete_middle_of_collision_chain() {
  let mut table = GridKeyHashTable::new(64);
  let ids = colliding_ids(&table, 5);
  for (storage_id, &id) in ids.iter().enumerate() {
    table.update(storage_id as u32, 1, id).unwrap();
  }

  assert_eq!(table.delete(1, ids[2]), Some(2));
  assert_eq!(table.get(1, ids[2]), None);
  for (storage_id, &id) in ids.iter().enumerate() {
    if storage_id != 2 {
      assert_eq!(table.get(1, id), Some(storage_id as u32));
    }
  }
  assert_eq!(table.len(), 4);
}

/// Deleting the head of a chain shifts the tail back toward home.
#[test]
fn test_delete_chain_head() {
  let mut table = GridKeyHashTable::new(64);
  let ids = colliding_ids(&table, 3);
  for (storage_id, &id) in ids.iter().enumerate() {
    table.update(storage_id as u32, 1, id).unwrap();
  }
  table.delete(1, ids[0]);
  assert_eq!(table.get(1, ids[1]), Some(1));
  assert_eq!(table.get(1, ids[2]), Some(2));

  // Re-insert lands in the freed chain without duplicating.
  table.update(9, 1, ids[0]).unwrap();
  assert_eq!(table.len(), 3);
  assert_eq!(table.get(1, ids[0]), Some(9));
}

/// Bijection holds after a long random mix of inserts, relocations and
/// deletes.
#[test]
fn test_bijection_under_random_sequence() {
  let mut rng = StdRng::seed_from_u64(0x5eed);
  let mut table = GridKeyHashTable::new(4096);
  let mut expected: HashMap<(u8, u32), u32> = HashMap::new();

  for step in 0..20_000u32 {
    let level = rng.random_range(0..4u8);
    let global_id = rng.random_range(0..3000u32);
    if rng.random_bool(0.6) {
      if expected.len() < table.capacity() || expected.contains_key(&(level, global_id)) {
        table.update(step, level, global_id).unwrap();
        expected.insert((level, global_id), step);
      }
    } else {
      let removed = table.delete(level, global_id);
      assert_eq!(removed, expected.remove(&(level, global_id)));
    }
  }

  assert_bijection(&table, &expected);
}

#[test]
fn test_clear() {
  let mut table = GridKeyHashTable::new(16);
  table.update(0, 0, 0).unwrap();
  table.clear();
  assert!(table.is_empty());
  assert_eq!(table.get(0, 0), None);
}
