// File: select.rs
//
// The purpose of this file is to isolate the two points where the core
// relies on an external source of randomness: picking a fresh node id and
// picking a join contact out of the existing registry. Both are exposed as
// traits so a deterministic source can be substituted in tests.

use std::collections::HashSet;

use rand::Rng;

use crate::ring::Id;

/// Allocates a fresh, unused node id when `add_node` is not given one
/// explicitly.
pub trait IdAllocator: Send + Sync {
  fn allocate(&self, used: &HashSet<Id>, m: u32) -> Id;
}

/// Picks one existing node to act as the join contact for a new node.
pub trait ContactSelector: Send + Sync {
  fn select(&self, candidates: &[Id]) -> Id;
}

/// Default allocator: uniform random retry against the used set, matching
/// the reference implementation's `random.randint` + collision retry.
#[derive(Debug, Default)]
pub struct RandomIdAllocator;

impl IdAllocator for RandomIdAllocator {
  fn allocate(&self, used: &HashSet<Id>, m: u32) -> Id {
    let space = 1u64 << m;
    let mut rng = rand::thread_rng();
    loop {
      let candidate = rng.gen_range(0, space);
      if !used.contains(&candidate) {
        return candidate;
      }
    }
  }
}

/// Default contact selector: uniform random choice among live nodes.
#[derive(Debug, Default)]
pub struct RandomContactSelector;

impl ContactSelector for RandomContactSelector {
  fn select(&self, candidates: &[Id]) -> Id {
    let mut rng = rand::thread_rng();
    let i = rng.gen_range(0, candidates.len());
    candidates[i]
  }
}

/// Deterministic allocator for reproducible test scenarios: hands out ids
/// from a fixed sequence, falling back to the first free slot in ascending
/// order once the sequence is exhausted.
pub struct SeededIdAllocator {
  sequence: Vec<Id>,
  cursor: parking_lot::Mutex<usize>,
}

impl SeededIdAllocator {
  pub fn new(sequence: Vec<Id>) -> Self {
    SeededIdAllocator {
      sequence,
      cursor: parking_lot::Mutex::new(0),
    }
  }
}

impl IdAllocator for SeededIdAllocator {
  fn allocate(&self, used: &HashSet<Id>, m: u32) -> Id {
    let mut cursor = self.cursor.lock();
    while *cursor < self.sequence.len() {
      let candidate = self.sequence[*cursor];
      *cursor += 1;
      if !used.contains(&candidate) {
        return candidate;
      }
    }
    let space = 1u64 << m;
    (0..space).find(|c| !used.contains(c)).expect("ring is full")
  }
}

/// Deterministic contact selector: always picks the first candidate in the
/// order the registry hands them back.
#[derive(Debug, Default)]
pub struct FirstContactSelector;

impl ContactSelector for FirstContactSelector {
  fn select(&self, candidates: &[Id]) -> Id {
    candidates[0]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn seeded_allocator_follows_sequence_then_skips_used() {
    let alloc = SeededIdAllocator::new(vec![3, 5, 5, 9]);
    let mut used = HashSet::new();
    assert_eq!(alloc.allocate(&used, 5), 3);
    used.insert(3);
    assert_eq!(alloc.allocate(&used, 5), 5);
    used.insert(5);
    // second 5 in the sequence is skipped since it's now used
    assert_eq!(alloc.allocate(&used, 5), 9);
  }

  #[test]
  fn first_contact_selector_is_deterministic() {
    let sel = FirstContactSelector;
    assert_eq!(sel.select(&[4, 1, 9]), 4);
  }
}
