// End-to-end scenarios run against the public `chorduss` library crate,
// exercising the coordinator the same way the line driver would.

use std::time::Duration;

use chorduss::dht::{Config, Dht};
use chorduss::error::DhtError;
use chorduss::ring::hash_key;
use chorduss::select::{FirstContactSelector, SeededIdAllocator};

fn ring(m: u32, r: usize) -> std::sync::Arc<Dht> {
  Dht::new(Config {
    m,
    r,
    stabilize_period: Duration::from_millis(20),
  })
}

fn converge(dht: &Dht, rounds: usize) {
  for _ in 0..rounds {
    for id in dht.node_ids() {
      dht.stabilize(id);
      dht.fix_fingers(id);
      dht.check_predecessor(id);
    }
  }
}

#[test]
fn scenario_1_five_node_ring_matches_spec_example() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![1, 8, 14, 21, 28]);
  let sel = FirstContactSelector;
  for _ in 0..5 {
    dht.add_node(None, &alloc, &sel).unwrap();
  }
  converge(&dht, 3);

  let mut ids = dht.node_ids();
  ids.sort_unstable();
  assert_eq!(ids, vec![1, 8, 14, 21, 28]);

  let one = dht.describe(1).unwrap();
  assert_eq!(one.successor, 8);
  assert_eq!(one.predecessor, Some(28));
}

#[test]
fn scenario_2_put_replicates_to_primary_and_next_two_successors() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![1, 8, 14, 21, 28]);
  let sel = FirstContactSelector;
  for _ in 0..5 {
    dht.add_node(None, &alloc, &sel).unwrap();
  }
  converge(&dht, 3);

  dht.put("hello", "world", &sel).unwrap();

  let h = hash_key("hello", 5);
  let primary = dht.find_successor(1, h);
  assert_eq!(dht.retrieve(primary, "hello"), Some("world".to_string()));

  let second = dht.describe(primary).unwrap().successor;
  let third = dht.describe(second).unwrap().successor;
  assert_eq!(dht.retrieve(second, "hello"), Some("world".to_string()));
  assert_eq!(dht.retrieve(third, "hello"), Some("world".to_string()));
}

#[test]
fn scenario_3_value_survives_removal_of_one_replica_holder() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![1, 8, 14, 21, 28]);
  let sel = FirstContactSelector;
  for _ in 0..5 {
    dht.add_node(None, &alloc, &sel).unwrap();
  }
  converge(&dht, 3);
  dht.put("hello", "world", &sel).unwrap();

  dht.remove_node(14).unwrap();
  converge(&dht, 3);

  assert_eq!(dht.get_kv("hello", &sel).unwrap(), Some("world".to_string()));
}

#[test]
fn scenario_4_readd_restores_ring_size_and_finger_consistency() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![1, 8, 14, 21, 28]);
  let sel = FirstContactSelector;
  for _ in 0..5 {
    dht.add_node(None, &alloc, &sel).unwrap();
  }
  converge(&dht, 3);
  dht.remove_node(14).unwrap();
  converge(&dht, 3);
  assert_eq!(dht.node_count(), 4);

  let reentry = SeededIdAllocator::new(vec![15]);
  dht.add_node(None, &reentry, &sel).unwrap();
  converge(&dht, 6);

  assert_eq!(dht.node_count(), 5);
  for id in dht.node_ids() {
    for (i, &finger) in dht.describe(id).unwrap().finger.iter().enumerate() {
      let start = (id + (1u64 << i)) % 32;
      assert_eq!(finger, dht.find_successor(id, start));
    }
  }
}

#[test]
fn scenario_5_error_vocabulary_matches_spec() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![1, 8, 14, 21, 28]);
  let sel = FirstContactSelector;
  for _ in 0..5 {
    dht.add_node(None, &alloc, &sel).unwrap();
  }
  converge(&dht, 3);

  // query 99 is out of range for m=5 (2^5 = 32)
  assert_eq!(chorduss::observer::finger_table(&dht, 99), Err(DhtError::UnknownId(99)));
  assert!(!dht.in_range(99));

  // remove 7 is in-range but no node holds it
  assert_eq!(dht.remove_node(7), Err(DhtError::UnknownId(7)));

  let empty = ring(5, 3);
  assert_eq!(empty.put("k", "v", &sel), Err(DhtError::EmptyRing));
}

#[test]
fn scenario_6_explicit_duplicate_id_rejected() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![]);
  let sel = FirstContactSelector;
  dht.add_node(Some(4), &alloc, &sel).unwrap();
  assert_eq!(dht.add_node(Some(4), &alloc, &sel), Err(DhtError::DuplicateId(4)));
}

#[test]
fn boundary_ring_of_one_is_self_referential() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![9]);
  let sel = FirstContactSelector;
  let id = dht.add_node(None, &alloc, &sel).unwrap();

  let desc = dht.describe(id).unwrap();
  assert_eq!(desc.successor, id);
  assert_eq!(desc.predecessor, Some(id));
  assert!(desc.finger.iter().all(|&f| f == id));

  dht.put("k", "v", &sel).unwrap();
  assert_eq!(dht.get_kv("k", &sel).unwrap(), Some("v".to_string()));
}

#[test]
fn boundary_ring_of_two_nodes_are_mutual_successor_and_predecessor() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![3, 19]);
  let sel = FirstContactSelector;
  dht.add_node(None, &alloc, &sel).unwrap();
  dht.add_node(None, &alloc, &sel).unwrap();
  converge(&dht, 4);

  let a = dht.describe(3).unwrap();
  let b = dht.describe(19).unwrap();
  assert_eq!(a.successor, 19);
  assert_eq!(a.predecessor, Some(19));
  assert_eq!(b.successor, 3);
  assert_eq!(b.predecessor, Some(3));
}

#[test]
fn boundary_key_hash_above_every_id_wraps_to_smallest_node() {
  let dht = ring(5, 3);
  let alloc = SeededIdAllocator::new(vec![1, 8, 14]);
  let sel = FirstContactSelector;
  for _ in 0..3 {
    dht.add_node(None, &alloc, &sel).unwrap();
  }
  converge(&dht, 4);

  // 30 sits above every node id (1, 8, 14) and below the modulus (32),
  // so the successor lookup must wrap around the ring's origin.
  let routed = dht.find_successor(1, 30);
  assert_eq!(routed, 1);
}

#[test]
fn concurrent_adds_never_assign_duplicate_ids() {
  use std::sync::Arc;
  use std::thread;

  let dht = ring(5, 3);
  let alloc = Arc::new(chorduss::select::RandomIdAllocator);
  let sel = Arc::new(FirstContactSelector);

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let dht = Arc::clone(&dht);
      let alloc = Arc::clone(&alloc);
      let sel = Arc::clone(&sel);
      thread::spawn(move || dht.add_node(None, alloc.as_ref(), sel.as_ref()).unwrap())
    })
    .collect();

  let mut assigned: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
  assigned.sort_unstable();
  let before = assigned.len();
  assigned.dedup();
  assert_eq!(assigned.len(), before, "add_node produced a duplicate id");
  assert_eq!(dht.node_count(), 8);
}
