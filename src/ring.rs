// File: ring.rs
//
// The purpose of this file is to hash a given key with SHA-1
// and determine if a given id is between two other ids in the ring.

use sha1::{Digest, Sha1};

/// A node or key identifier on the modular ring `[0, 2^m)`.
pub type Id = u64;

/// Reduces a full SHA-1 digest to the low `m` bits used as ring identifiers.
///
/// Only the trailing bytes of the digest are consulted: `m` is bounded to 64
/// in this crate (see `Config::modulus`), so a `u64` built from the last 8
/// digest bytes already contains every bit the modulus could keep.
pub fn hash_key(key: &str, m: u32) -> Id {
  let mut hasher = Sha1::new();
  hasher.input(key.as_bytes());
  let digest = hasher.result();
  let mut acc: u64 = 0;
  for byte in &digest[digest.len() - 8..] {
    acc = (acc << 8) | (*byte as u64);
  }
  acc % (1u64 << m)
}

/// Returns whether `x` lies in the interval from `start` to `end`, walking
/// clockwise around the ring, with endpoint inclusion controlled by the two
/// flags.
///
/// * `start == end`: the interval covers the whole ring.
/// * `start < end`: ordinary bounded check.
/// * `start > end`: the interval wraps through the ring's origin.
pub fn in_interval(start: Id, end: Id, x: Id, inclusive_start: bool, inclusive_end: bool) -> bool {
  if start == end {
    return true;
  }
  if start < end {
    match (inclusive_start, inclusive_end) {
      (true, true) => start <= x && x <= end,
      (true, false) => start <= x && x < end,
      (false, true) => start < x && x <= end,
      (false, false) => start < x && x < end,
    }
  } else {
    match (inclusive_start, inclusive_end) {
      (true, true) => x >= start || x <= end,
      (true, false) => x >= start || x < end,
      (false, true) => x > start || x <= end,
      (false, false) => x > start || x < end,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn whole_ring_when_endpoints_equal() {
    assert!(in_interval(7, 7, 0, false, false));
    assert!(in_interval(7, 7, 31, true, true));
  }

  #[test]
  fn bounded_interval_respects_flags() {
    assert!(!in_interval(1, 5, 1, false, false));
    assert!(in_interval(1, 5, 1, true, false));
    assert!(!in_interval(1, 5, 5, false, false));
    assert!(in_interval(1, 5, 5, false, true));
    assert!(in_interval(1, 5, 3, false, false));
  }

  #[test]
  fn wraparound_interval() {
    // ring of 32 (m=5): interval (28, 2) wraps through 0
    assert!(in_interval(28, 2, 30, false, false));
    assert!(in_interval(28, 2, 0, false, false));
    assert!(!in_interval(28, 2, 2, false, false));
    assert!(in_interval(28, 2, 2, false, true));
    assert!(!in_interval(28, 2, 28, false, false));
    assert!(in_interval(28, 2, 28, true, false));
  }

  #[test]
  fn hash_key_is_bounded_by_modulus() {
    for k in ["hello", "world", "", "node-7"] {
      let h = hash_key(k, 5);
      assert!(h < 32);
    }
  }

  #[test]
  fn hash_key_is_deterministic() {
    assert_eq!(hash_key("hello", 5), hash_key("hello", 5));
  }
}
