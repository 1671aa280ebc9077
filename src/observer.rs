// File: observer.rs
//
// The purpose of this file is to provide read-only snapshots of ring state
// for visualization and tests. Every query here takes its view of a node
// under that node's own lock, rather than a registry-wide lock, so the
// observer never blocks active put/get traffic on more than one node at a
// time.

use serde::Serialize;

use crate::dht::Dht;
use crate::error::{DhtError, DhtResult};
use crate::ring::Id;

/// A full-ring snapshot: every live node's id, successor, predecessor and
/// finger table, suitable for handing to a visualizer in one shot.
#[derive(Debug, Serialize)]
pub struct RingSnapshot {
  pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct NodeSnapshot {
  pub id: Id,
  pub successor: Id,
  pub predecessor: Option<Id>,
  pub finger: Vec<Id>,
}

impl RingSnapshot {
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
  }
}

/// Ids of every live node, sorted ascending.
pub fn ring(dht: &Dht) -> Vec<Id> {
  let mut ids = dht.node_ids();
  ids.sort_unstable();
  ids
}

/// The sequence of finger node ids for `id`.
pub fn finger_table(dht: &Dht, id: Id) -> DhtResult<Vec<Id>> {
  dht.describe(id).map(|d| d.finger).ok_or(DhtError::UnknownId(id))
}

pub fn successor(dht: &Dht, id: Id) -> DhtResult<Id> {
  dht.describe(id).map(|d| d.successor).ok_or(DhtError::UnknownId(id))
}

pub fn predecessor(dht: &Dht, id: Id) -> DhtResult<Option<Id>> {
  dht.describe(id).map(|d| d.predecessor).ok_or(DhtError::UnknownId(id))
}

/// Full-ring snapshot for the visualization/driver surface.
pub fn snapshot(dht: &Dht) -> RingSnapshot {
  let mut nodes: Vec<NodeSnapshot> = ring(dht)
    .into_iter()
    .filter_map(|id| {
      dht.describe(id).map(|d| NodeSnapshot {
        id: d.id,
        successor: d.successor,
        predecessor: d.predecessor,
        finger: d.finger,
      })
    })
    .collect();
  nodes.sort_by_key(|n| n.id);
  RingSnapshot { nodes }
}
