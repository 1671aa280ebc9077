// File: node.rs
//
// The purpose of this file is to hold the per-node state: identity, finger
// table, successor/predecessor, local key/value store, and lifecycle. The
// Chord algorithms that operate on this state (find_successor, stabilize,
// join, ...) live in dht.rs, since every one of them needs to resolve other
// nodes through the coordinator's registry rather than through an owned
// reference.

use std::collections::HashMap;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::ring::Id;

/// A node's place in the join/leave state machine. Only `Alive` nodes
/// service lookups and participate in maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum NodeLifecycle {
  Joining,
  Alive,
  Leaving,
  Dead,
}

impl NodeLifecycle {
  pub fn is_alive(self) -> bool {
    matches!(self, NodeLifecycle::Alive)
  }
}

/// Mutable state protected by a single per-node lock: `data`, `successor`,
/// `predecessor`, `finger` and `lifecycle` move together.
pub struct NodeState {
  pub successor: Id,
  pub predecessor: Option<Id>,
  pub finger: Vec<Id>,
  pub data: HashMap<String, String>,
  pub lifecycle: NodeLifecycle,
}

impl NodeState {
  fn new(id: Id, m: u32) -> Self {
    NodeState {
      successor: id,
      predecessor: None,
      finger: vec![id; m as usize],
      data: HashMap::new(),
      lifecycle: NodeLifecycle::Joining,
    }
  }

  pub fn alive(&self) -> bool {
    self.lifecycle.is_alive()
  }
}

/// A node actor: a stable identity plus a lock protecting everything that
/// changes. `NodeHandle`s are owned exclusively by the registry in `Dht`;
/// every other reference to a node is by `Id`, resolved back through the
/// registry — never a direct owning pointer (see DESIGN.md on cyclic
/// ownership).
pub struct NodeHandle {
  pub id: Id,
  pub state: Mutex<NodeState>,
  maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl NodeHandle {
  pub fn new(id: Id, m: u32) -> Self {
    NodeHandle {
      id,
      state: Mutex::new(NodeState::new(id, m)),
      maintenance: Mutex::new(None),
    }
  }

  pub fn is_alive(&self) -> bool {
    self.state.lock().alive()
  }

  /// Stores the handle of this node's background maintenance thread so it
  /// can be joined on eviction.
  pub fn set_maintenance_handle(&self, handle: JoinHandle<()>) {
    *self.maintenance.lock() = Some(handle);
  }

  /// Takes the maintenance thread handle, leaving `None` behind. Used by
  /// the coordinator to join the thread exactly once during removal.
  pub fn take_maintenance_handle(&self) -> Option<JoinHandle<()>> {
    self.maintenance.lock().take()
  }
}
