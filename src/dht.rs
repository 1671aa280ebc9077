// File: dht.rs
//
// The purpose of this file is to implement the Chord protocol: the per-node
// lookup and maintenance algorithms (find_successor, stabilize, join, ...)
// and the coordinator that owns the node registry and dispatches replicated
// put/get. Every node-to-node "call" below is a direct function call that
// resolves the target through the registry by id -- there is no owning
// pointer from one node to another, only ids (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use parking_lot::RwLock;

use crate::error::{DhtError, DhtResult};
use crate::node::{NodeHandle, NodeLifecycle};
use crate::ring::{hash_key, in_interval, Id};
use crate::select::{ContactSelector, IdAllocator};

/// Startup configuration: identifier-space bit-width, replication factor,
/// and maintenance cadence.
#[derive(Debug, Clone, Copy)]
pub struct Config {
  pub m: u32,
  pub r: usize,
  pub stabilize_period: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      m: 5,
      r: 3,
      stabilize_period: Duration::from_secs(1),
    }
  }
}

/// A point-in-time description of one node, for the observer surface and
/// the driver's `query` command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeDescription {
  pub id: Id,
  pub successor: Id,
  pub predecessor: Option<Id>,
  pub finger: Vec<Id>,
  pub lifecycle: NodeLifecycle,
}

/// Owns the registry of live nodes and dispatches replicated put/get.
/// Always held behind an `Arc` so each node's maintenance thread can hold a
/// clone without owning the coordinator outright.
pub struct Dht {
  pub config: Config,
  nodes: RwLock<HashMap<Id, Arc<NodeHandle>>>,
}

impl Dht {
  pub fn new(config: Config) -> Arc<Dht> {
    Arc::new(Dht {
      config,
      nodes: RwLock::new(HashMap::new()),
    })
  }

  fn modulus(&self) -> u64 {
    1u64 << self.config.m
  }

  fn handle(&self, id: Id) -> Option<Arc<NodeHandle>> {
    self.nodes.read().get(&id).cloned()
  }

  pub fn node_ids(&self) -> Vec<Id> {
    self.nodes.read().keys().cloned().collect()
  }

  /// Ids of nodes currently in the `Alive` lifecycle state -- the only
  /// nodes eligible to be chosen as a lookup entry point, per spec
  /// §4.3 ("Pick any live node as entry"). A node inserted into the
  /// registry by a concurrent `add_node` but not yet past `join()` is
  /// excluded, since its successor/finger table may still point at
  /// itself.
  fn live_node_ids(&self) -> Vec<Id> {
    self
      .nodes
      .read()
      .values()
      .filter(|n| n.is_alive())
      .map(|n| n.id)
      .collect()
  }

  pub fn node_count(&self) -> usize {
    self.nodes.read().len()
  }

  pub fn contains(&self, id: Id) -> bool {
    self.nodes.read().contains_key(&id)
  }

  pub fn in_range(&self, id: Id) -> bool {
    id < self.modulus()
  }

  /// Snapshot of one node's routing state, for the observer surface.
  pub fn describe(&self, id: Id) -> Option<NodeDescription> {
    let node = self.handle(id)?;
    let state = node.state.lock();
    Some(NodeDescription {
      id,
      successor: state.successor,
      predecessor: state.predecessor,
      finger: state.finger.clone(),
      lifecycle: state.lifecycle,
    })
  }

  // ---------------------------------------------------------------------
  // C2: lookup primitives
  // ---------------------------------------------------------------------

  /// Returns the first live node whose id is >= `h` on the ring, as seen
  /// from `from`'s perspective.
  pub fn find_successor(&self, from: Id, h: Id) -> Id {
    let pred = self.find_predecessor(from, h);
    match self.handle(pred) {
      Some(node) => node.state.lock().successor,
      None => pred,
    }
  }

  /// Walks the ring backwards from `from` until it reaches the node whose
  /// successor already covers `h`. Bounded by the self-return guard
  /// (hopping back to `from` stops the walk) plus a hard hop cap as a
  /// defensive backstop against a pathologically stale finger table.
  pub fn find_predecessor(&self, from: Id, h: Id) -> Id {
    let max_hops = self.node_count().max(1) * 4 + self.config.m as usize + 4;
    let mut n = from;
    for _ in 0..max_hops {
      let successor = match self.handle(n) {
        Some(node) => node.state.lock().successor,
        None => return n,
      };
      if in_interval(n, successor, h, false, true) {
        return n;
      }
      let next = self.closest_preceding_finger(n, h);
      if next == from {
        return next;
      }
      n = next;
    }
    warn!("find_predecessor: hop cap reached starting from node {}", from);
    n
  }

  /// Scans `finger[M-1]..finger[0]` and returns the first alive finger
  /// strictly between `from` and `h`; else returns `from` itself.
  pub fn closest_preceding_finger(&self, from: Id, h: Id) -> Id {
    let node = match self.handle(from) {
      Some(n) => n,
      None => return from,
    };
    let fingers = node.state.lock().finger.clone();
    for &f in fingers.iter().rev() {
      if let Some(fnode) = self.handle(f) {
        if fnode.is_alive() && in_interval(from, h, f, false, false) {
          return f;
        }
      }
    }
    from
  }

  // ---------------------------------------------------------------------
  // C2: join procedure
  // ---------------------------------------------------------------------

  pub fn join(&self, id: Id, contact: Option<Id>) {
    match contact {
      None => {
        let node = match self.handle(id) {
          Some(n) => n,
          None => return,
        };
        let mut state = node.state.lock();
        let m = state.finger.len();
        for i in 0..m {
          state.finger[i] = id;
        }
        state.successor = id;
        state.predecessor = Some(id);
        state.lifecycle = NodeLifecycle::Alive;
        info!("node {}: joined as the only node in the ring", id);
      }
      Some(contact_id) => {
        self.init_finger_table(id, contact_id);
        self.update_others(id);
        self.move_keys(id);
        if let Some(node) = self.handle(id) {
          node.state.lock().lifecycle = NodeLifecycle::Alive;
        }
        info!("node {}: joined via contact node {}", id, contact_id);
      }
    }
  }

  fn init_finger_table(&self, id: Id, contact: Id) {
    let m = self.config.m as usize;
    let modulus = self.modulus();

    let succ0 = self.find_successor(contact, (id + 1) % modulus);
    let succ0_pred = self.handle(succ0).and_then(|n| n.state.lock().predecessor);

    if let Some(node) = self.handle(id) {
      let mut state = node.state.lock();
      state.finger[0] = succ0;
      state.successor = succ0;
      state.predecessor = succ0_pred;
    }

    // Conditional write: only claim predecessorship of `succ0` if this
    // node is actually a better fit than whatever `succ0` already has,
    // per the `notify` rule (resolves the open question in DESIGN.md).
    if let Some(succ_node) = self.handle(succ0) {
      let mut succ_state = succ_node.state.lock();
      let better_fit = match succ_state.predecessor {
        None => true,
        Some(p) => p != id && in_interval(p, succ0, id, false, false),
      };
      if better_fit {
        succ_state.predecessor = Some(id);
      }
    }

    for i in 0..m.saturating_sub(1) {
      let start = (id + (1u64 << (i + 1))) % modulus;
      let finger_i = match self.handle(id) {
        Some(node) => node.state.lock().finger[i],
        None => return,
      };
      let next = if in_interval(id, finger_i, start, true, false) {
        finger_i
      } else {
        self.find_successor(contact, start)
      };
      if let Some(node) = self.handle(id) {
        node.state.lock().finger[i + 1] = next;
      }
    }
  }

  fn update_others(&self, id: Id) {
    let m = self.config.m as usize;
    let modulus = self.modulus();
    for i in 0..m {
      let target = (id + modulus - (1u64 << i)) % modulus;
      let p = self.find_predecessor(id, target);
      if p != id {
        self.update_finger_table(p, id, i);
      }
    }
  }

  fn update_finger_table(&self, on: Id, s: Id, i: usize) {
    let node = match self.handle(on) {
      Some(n) => n,
      None => return,
    };
    let (updated, predecessor) = {
      let mut state = node.state.lock();
      let current = state.finger[i];
      if in_interval(on, current, s, false, true) {
        state.finger[i] = s;
        (true, state.predecessor)
      } else {
        (false, state.predecessor)
      }
    };
    if updated {
      if let Some(p) = predecessor {
        if p != on {
          self.update_finger_table(p, s, i);
        }
      }
    }
  }

  fn move_keys(&self, id: Id) {
    let (predecessor, successor) = match self.handle(id) {
      Some(node) => {
        let state = node.state.lock();
        (state.predecessor.unwrap_or(id), state.successor)
      }
      None => return,
    };
    if successor == id {
      return;
    }
    let m = self.config.m;
    let succ_node = match self.handle(successor) {
      Some(n) => n,
      None => return,
    };
    let moved: Vec<(String, String)> = {
      let mut succ_state = succ_node.state.lock();
      let keys: Vec<String> = succ_state
        .data
        .keys()
        .filter(|k| in_interval(predecessor, id, hash_key(k, m), false, true))
        .cloned()
        .collect();
      keys
        .into_iter()
        .filter_map(|k| succ_state.data.remove(&k).map(|v| (k, v)))
        .collect()
    };
    if let Some(node) = self.handle(id) {
      let mut state = node.state.lock();
      for (k, v) in moved {
        state.data.insert(k, v);
      }
    }
  }

  // ---------------------------------------------------------------------
  // C2: maintenance loop steps
  // ---------------------------------------------------------------------

  pub fn stabilize(&self, id: Id) {
    let node = match self.handle(id) {
      Some(n) => n,
      None => return,
    };
    let successor = node.state.lock().successor;
    if let Some(succ_node) = self.handle(successor) {
      let x = succ_node.state.lock().predecessor;
      if let Some(x_id) = x {
        let x_alive = self.handle(x_id).map(|n| n.is_alive()).unwrap_or(false);
        if x_alive && in_interval(id, successor, x_id, false, false) {
          node.state.lock().successor = x_id;
          info!("node {}: successor updated to node {}", id, x_id);
        }
      }
    }
    let successor = node.state.lock().successor;
    self.notify(successor, id);
  }

  /// `candidate` claims to be `target`'s predecessor. The keys transferred
  /// to `candidate` use the *new* predecessor bound once it has been
  /// adopted, matching the reference implementation's read order.
  pub fn notify(&self, target: Id, candidate: Id) {
    let node = match self.handle(target) {
      Some(n) => n,
      None => return,
    };
    let should_adopt = {
      let state = node.state.lock();
      match state.predecessor {
        None => true,
        Some(p) => in_interval(p, target, candidate, false, false),
      }
    };
    if !should_adopt {
      return;
    }
    let moved: Vec<(String, String)> = {
      let mut state = node.state.lock();
      state.predecessor = Some(candidate);
      let m = self.config.m;
      let keys: Vec<String> = state
        .data
        .keys()
        .filter(|k| in_interval(candidate, target, hash_key(k, m), false, true))
        .cloned()
        .collect();
      keys
        .into_iter()
        .filter_map(|k| state.data.remove(&k).map(|v| (k, v)))
        .collect()
    };
    info!("node {}: predecessor updated to node {}", target, candidate);
    if !moved.is_empty() {
      if let Some(candidate_node) = self.handle(candidate) {
        let mut cstate = candidate_node.state.lock();
        for (k, v) in moved {
          cstate.data.insert(k, v);
        }
      }
    }
  }

  pub fn fix_fingers(&self, id: Id) {
    let m = self.config.m as usize;
    let modulus = self.modulus();
    for i in 0..m {
      let start = (id + (1u64 << i)) % modulus;
      let succ = self.find_successor(id, start);
      if let Some(node) = self.handle(id) {
        node.state.lock().finger[i] = succ;
      } else {
        return;
      }
    }
  }

  pub fn check_predecessor(&self, id: Id) {
    let node = match self.handle(id) {
      Some(n) => n,
      None => return,
    };
    let pred = node.state.lock().predecessor;
    if let Some(p) = pred {
      let alive = self.handle(p).map(|n| n.is_alive()).unwrap_or(false);
      if !alive {
        node.state.lock().predecessor = None;
        info!("node {}: predecessor node {} is dead", id, p);
      }
    }
  }

  // ---------------------------------------------------------------------
  // C2: leave procedure, local store/retrieve
  // ---------------------------------------------------------------------

  pub fn leave(&self, id: Id) {
    let node = match self.handle(id) {
      Some(n) => n,
      None => return,
    };
    let (predecessor, successor, data) = {
      let mut state = node.state.lock();
      state.lifecycle = NodeLifecycle::Leaving;
      (state.predecessor, state.successor, std::mem::take(&mut state.data))
    };
    if successor != id {
      if let Some(succ_node) = self.handle(successor) {
        let mut succ_state = succ_node.state.lock();
        for (k, v) in data {
          succ_state.data.insert(k, v);
        }
        succ_state.predecessor = predecessor;
      }
    }
    if let Some(p) = predecessor {
      if p != id {
        if let Some(pred_node) = self.handle(p) {
          pred_node.state.lock().successor = successor;
        }
      }
    }
    node.state.lock().lifecycle = NodeLifecycle::Dead;
    info!("node {}: left the ring", id);
  }

  pub fn store(&self, id: Id, key: String, value: String) {
    if let Some(node) = self.handle(id) {
      node.state.lock().data.insert(key, value);
    }
  }

  pub fn retrieve(&self, id: Id, key: &str) -> Option<String> {
    self.handle(id).and_then(|n| n.state.lock().data.get(key).cloned())
  }
}

impl Dht {
  // ---------------------------------------------------------------------
  // C3: coordinator operations
  // ---------------------------------------------------------------------

  /// Admits a node: allocates or validates an id, constructs the node,
  /// joins it through a chosen contact (or self-joins an empty ring), and
  /// starts its background maintenance thread.
  pub fn add_node(
    self: &Arc<Self>,
    id: Option<Id>,
    alloc: &dyn IdAllocator,
    selector: &dyn ContactSelector,
  ) -> DhtResult<Id> {
    let modulus = self.modulus();
    let new_id = {
      let mut nodes = self.nodes.write();
      let chosen = match id {
        Some(explicit) => {
          if explicit >= modulus {
            return Err(DhtError::OutOfRange { m: self.config.m });
          }
          if nodes.contains_key(&explicit) {
            return Err(DhtError::DuplicateId(explicit));
          }
          explicit
        }
        None => {
          let used: std::collections::HashSet<Id> = nodes.keys().cloned().collect();
          alloc.allocate(&used, self.config.m)
        }
      };
      nodes.insert(chosen, Arc::new(NodeHandle::new(chosen, self.config.m)));
      chosen
    };

    let contact = {
      let nodes = self.nodes.read();
      let candidates: Vec<Id> = nodes.keys().cloned().filter(|&i| i != new_id).collect();
      if candidates.is_empty() {
        None
      } else {
        Some(selector.select(&candidates))
      }
    };

    self.join(new_id, contact);
    self.spawn_maintenance(new_id);
    info!("dht: node {} added", new_id);
    Ok(new_id)
  }

  /// Evicts a node: runs its leave procedure, removes it from the
  /// registry, then joins its maintenance thread so it cannot touch a
  /// registry entry that no longer exists.
  pub fn remove_node(&self, id: Id) -> DhtResult<()> {
    if !self.in_range(id) {
      return Err(DhtError::InvalidId);
    }
    let node = {
      let nodes = self.nodes.read();
      nodes.get(&id).cloned()
    };
    let node = node.ok_or(DhtError::UnknownId(id))?;
    self.leave(id);
    {
      let mut nodes = self.nodes.write();
      nodes.remove(&id);
    }
    if let Some(handle) = node.take_maintenance_handle() {
      let _ = handle.join();
    }
    info!("dht: node {} removed", id);
    Ok(())
  }

  fn spawn_maintenance(self: &Arc<Self>, id: Id) {
    let dht = Arc::clone(self);
    let period_ms = self.config.stabilize_period.as_millis() as u32;
    let handle = thread::Builder::new()
      .name(format!("chord-maintenance-{}", id))
      .spawn(move || {
        let tick = chan::tick_ms(period_ms);
        loop {
          tick.recv();
          match dht.handle(id) {
            Some(node) if node.is_alive() => {}
            _ => break,
          }
          dht.stabilize(id);
          dht.fix_fingers(id);
          dht.check_predecessor(id);
        }
      })
      .expect("failed to spawn node maintenance thread");
    if let Some(node) = self.handle(id) {
      node.set_maintenance_handle(handle);
    }
  }

  /// Stores `key`/`value` on the primary replica (the successor of the
  /// key's hash) and on up to `r - 1` further successors.
  pub fn put(&self, key: &str, value: &str, selector: &dyn ContactSelector) -> DhtResult<()> {
    let ids = self.live_node_ids();
    if ids.is_empty() {
      return Err(DhtError::EmptyRing);
    }
    let r = self.config.r.min(ids.len());
    let entry = selector.select(&ids);
    let h = hash_key(key, self.config.m);
    let primary = self.find_successor(entry, h);
    self.store(primary, key.to_string(), value.to_string());

    let mut current = primary;
    let mut replicated = 1;
    while replicated < r {
      let next = match self.handle(current) {
        Some(node) => node.state.lock().successor,
        None => break,
      };
      if next == primary {
        break;
      }
      self.store(next, key.to_string(), value.to_string());
      current = next;
      replicated += 1;
    }
    Ok(())
  }

  /// Probes the primary replica and up to `r - 1` further successors,
  /// returning the first value found.
  pub fn get_kv(&self, key: &str, selector: &dyn ContactSelector) -> DhtResult<Option<String>> {
    let ids = self.live_node_ids();
    if ids.is_empty() {
      return Err(DhtError::EmptyRing);
    }
    let r = self.config.r.min(ids.len());
    let entry = selector.select(&ids);
    let h = hash_key(key, self.config.m);
    let primary = self.find_successor(entry, h);

    let mut current = primary;
    for _ in 0..r {
      if let Some(v) = self.retrieve(current, key) {
        return Ok(Some(v));
      }
      let next = match self.handle(current) {
        Some(node) => node.state.lock().successor,
        None => break,
      };
      if next == primary {
        break;
      }
      current = next;
    }
    Ok(None)
  }
}
