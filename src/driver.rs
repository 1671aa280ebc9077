// File: driver.rs
//
// The purpose of this file is to parse the line-oriented command grammar
// and dispatch each command to the coordinator, returning the plain-text
// status line the command surface contract requires.

use std::sync::Arc;

use crate::dht::Dht;
use crate::error::DhtError;
use crate::observer;
use crate::ring::Id;
use crate::select::ContactSelector;

/// One parsed driver command.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
  Add(Option<Id>),
  Remove(Id),
  Put(String, String),
  Get(String),
  Query(Id),
  Ring,
}

/// Parses one whitespace-separated command line.
///
/// Returns `Err("invalid id")` for a non-integer id argument, and
/// `Err("unknown command")` for anything not in the grammar -- the latter
/// is outside the usual plain-text error set since the grammar is meant
/// to be closed, but surfacing it beats silently doing nothing.
pub fn parse(line: &str) -> Result<Command, String> {
  let mut parts = line.split_whitespace();
  let verb = parts.next().ok_or_else(|| "unknown command".to_string())?;
  match verb {
    "add" => match parts.next() {
      None => Ok(Command::Add(None)),
      Some(raw) => raw.parse::<Id>().map(|id| Command::Add(Some(id))).map_err(|_| "invalid id".to_string()),
    },
    "remove" => {
      let raw = parts.next().ok_or_else(|| format_error(&DhtError::MissingArgument))?;
      raw.parse::<Id>().map(Command::Remove).map_err(|_| "invalid id".to_string())
    }
    "put" => {
      let key = parts.next().ok_or_else(|| format_error(&DhtError::MissingArgument))?.to_string();
      let value = parts.next().ok_or_else(|| format_error(&DhtError::MissingArgument))?.to_string();
      Ok(Command::Put(key, value))
    }
    "get" => {
      let key = parts.next().ok_or_else(|| format_error(&DhtError::MissingArgument))?.to_string();
      Ok(Command::Get(key))
    }
    "query" => {
      let raw = parts.next().ok_or_else(|| format_error(&DhtError::MissingArgument))?;
      raw.parse::<Id>().map(Command::Query).map_err(|_| "invalid id".to_string())
    }
    "ring" => Ok(Command::Ring),
    _ => Err("unknown command".to_string()),
  }
}

/// Runs a parsed command against the coordinator and formats the result as
/// the human-readable status line the command surface contract specifies.
pub fn dispatch(
  dht: &Arc<Dht>,
  command: Command,
  alloc: &dyn crate::select::IdAllocator,
  selector: &dyn ContactSelector,
) -> String {
  match command {
    Command::Add(id) => match dht.add_node(id, alloc, selector) {
      Ok(assigned) => format!("ok node {}", assigned),
      Err(e) => format_error(&e),
    },
    Command::Remove(id) => match dht.remove_node(id) {
      Ok(()) => "ok".to_string(),
      Err(e) => format_error(&e),
    },
    Command::Put(k, v) => match dht.put(&k, &v, selector) {
      Ok(()) => "ok".to_string(),
      Err(e) => format_error(&e),
    },
    Command::Get(k) => match dht.get_kv(&k, selector) {
      Ok(Some(v)) => v,
      Ok(None) => "not found".to_string(),
      Err(e) => format_error(&e),
    },
    Command::Query(id) => {
      if !dht.in_range(id) {
        return "invalid id".to_string();
      }
      if !dht.contains(id) {
        return "unknown id".to_string();
      }
      let successor = observer::successor(dht, id).ok();
      let predecessor = observer::predecessor(dht, id).ok().flatten();
      let fingers = observer::finger_table(dht, id).unwrap_or_default();
      format!(
        "id={} successor={} predecessor={} fingers={}",
        id,
        successor.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()),
        predecessor.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string()),
        fingers.len()
      )
    }
    Command::Ring => {
      let ids: Vec<String> = observer::ring(dht).iter().map(|id| id.to_string()).collect();
      ids.join(" ")
    }
  }
}

fn format_error(e: &DhtError) -> String {
  match e {
    DhtError::InvalidId => "invalid id".to_string(),
    DhtError::OutOfRange { m } => format!("id out of range [0, 2^{})", m),
    DhtError::DuplicateId(_) => "duplicate id".to_string(),
    DhtError::UnknownId(_) => "unknown id".to_string(),
    DhtError::EmptyRing => "empty ring".to_string(),
    DhtError::MissingArgument => "missing argument".to_string(),
  }
}
