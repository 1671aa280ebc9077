// File: error.rs
//
// The purpose of this file is to define the error taxonomy reported across
// the coordinator/driver boundary.

use thiserror::Error;

use crate::ring::Id;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DhtError {
  #[error("invalid id")]
  InvalidId,

  #[error("id out of range [0, 2^{m})")]
  OutOfRange { m: u32 },

  #[error("duplicate id")]
  DuplicateId(Id),

  #[error("unknown id")]
  UnknownId(Id),

  #[error("empty ring")]
  EmptyRing,

  #[error("missing argument")]
  MissingArgument,
}

pub type DhtResult<T> = Result<T, DhtError>;
