//! Error types for `rostra-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::transaction::TransactionStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("user not found: {0}")]
  UserNotFound(Uuid),

  #[error("record not found: {0}")]
  RecordNotFound(Uuid),

  /// The record exists but belongs to another user.
  #[error("record {0} is not owned by the caller")]
  Forbidden(Uuid),

  #[error("email is already registered")]
  DuplicateEmail,

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("unknown order: {0}")]
  UnknownOrder(String),

  #[error("order {order_id} is already {current}, cannot become {requested}")]
  AlreadyTerminal {
    order_id:  String,
    current:   TransactionStatus,
    requested: TransactionStatus,
  },

  #[error("order {order_id} cannot move from {from} to {to}")]
  InvalidTransition {
    order_id: String,
    from:     TransactionStatus,
    to:       TransactionStatus,
  },

  /// Every compare-and-swap attempt lost to a concurrent writer.
  #[error("order {0} is under contention")]
  Contention(String),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
