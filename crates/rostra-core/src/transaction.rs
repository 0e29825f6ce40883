//! Payment transactions and their state machine.
//!
//! ```text
//! created ──► pending ──► settled | denied | expired | cancelled
//!    └────────────────────────┘
//! ```
//!
//! `created` and `pending` are the only non-terminal states. Status changes
//! are recorded in an append-only event log alongside the current status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::plan::Plan;

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
  Created,
  Pending,
  Settled,
  Denied,
  Expired,
  Cancelled,
}

/// What applying a requested status to the current one amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  /// Write the new status.
  Advance,
  /// Already there; nothing to write.
  Unchanged,
}

/// Why a requested status was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
  /// Terminal, and the request names a different terminal state.
  AlreadyTerminal,
  /// Any other move the machine does not allow (e.g. backwards).
  InvalidTransition,
}

impl TransactionStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      Self::Settled | Self::Denied | Self::Expired | Self::Cancelled
    )
  }

  /// Decide how moving from `self` to `target` plays out. Pure.
  pub fn decide(self, target: Self) -> Result<Step, Refusal> {
    if self == target {
      return Ok(Step::Unchanged);
    }
    if self.is_terminal() {
      return Err(if target.is_terminal() {
        Refusal::AlreadyTerminal
      } else {
        Refusal::InvalidTransition
      });
    }
    match (self, target) {
      (_, Self::Created) => Err(Refusal::InvalidTransition),
      (Self::Created, _) | (Self::Pending, _) => Ok(Step::Advance),
      _ => Err(Refusal::InvalidTransition),
    }
  }

  /// Map a Midtrans `transaction_status` (plus `fraud_status` for card
  /// captures) onto the local machine. Returns `None` for statuses that carry
  /// no meaning for subscriptions, such as refunds.
  pub fn from_gateway(transaction_status: &str, fraud_status: Option<&str>) -> Option<Self> {
    match transaction_status {
      "capture" => match fraud_status {
        Some("challenge") => Some(Self::Pending),
        Some("deny") => Some(Self::Denied),
        _ => Some(Self::Settled),
      },
      "settlement" => Some(Self::Settled),
      "pending" => Some(Self::Pending),
      "deny" | "failure" => Some(Self::Denied),
      "cancel" => Some(Self::Cancelled),
      "expire" => Some(Self::Expired),
      _ => None,
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
  /// Locally generated; correlates this record with the gateway.
  pub order_id:               String,
  pub user_id:                Uuid,
  pub plan:                   Plan,
  pub gross_amount:           i64,
  pub status:                 TransactionStatus,
  pub gateway_transaction_id: Option<String>,
  pub redirect_url:           Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub snap_token:             Option<String>,
  /// Optimistic concurrency counter, bumped on every status write.
  #[serde(skip)]
  pub version:                i64,
  pub created_at:             DateTime<Utc>,
  pub updated_at:             DateTime<Utc>,
}

/// A new transaction in the `created` state.
#[derive(Debug, Clone)]
pub struct NewTransaction {
  pub order_id:     String,
  pub user_id:      Uuid,
  pub plan:         Plan,
  pub gross_amount: i64,
}

impl NewTransaction {
  /// Generate a fresh order reference for `user_id` buying `plan`.
  pub fn new(user_id: Uuid, plan: Plan) -> Self {
    Self {
      order_id: format!("rostra-{}", Uuid::new_v4().simple()),
      user_id,
      plan,
      gross_amount: plan.price(),
    }
  }
}

/// One entry in a transaction's append-only status log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
  pub event_id:       Uuid,
  pub order_id:       String,
  /// `None` for the creation event.
  pub from_status:    Option<TransactionStatus>,
  pub to_status:      TransactionStatus,
  /// The raw gateway status that caused this change, if any.
  pub gateway_status: Option<String>,
  pub recorded_at:    DateTime<Utc>,
}

/// Parameters for [`IdentityStore::list_transactions`](crate::store::IdentityStore::list_transactions).
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
  pub user_id:        Option<Uuid>,
  pub status:         Option<TransactionStatus>,
  /// Only transactions created strictly before this instant.
  pub created_before: Option<DateTime<Utc>>,
  pub limit:          Option<usize>,
}
