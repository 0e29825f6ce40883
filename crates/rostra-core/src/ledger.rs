//! Applying status changes to the transaction ledger.
//!
//! Each change is decided against the freshly read transaction and written
//! with a compare-and-swap on its version. A lost race re-reads and decides
//! again, so concurrent notifications for one order serialise without a
//! global lock.

use chrono::Utc;
use serde::Serialize;

use crate::{
  Error,
  store::{Entitlement, GatewayRefs, IdentityStore, StatusChange},
  transaction::{Refusal, Step, Transaction, TransactionStatus},
};

/// Attempts before giving up with [`Error::Contention`].
const MAX_CAS_ATTEMPTS: usize = 8;

/// Extra data recorded with a status change.
#[derive(Debug, Clone, Default)]
pub struct GatewayUpdate {
  /// The raw gateway status, kept in the event log.
  pub gateway_status:         Option<String>,
  pub gateway_transaction_id: Option<String>,
}

/// Result of a successful [`apply_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
  Applied {
    from: TransactionStatus,
    to:   TransactionStatus,
  },
  /// The transaction was already in the requested state.
  Unchanged { status: TransactionStatus },
}

/// Move `order_id` to `target`.
///
/// - Unknown order: [`Error::UnknownOrder`].
/// - Already in `target`: `Ok(Outcome::Unchanged)`. Only a gateway
///   transaction id the order lacks is recorded.
/// - Terminal in a different terminal state: [`Error::AlreadyTerminal`].
/// - Any other disallowed move: [`Error::InvalidTransition`].
///
/// Settling grants the owner an entitlement for the plan's duration in the
/// same store transaction as the status write.
pub async fn apply_status<S: IdentityStore>(
  store: &S,
  order_id: &str,
  target: TransactionStatus,
  update: GatewayUpdate,
) -> Result<Outcome, S::Error> {
  for _ in 0..MAX_CAS_ATTEMPTS {
    let tx = store
      .get_transaction(order_id)
      .await?
      .ok_or_else(|| Error::UnknownOrder(order_id.to_owned()))?;

    match tx.status.decide(target) {
      Ok(Step::Unchanged) => {
        let refs = GatewayRefs {
          gateway_transaction_id: update
            .gateway_transaction_id
            .filter(|_| tx.gateway_transaction_id.is_none()),
          session:                None,
        };
        if !refs.is_empty() {
          store.record_gateway_refs(order_id, refs).await?;
        }
        return Ok(Outcome::Unchanged { status: tx.status });
      }
      Ok(Step::Advance) => {
        let change = status_change(&tx, target, update.clone());
        if store.transition(change).await? {
          return Ok(Outcome::Applied { from: tx.status, to: target });
        }
      }
      Err(Refusal::AlreadyTerminal) => {
        return Err(
          Error::AlreadyTerminal {
            order_id:  order_id.to_owned(),
            current:   tx.status,
            requested: target,
          }
          .into(),
        );
      }
      Err(Refusal::InvalidTransition) => {
        return Err(
          Error::InvalidTransition {
            order_id: order_id.to_owned(),
            from:     tx.status,
            to:       target,
          }
          .into(),
        );
      }
    }
  }

  Err(Error::Contention(order_id.to_owned()).into())
}

fn status_change(
  tx: &Transaction,
  target: TransactionStatus,
  update: GatewayUpdate,
) -> StatusChange {
  let entitlement = (target == TransactionStatus::Settled).then(|| Entitlement {
    user_id:  tx.user_id,
    duration: tx.plan.duration(),
  });

  StatusChange {
    order_id: tx.order_id.clone(),
    expected_version: tx.version,
    from: tx.status,
    to: target,
    gateway_status: update.gateway_status,
    gateway_transaction_id: update.gateway_transaction_id,
    entitlement,
    at: Utc::now(),
  }
}
