//! Starting a subscription purchase.
//!
//! The order is persisted as `created` before the gateway is contacted, so a
//! gateway outage never loses track of an order reference that may already
//! be known to the gateway.

use std::time::Duration;

use rostra_core::{
  Error as CoreError,
  gateway::{PaymentGateway, SessionRequest},
  ledger::{GatewayUpdate, apply_status},
  plan::Plan,
  store::{GatewayRefs, IdentityStore, StoreError as _},
  transaction::{NewTransaction, Transaction, TransactionStatus},
  user::User,
};
use tracing::{info, warn};

use crate::error::Error;

/// Open a payment session for `user` buying `plan`.
///
/// Returns the transaction in `pending` with its redirect URL. If the gateway
/// fails or does not answer within `timeout`, the transaction stays `created`
/// and [`Error::GatewayUnavailable`] is returned.
pub async fn initiate<S, G>(
  store:   &S,
  gateway: &G,
  user:    &User,
  plan:    Plan,
  timeout: Duration,
) -> Result<Transaction, Error>
where
  S: IdentityStore,
  G: PaymentGateway,
{
  let tx = store
    .insert_transaction(NewTransaction::new(user.user_id, plan))
    .await
    .map_err(Error::store)?;
  info!(order_id = %tx.order_id, user_id = %user.user_id, %plan, "transaction created");

  let request = SessionRequest {
    order_id:       tx.order_id.clone(),
    gross_amount:   tx.gross_amount,
    plan,
    customer_name:  user.display_name.clone(),
    customer_email: user.email.clone(),
  };

  let session = match tokio::time::timeout(timeout, gateway.create_session(&request)).await {
    Ok(Ok(session)) => session,
    Ok(Err(e)) => {
      warn!(order_id = %tx.order_id, error = %e, "gateway rejected session request");
      return Err(Error::GatewayUnavailable(e.to_string()));
    }
    Err(_) => {
      warn!(order_id = %tx.order_id, timeout_secs = timeout.as_secs(), "gateway timed out");
      return Err(Error::GatewayUnavailable("timed out".into()));
    }
  };

  // Independent of the status step: a notification may already have moved
  // the order past `created`.
  let refs = GatewayRefs { session: Some(session), ..Default::default() };
  store
    .record_gateway_refs(&tx.order_id, refs)
    .await
    .map_err(Error::store)?;

  match apply_status(store, &tx.order_id, TransactionStatus::Pending, GatewayUpdate::default())
    .await
  {
    Ok(_) => {}
    // A notification overtook the session response; its state wins.
    Err(e)
      if matches!(
        e.domain(),
        Some(CoreError::AlreadyTerminal { .. } | CoreError::InvalidTransition { .. })
      ) =>
    {
      info!(order_id = %tx.order_id, "transaction advanced before session was recorded");
    }
    Err(e) => return Err(Error::store(e)),
  }

  store
    .get_transaction(&tx.order_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound)
}
