//! Midtrans HTTP notifications.
//!
//! Handling is three steps: verify the signature and that the signed status
//! code agrees with the reported status (pure), map the gateway
//! status onto the local state machine, then apply it through the ledger's
//! guarded write. Anything the ledger refuses is still acknowledged, so the
//! gateway stops redelivering notifications that can never apply.

use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use bytes::Bytes;
use rostra_core::{
  Error as CoreError,
  gateway::PaymentGateway,
  ledger::{GatewayUpdate, Outcome, apply_status},
  store::{IdentityStore, StoreError as _},
  transaction::TransactionStatus,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq as _;
use tracing::{info, warn};

use crate::{AppState, error::Error};

/// Header carrying the signature when the gateway sends it out of band.
pub const SIGNATURE_HEADER: &str = "x-signature-key";

// ─── Payload ─────────────────────────────────────────────────────────────────

/// The fields of a Midtrans notification this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
  pub order_id:           String,
  pub status_code:        String,
  /// Decimal string, e.g. `"49000.00"`.
  pub gross_amount:       String,
  pub transaction_status: String,
  #[serde(default)]
  pub transaction_id:     Option<String>,
  #[serde(default)]
  pub fraud_status:       Option<String>,
  #[serde(default)]
  pub signature_key:      Option<String>,
}

/// What the reconciler did with a verified notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Ack {
  Applied { from: TransactionStatus, to: TransactionStatus },
  Unchanged { status: TransactionStatus },
  /// The state machine refused the move.
  Refused { current: TransactionStatus },
  /// Status with no subscription meaning, e.g. `refund`.
  Ignored,
  UnknownOrder,
  AmountMismatch,
}

impl From<Outcome> for Ack {
  fn from(outcome: Outcome) -> Self {
    match outcome {
      Outcome::Applied { from, to } => Self::Applied { from, to },
      Outcome::Unchanged { status } => Self::Unchanged { status },
    }
  }
}

// ─── Verification ────────────────────────────────────────────────────────────

/// `hex(SHA-512(order_id ‖ status_code ‖ gross_amount ‖ server_key))`.
pub fn expected_signature(
  order_id: &str,
  status_code: &str,
  gross_amount: &str,
  server_key: &str,
) -> String {
  let mut hasher = Sha512::new();
  hasher.update(order_id.as_bytes());
  hasher.update(status_code.as_bytes());
  hasher.update(gross_amount.as_bytes());
  hasher.update(server_key.as_bytes());
  hex::encode(hasher.finalize())
}

/// Constant-time check of `provided` against the notification's expected
/// signature.
pub fn verify_signature(notification: &Notification, provided: &str, server_key: &str) -> bool {
  let expected = expected_signature(
    &notification.order_id,
    &notification.status_code,
    &notification.gross_amount,
    server_key,
  );
  let provided = provided.trim().to_ascii_lowercase();
  expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Whether the signed `status_code` agrees with the unsigned status fields.
///
/// The signature does not cover `transaction_status` or `fraud_status`, so
/// they are only trusted under the status code the gateway reports for them:
/// 200 for settled, 201 for pending, 202 for denied and cancelled, 202 or 407
/// for expired. Statuses with no local meaning never reach the ledger and are
/// not checked.
pub fn status_code_matches(notification: &Notification) -> bool {
  let Some(target) = TransactionStatus::from_gateway(
    &notification.transaction_status,
    notification.fraud_status.as_deref(),
  ) else {
    return true;
  };
  let allowed: &[&str] = match target {
    TransactionStatus::Settled => &["200"],
    TransactionStatus::Pending => &["201"],
    TransactionStatus::Denied | TransactionStatus::Cancelled => &["202"],
    TransactionStatus::Expired => &["202", "407"],
    TransactionStatus::Created => &[],
  };
  allowed.contains(&notification.status_code.trim())
}

/// Parse a gateway amount such as `"49000.00"` into whole units. Fractions
/// other than zero are rejected, since every plan is priced in whole rupiah.
pub fn parse_amount(raw: &str) -> Option<i64> {
  let (whole, fraction) = raw.trim().split_once('.').unwrap_or((raw.trim(), ""));
  if !fraction.chars().all(|c| c == '0') {
    return None;
  }
  whole.parse().ok()
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

/// Apply a verified notification to the ledger.
///
/// Only store faults are errors; every decision the ledger makes is an
/// [`Ack`].
pub async fn reconcile<S: IdentityStore>(
  store: &S,
  notification: &Notification,
) -> Result<Ack, Error> {
  let order_id = notification.order_id.as_str();

  let Some(target) = TransactionStatus::from_gateway(
    &notification.transaction_status,
    notification.fraud_status.as_deref(),
  ) else {
    info!(
      order_id,
      gateway_status = %notification.transaction_status,
      "ignoring notification status"
    );
    return Ok(Ack::Ignored);
  };

  let Some(tx) = store.get_transaction(order_id).await.map_err(Error::store)? else {
    warn!(order_id, "notification for unknown order");
    return Ok(Ack::UnknownOrder);
  };

  if parse_amount(&notification.gross_amount) != Some(tx.gross_amount) {
    warn!(
      order_id,
      expected = tx.gross_amount,
      received = %notification.gross_amount,
      "notification amount does not match ledger"
    );
    return Ok(Ack::AmountMismatch);
  }

  let update = GatewayUpdate {
    gateway_status:         Some(notification.transaction_status.clone()),
    gateway_transaction_id: notification.transaction_id.clone(),
  };

  match apply_status(store, order_id, target, update).await {
    Ok(outcome) => {
      info!(order_id, ?outcome, "notification reconciled");
      Ok(outcome.into())
    }
    Err(e) => match e.domain() {
      Some(
        CoreError::AlreadyTerminal { current, .. }
        | CoreError::InvalidTransition { from: current, .. },
      ) => {
        warn!(order_id, %current, requested = %target, "notification refused by state machine");
        Ok(Ack::Refused { current: *current })
      }
      Some(CoreError::UnknownOrder(_)) => Ok(Ack::UnknownOrder),
      _ => Err(Error::store(e)),
    },
  }
}

// ─── Handler ─────────────────────────────────────────────────────────────────

/// `POST /webhook/midtrans`
pub async fn handler<S, G>(
  State(state): State<AppState<S, G>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<impl IntoResponse, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let notification: Notification = serde_json::from_slice(&body).map_err(|e| {
    warn!(error = %e, "malformed notification");
    Error::BadRequest("malformed notification".into())
  })?;

  let provided = headers
    .get(SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .or(notification.signature_key.as_deref());

  let verified = provided.is_some_and(|sig| {
    verify_signature(&notification, sig, &state.config.gateway.server_key)
  });
  if !verified {
    warn!(order_id = %notification.order_id, "notification signature rejected");
    return Err(Error::SignatureInvalid);
  }
  if !status_code_matches(&notification) {
    warn!(
      order_id = %notification.order_id,
      status_code = %notification.status_code,
      gateway_status = %notification.transaction_status,
      "notification status does not match its signed status code"
    );
    return Err(Error::SignatureInvalid);
  }

  let ack = reconcile(state.store.as_ref(), &notification).await?;
  Ok((StatusCode::OK, Json(ack)))
}

#[cfg(test)]
mod tests {
  use super::*;

  const KEY: &str = "SB-Mid-server-test";

  fn notification(signature: Option<String>) -> Notification {
    Notification {
      order_id:           "rostra-1".into(),
      status_code:        "200".into(),
      gross_amount:       "49000.00".into(),
      transaction_status: "settlement".into(),
      transaction_id:     Some("gw-1".into()),
      fraud_status:       None,
      signature_key:      signature,
    }
  }

  #[test]
  fn signature_is_sha512_hex() {
    let sig = expected_signature("rostra-1", "200", "49000.00", KEY);
    assert_eq!(sig.len(), 128);
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn valid_signature_verifies() {
    let n = notification(None);
    let sig = expected_signature(&n.order_id, &n.status_code, &n.gross_amount, KEY);
    assert!(verify_signature(&n, &sig, KEY));
    assert!(verify_signature(&n, &sig.to_ascii_uppercase(), KEY));
  }

  #[test]
  fn tampered_fields_fail() {
    let n = notification(None);
    let sig = expected_signature(&n.order_id, &n.status_code, &n.gross_amount, KEY);

    let mut amount = n.clone();
    amount.gross_amount = "1.00".into();
    assert!(!verify_signature(&amount, &sig, KEY));

    let mut order = n.clone();
    order.order_id = "rostra-2".into();
    assert!(!verify_signature(&order, &sig, KEY));

    assert!(!verify_signature(&n, &sig, "another-key"));
    assert!(!verify_signature(&n, &sig[..64], KEY));
    assert!(!verify_signature(&n, "", KEY));
  }

  fn with_status(code: &str, status: &str, fraud: Option<&str>) -> Notification {
    Notification {
      status_code: code.into(),
      transaction_status: status.into(),
      fraud_status: fraud.map(Into::into),
      ..notification(None)
    }
  }

  #[test]
  fn status_codes_bind_the_status() {
    assert!(status_code_matches(&with_status("200", "settlement", None)));
    assert!(status_code_matches(&with_status("200", "capture", Some("accept"))));
    assert!(status_code_matches(&with_status("201", "capture", Some("challenge"))));
    assert!(status_code_matches(&with_status("201", "pending", None)));
    assert!(status_code_matches(&with_status("202", "deny", None)));
    assert!(status_code_matches(&with_status("202", "cancel", None)));
    assert!(status_code_matches(&with_status("407", "expire", None)));

    // A signed pending notification rewritten to a settlement.
    assert!(!status_code_matches(&with_status("201", "settlement", None)));
    assert!(!status_code_matches(&with_status("201", "capture", Some("accept"))));
    assert!(!status_code_matches(&with_status("202", "settlement", None)));
    assert!(!status_code_matches(&with_status("200", "deny", None)));
    assert!(!status_code_matches(&with_status("200", "pending", None)));

    // Unmapped statuses never reach the ledger.
    assert!(status_code_matches(&with_status("200", "refund", None)));
  }

  #[test]
  fn amounts() {
    assert_eq!(parse_amount("49000.00"), Some(49_000));
    assert_eq!(parse_amount("49000"), Some(49_000));
    assert_eq!(parse_amount("49000.50"), None);
    assert_eq!(parse_amount("abc"), None);
  }

  #[test]
  fn payload_parses_with_optional_fields_missing() {
    let body = br#"{
      "order_id": "rostra-1",
      "status_code": "201",
      "gross_amount": "49000.00",
      "transaction_status": "pending"
    }"#;
    let n: Notification = serde_json::from_slice(body).unwrap();
    assert_eq!(n.transaction_status, "pending");
    assert!(n.signature_key.is_none());
    assert!(n.fraud_status.is_none());
  }

  #[test]
  fn ack_serialises_with_outcome_tag() {
    let ack = Ack::Applied { from: TransactionStatus::Pending, to: TransactionStatus::Settled };
    let json = serde_json::to_value(&ack).unwrap();
    assert_eq!(json["outcome"], "applied");
    assert_eq!(json["to"], "settled");
  }
}
