//! The `PaymentGateway` trait — the outbound half of the gateway contract.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::plan::Plan;

/// Everything the gateway needs to open a payment session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
  pub order_id:       String,
  pub gross_amount:   i64,
  pub plan:           Plan,
  pub customer_name:  String,
  pub customer_email: String,
}

/// Handle returned by the gateway for a newly opened session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySession {
  pub token:        String,
  pub redirect_url: String,
}

/// Abstraction over the payment gateway's session API.
///
/// Implementations must bound every call with a timeout and must not retry
/// on their own: a failed session leaves the transaction in `created`.
pub trait PaymentGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn create_session<'a>(
    &'a self,
    request: &'a SessionRequest,
  ) -> impl Future<Output = Result<GatewaySession, Self::Error>> + Send + 'a;
}
