//! Midtrans Snap client — the production [`PaymentGateway`].

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use reqwest::{Client, header};
use rostra_core::{
  gateway::{GatewaySession, PaymentGateway, SessionRequest},
  plan::CURRENCY,
};
use serde::Serialize;
use thiserror::Error;

use crate::GatewayConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("gateway returned {status}: {body}")]
  Status { status: u16, body: String },
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SnapRequest<'a> {
  transaction_details: TransactionDetails<'a>,
  item_details:        [ItemDetails<'a>; 1],
  customer_details:    CustomerDetails<'a>,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
  order_id:     &'a str,
  gross_amount: i64,
}

#[derive(Serialize)]
struct ItemDetails<'a> {
  id:       &'a str,
  name:     &'a str,
  price:    i64,
  quantity: u32,
  currency: &'static str,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
  first_name: &'a str,
  email:      &'a str,
}

impl<'a> SnapRequest<'a> {
  fn new(request: &'a SessionRequest) -> Self {
    let plan_id: &'static str = request.plan.into();
    Self {
      transaction_details: TransactionDetails {
        order_id:     &request.order_id,
        gross_amount: request.gross_amount,
      },
      item_details:        [ItemDetails {
        id:       plan_id,
        name:     request.plan.label(),
        price:    request.gross_amount,
        quantity: 1,
        currency: CURRENCY,
      }],
      customer_details:    CustomerDetails {
        first_name: &request.customer_name,
        email:      &request.customer_email,
      },
    }
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct SnapGateway {
  http:          Client,
  endpoint:      String,
  authorization: String,
}

impl SnapGateway {
  pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self {
      http,
      endpoint: format!(
        "{}/snap/v1/transactions",
        config.base_url.trim_end_matches('/')
      ),
      authorization: format!("Basic {}", B64.encode(format!("{}:", config.server_key))),
    })
  }
}

impl PaymentGateway for SnapGateway {
  type Error = GatewayError;

  async fn create_session(
    &self,
    request: &SessionRequest,
  ) -> Result<GatewaySession, GatewayError> {
    let response = self
      .http
      .post(&self.endpoint)
      .header(header::AUTHORIZATION, &self.authorization)
      .header(header::ACCEPT, "application/json")
      .json(&SnapRequest::new(request))
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status().as_u16();
      let body = response.text().await.unwrap_or_default();
      return Err(GatewayError::Status { status, body });
    }

    Ok(response.json::<GatewaySession>().await?)
  }
}

#[cfg(test)]
mod tests {
  use rostra_core::plan::Plan;

  use super::*;

  #[test]
  fn request_body_shape() {
    let request = SessionRequest {
      order_id:       "rostra-abc".into(),
      gross_amount:   49_000,
      plan:           Plan::Monthly,
      customer_name:  "Alice".into(),
      customer_email: "alice@example.com".into(),
    };
    let body = serde_json::to_value(SnapRequest::new(&request)).unwrap();

    assert_eq!(body["transaction_details"]["order_id"], "rostra-abc");
    assert_eq!(body["transaction_details"]["gross_amount"], 49_000);
    assert_eq!(body["item_details"][0]["id"], "monthly");
    assert_eq!(body["item_details"][0]["price"], 49_000);
    assert_eq!(body["customer_details"]["email"], "alice@example.com");
  }

  #[test]
  fn server_key_becomes_basic_auth() {
    let gateway = SnapGateway::new(&GatewayConfig {
      base_url:     "https://app.sandbox.midtrans.com/".into(),
      server_key:   "SB-Mid-server-xyz".into(),
      timeout_secs: 5,
    })
    .unwrap();

    assert_eq!(gateway.endpoint, "https://app.sandbox.midtrans.com/snap/v1/transactions");
    assert_eq!(
      gateway.authorization,
      format!("Basic {}", B64.encode("SB-Mid-server-xyz:"))
    );
  }
}
