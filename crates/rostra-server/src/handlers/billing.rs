//! Subscription purchase and the caller's own subscription view.

use std::time::Duration;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use rostra_core::{
  gateway::PaymentGateway,
  plan::Plan,
  store::IdentityStore,
  transaction::{Transaction, TransactionQuery},
  user::SubscriptionStatus,
};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  auth::{Authorized, Members},
  billing,
  error::Error,
};

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
  pub plan: Plan,
}

/// `POST /api/user/subscribe`
pub async fn subscribe<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Json(body): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let user = state
    .store
    .get_user(auth.user().user_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound)?;

  let timeout = Duration::from_secs(state.config.gateway.timeout_secs);
  let tx = billing::initiate(
    state.store.as_ref(),
    state.gateway.as_ref(),
    &user,
    body.plan,
    timeout,
  )
  .await?;
  Ok((StatusCode::CREATED, Json(tx)))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionView {
  pub status:       SubscriptionStatus,
  pub expires_at:   Option<DateTime<Utc>>,
  pub transactions: Vec<Transaction>,
}

/// `GET /api/user/subscription`
pub async fn subscription<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
) -> Result<Json<SubscriptionView>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let user_id = auth.user().user_id;
  let user = state
    .store
    .get_user(user_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound)?;

  let query = TransactionQuery { user_id: Some(user_id), ..Default::default() };
  let transactions = state
    .store
    .list_transactions(&query)
    .await
    .map_err(Error::store)?;

  Ok(Json(SubscriptionView {
    status: user.subscription_at(Utc::now()),
    expires_at: user.subscription_expires_at,
    transactions,
  }))
}
