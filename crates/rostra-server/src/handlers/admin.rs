//! Admin-only views of the transaction ledger.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use rostra_core::{
  gateway::PaymentGateway,
  store::IdentityStore,
  transaction::{Transaction, TransactionEvent, TransactionQuery, TransactionStatus},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{Admins, Authorized},
  error::Error,
};

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub status:  Option<TransactionStatus>,
  pub user_id: Option<Uuid>,
  pub limit:   Option<usize>,
}

/// `GET /api/admin/transactions[?status=…][&user_id=…][&limit=…]`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  _auth: Authorized<Admins>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Transaction>>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let query = TransactionQuery {
    user_id:        params.user_id,
    status:         params.status,
    created_before: None,
    limit:          params.limit,
  };
  let transactions = state
    .store
    .list_transactions(&query)
    .await
    .map_err(Error::store)?;
  Ok(Json(transactions))
}

#[derive(Debug, Serialize)]
pub struct TransactionDetail {
  #[serde(flatten)]
  pub transaction: Transaction,
  pub history:     Vec<TransactionEvent>,
}

/// `GET /api/admin/transactions/{order_id}`
pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  _auth: Authorized<Admins>,
  Path(order_id): Path<String>,
) -> Result<Json<TransactionDetail>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let transaction = state
    .store
    .get_transaction(&order_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound)?;
  let history = state
    .store
    .transaction_history(&order_id)
    .await
    .map_err(Error::store)?;
  Ok(Json(TransactionDetail { transaction, history }))
}
