//! HTTP-facing error type and its [`IntoResponse`] implementation.
//!
//! Every error renders as `{"error": "..."}`. Store failures are logged here,
//! once, and never leak their detail to the client.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use rostra_core::{Error as CoreError, store::StoreError};
use serde_json::json;
use thiserror::Error;

use crate::auth::TokenError;

#[derive(Debug, Error)]
pub enum Error {
  /// Missing, malformed or expired bearer token.
  #[error("unauthorized: {0}")]
  Unauthorized(&'static str),

  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("insufficient role")]
  Forbidden,

  #[error("not found")]
  NotFound,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("invalid notification signature")]
  SignatureInvalid,

  #[error("payment gateway unavailable: {0}")]
  GatewayUnavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl Error {
  /// Map a store failure. Domain errors become client errors; anything else
  /// is an opaque 500.
  pub fn store<E: StoreError>(err: E) -> Self {
    err
      .domain()
      .map(Self::from_domain)
      .unwrap_or_else(|| Self::Store(Box::new(err)))
  }

  fn from_domain(err: &CoreError) -> Self {
    match err {
      // Someone else's record answers exactly like a missing one.
      CoreError::UserNotFound(_)
      | CoreError::RecordNotFound(_)
      | CoreError::Forbidden(_)
      | CoreError::UnknownOrder(_) => Self::NotFound,
      CoreError::DuplicateEmail => Self::Conflict(err.to_string()),
      CoreError::Validation(msg) => Self::BadRequest(msg.clone()),
      CoreError::AlreadyTerminal { .. } | CoreError::InvalidTransition { .. } => {
        Self::Conflict(err.to_string())
      }
      CoreError::Contention(_) => Self::Internal(err.to_string()),
    }
  }
}

impl From<CoreError> for Error {
  fn from(err: CoreError) -> Self { Self::from_domain(&err) }
}

impl From<TokenError> for Error {
  fn from(err: TokenError) -> Self {
    match err {
      TokenError::Expired => Self::Unauthorized("token expired"),
      TokenError::Malformed | TokenError::SignatureInvalid => {
        Self::Unauthorized("invalid token")
      }
      TokenError::Signing(e) => Self::Internal(e.to_string()),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::Unauthorized(_) | Error::InvalidCredentials | Error::SignatureInvalid => {
        StatusCode::UNAUTHORIZED
      }
      Error::Forbidden => StatusCode::FORBIDDEN,
      Error::NotFound => StatusCode::NOT_FOUND,
      Error::BadRequest(_) => StatusCode::BAD_REQUEST,
      Error::Conflict(_) => StatusCode::CONFLICT,
      Error::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      Error::Store(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &self {
      Error::Store(e) => {
        tracing::error!(error = %e, "store failure");
        "internal server error".to_owned()
      }
      Error::Internal(e) => {
        tracing::error!(error = %e, "internal failure");
        "internal server error".to_owned()
      }
      Error::GatewayUnavailable(_) => "payment gateway unavailable, try again".to_owned(),
      other => other.to_string(),
    };

    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if matches!(self, Error::Unauthorized(_)) {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    res
  }
}
