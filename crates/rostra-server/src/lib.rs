//! HTTP layer for Rostra.
//!
//! Exposes an axum [`Router`] over any [`IdentityStore`] and
//! [`PaymentGateway`]: public registration and profile reads, bearer-token
//! protected profile editing and subscription purchase, admin ledger views and
//! the Midtrans notification endpoint.

pub mod auth;
pub mod billing;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod sweep;
pub mod webhook;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{delete, get, patch, post},
};
use rostra_core::{gateway::PaymentGateway, store::IdentityStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::TokenKeys;
use handlers::{admin, billing as billing_routes, profile, users};

/// Shortest accepted token signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `ROSTRA__*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  pub auth:       AuthSettings,
  pub gateway:    GatewayConfig,
  #[serde(default)]
  pub sweep:      SweepConfig,
}

#[derive(Deserialize, Clone)]
pub struct AuthSettings {
  /// HS256 key; at least [`MIN_SECRET_LEN`] bytes.
  pub jwt_secret:     String,
  #[serde(default = "default_token_ttl")]
  pub token_ttl_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct GatewayConfig {
  #[serde(default = "default_gateway_url")]
  pub base_url:     String,
  /// Midtrans server key. Authenticates outbound calls and signs inbound
  /// notifications.
  pub server_key:   String,
  #[serde(default = "default_gateway_timeout")]
  pub timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SweepConfig {
  pub interval_secs:    u64,
  pub stale_after_secs: u64,
}

impl Default for SweepConfig {
  fn default() -> Self { Self { interval_secs: 300, stale_after_secs: 3600 } }
}

fn default_host() -> String { "0.0.0.0".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("rostra.db") }
fn default_token_ttl() -> u64 { 86_400 }
fn default_gateway_url() -> String { "https://app.sandbox.midtrans.com".to_owned() }
fn default_gateway_timeout() -> u64 { 15 }

impl ServerConfig {
  /// Reject settings that would start an insecure or useless server.
  pub fn validate(&self) -> Result<(), String> {
    if self.auth.jwt_secret.len() < MIN_SECRET_LEN {
      return Err(format!("auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes"));
    }
    if self.gateway.server_key.trim().is_empty() {
      return Err("gateway.server_key must be set".to_owned());
    }
    if self.auth.token_ttl_secs == 0 {
      return Err("auth.token_ttl_secs must be positive".to_owned());
    }
    Ok(())
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, G> {
  pub store:   Arc<S>,
  pub gateway: Arc<G>,
  pub tokens:  Arc<TokenKeys>,
  pub config:  Arc<ServerConfig>,
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      gateway: self.gateway.clone(),
      tokens:  self.tokens.clone(),
      config:  self.config.clone(),
    }
  }
}

impl<S, G> AppState<S, G> {
  pub fn new(store: Arc<S>, gateway: Arc<G>, config: ServerConfig) -> Self {
    let ttl = chrono::TimeDelta::seconds(config.auth.token_ttl_secs as i64);
    Self {
      store,
      gateway,
      tokens: Arc::new(TokenKeys::new(config.auth.jwt_secret.as_bytes(), ttl)),
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full Rostra [`Router`].
pub fn router<S, G>(state: AppState<S, G>) -> Router
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  Router::new()
    // Public
    .route("/api/ping",                      get(users::ping))
    .route("/api/user",                      post(users::register::<S, G>))
    .route("/api/user/login",                post(users::login::<S, G>))
    .route("/api/user/search",               get(users::search::<S, G>))
    .route("/api/skills",                    get(users::skills::<S, G>))
    // Members
    .route("/api/user/profile",              patch(profile::update::<S, G>))
    .route("/api/user/education",            post(profile::add_education::<S, G>))
    .route(
      "/api/user/education/{id}",
      patch(profile::update_education::<S, G>).delete(profile::delete_education::<S, G>),
    )
    .route("/api/user/experience",           post(profile::add_experience::<S, G>))
    .route(
      "/api/user/experience/{id}",
      patch(profile::update_experience::<S, G>).delete(profile::delete_experience::<S, G>),
    )
    .route("/api/user/skill",                post(profile::add_skill::<S, G>))
    .route("/api/user/skill/{id}",           delete(profile::delete_skill::<S, G>))
    .route("/api/user/subscribe",            post(billing_routes::subscribe::<S, G>))
    .route("/api/user/subscription",         get(billing_routes::subscription::<S, G>))
    // Public profile; static segments above take precedence.
    .route("/api/user/{slug}",               get(users::profile::<S, G>))
    // Admins
    .route("/api/admin/transactions",        get(admin::list::<S, G>))
    .route("/api/admin/transactions/{order_id}", get(admin::get_one::<S, G>))
    // Gateway
    .route("/webhook/midtrans",              post(webhook::handler::<S, G>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
