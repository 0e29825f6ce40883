//! Public user routes: registration, login, search and profile lookup.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use rostra_core::{
  gateway::PaymentGateway,
  profile::ProfileView,
  store::IdentityStore,
  user::{
    NewUser, ProfilePatch, User, UserSummary, normalize_email, slugify, validate_display_name,
    validate_email, validate_password,
  },
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::{
  AppState,
  auth::{IssuedToken, hash_password, verify_password},
  error::Error,
};

/// `GET /api/ping`
pub async fn ping() -> Json<Value> { Json(json!({ "message": "pong" })) }

// ─── Registration ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
  pub email:        String,
  pub password:     String,
  pub display_name: String,
  pub headline:     Option<String>,
  pub bio:          Option<String>,
  pub location:     Option<String>,
}

/// `POST /api/user`
pub async fn register<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  validate_email(&body.email)?;
  validate_password(&body.password)?;
  validate_display_name(&body.display_name)?;
  // Same limits as a later profile edit.
  ProfilePatch {
    display_name: None,
    headline:     body.headline.clone(),
    bio:          body.bio.clone(),
    location:     body.location.clone(),
  }
  .validate()?;

  let password = body.password;
  let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
    .await
    .map_err(|e| Error::Internal(e.to_string()))??;

  let display_name = body.display_name.trim().to_owned();
  let input = NewUser {
    email: normalize_email(&body.email),
    password_hash,
    slug: unique_slug(&display_name),
    display_name,
    headline: body.headline,
    bio: body.bio,
    location: body.location,
  };

  let user = state.store.create_user(input).await.map_err(Error::store)?;
  info!(user_id = %user.user_id, slug = %user.slug, "user registered");
  Ok((StatusCode::CREATED, Json(user)))
}

/// Display-name slug plus a short random suffix, e.g. `alice-liddell-3f9a1c`.
fn unique_slug(display_name: &str) -> String {
  let suffix = Uuid::new_v4().simple().to_string();
  format!("{}-{}", slugify(display_name), &suffix[..6])
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
  pub email:    String,
  pub password: String,
}

/// `POST /api/user/login`
pub async fn login<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<LoginRequest>,
) -> Result<Json<IssuedToken>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let user: Option<User> = state
    .store
    .get_user_by_email(&normalize_email(&body.email))
    .await
    .map_err(Error::store)?;

  let hash = user.as_ref().map(|u| u.password_hash.clone());
  let password = body.password;
  let verified = tokio::task::spawn_blocking(move || verify_password(&password, hash.as_deref()))
    .await
    .map_err(|e| Error::Internal(e.to_string()))?;

  let user = match user {
    Some(user) if verified => user,
    _ => return Err(Error::InvalidCredentials),
  };

  let issued = state.tokens.issue(user.user_id, user.role)?;
  info!(user_id = %user.user_id, "login");
  Ok(Json(issued))
}

// ─── Public reads ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  #[serde(default)]
  pub keyword: String,
}

/// `GET /api/user/search?keyword=…`
pub async fn search<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<UserSummary>>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let hits = state
    .store
    .search_users(&params.keyword)
    .await
    .map_err(Error::store)?;
  Ok(Json(hits.collect()))
}

/// `GET /api/user/{slug}`
pub async fn profile<S, G>(
  State(state): State<AppState<S, G>>,
  Path(slug): Path<String>,
) -> Result<Json<ProfileView>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let user = state
    .store
    .get_user_by_slug(&slug)
    .await
    .map_err(Error::store)?
    .ok_or(Error::NotFound)?;
  let records = state
    .store
    .profile_records(user.user_id)
    .await
    .map_err(Error::store)?;

  Ok(Json(ProfileView { user: user.summary(), bio: user.bio, records }))
}

/// `GET /api/skills`
pub async fn skills<S, G>(State(state): State<AppState<S, G>>) -> Result<Json<Vec<String>>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let names = state.store.list_skill_names().await.map_err(Error::store)?;
  Ok(Json(names))
}
