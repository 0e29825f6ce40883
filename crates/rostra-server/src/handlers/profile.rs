//! The caller's own profile and its sub-records.
//!
//! Every mutation is scoped to the authenticated caller; record ownership is
//! enforced by the store inside the same transaction as the write.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rostra_core::{
  gateway::PaymentGateway,
  profile::{
    Education, EducationPatch, Experience, ExperiencePatch, NewEducation, NewExperience,
    NewSkill,
  },
  store::IdentityStore,
  user::{ProfilePatch, User},
};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{Authorized, Members},
  error::Error,
};

/// `PATCH /api/user/profile`
pub async fn update<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Json(patch): Json<ProfilePatch>,
) -> Result<Json<User>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let user = state
    .store
    .update_profile(auth.user().user_id, patch)
    .await
    .map_err(Error::store)?;
  Ok(Json(user))
}

// ─── Education ───────────────────────────────────────────────────────────────

/// `POST /api/user/education`
pub async fn add_education<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Json(body): Json<NewEducation>,
) -> Result<impl IntoResponse, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let record = state
    .store
    .add_education(auth.user().user_id, body)
    .await
    .map_err(Error::store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `PATCH /api/user/education/{id}`
pub async fn update_education<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Path(id): Path<Uuid>,
  Json(patch): Json<EducationPatch>,
) -> Result<Json<Education>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let record = state
    .store
    .update_education(auth.user().user_id, id, patch)
    .await
    .map_err(Error::store)?;
  Ok(Json(record))
}

/// `DELETE /api/user/education/{id}`
pub async fn delete_education<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  state
    .store
    .delete_education(auth.user().user_id, id)
    .await
    .map_err(Error::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Experience ──────────────────────────────────────────────────────────────

/// `POST /api/user/experience`
pub async fn add_experience<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Json(body): Json<NewExperience>,
) -> Result<impl IntoResponse, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let record = state
    .store
    .add_experience(auth.user().user_id, body)
    .await
    .map_err(Error::store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `PATCH /api/user/experience/{id}`
pub async fn update_experience<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Path(id): Path<Uuid>,
  Json(patch): Json<ExperiencePatch>,
) -> Result<Json<Experience>, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let record = state
    .store
    .update_experience(auth.user().user_id, id, patch)
    .await
    .map_err(Error::store)?;
  Ok(Json(record))
}

/// `DELETE /api/user/experience/{id}`
pub async fn delete_experience<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  state
    .store
    .delete_experience(auth.user().user_id, id)
    .await
    .map_err(Error::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Skills ──────────────────────────────────────────────────────────────────

/// `POST /api/user/skill`
pub async fn add_skill<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Json(body): Json<NewSkill>,
) -> Result<impl IntoResponse, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  let record = state
    .store
    .add_skill(auth.user().user_id, body)
    .await
    .map_err(Error::store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `DELETE /api/user/skill/{id}`
pub async fn delete_skill<S, G>(
  State(state): State<AppState<S, G>>,
  auth: Authorized<Members>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, Error>
where
  S: IdentityStore + 'static,
  G: PaymentGateway + 'static,
{
  state
    .store
    .delete_skill(auth.user().user_id, id)
    .await
    .map_err(Error::store)?;
  Ok(StatusCode::NO_CONTENT)
}
