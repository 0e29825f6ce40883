//! Password hashing, session tokens and the role-gated bearer extractor.

use std::marker::PhantomData;

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{
  Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use rand_core::OsRng;
use rostra_core::{access::authorize, user::Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{AppState, error::Error};

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Verified against when the email is unknown, so both failure paths cost one
/// argon2 run.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$\
                          AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Hash `password` with argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, Error> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| Error::Internal(format!("argon2: {e}")))
}

/// Check `password` against `stored`. A missing hash always fails, but only
/// after the same amount of work as a real comparison.
pub fn verify_password(password: &str, stored: Option<&str>) -> bool {
  let Ok(parsed) = PasswordHash::new(stored.unwrap_or(DUMMY_HASH)) else {
    return false;
  };
  let matches = Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .is_ok();
  matches && stored.is_some()
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  pub sub:  Uuid,
  pub role: Role,
  pub iat:  i64,
  pub exp:  i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
  #[error("token expired")]
  Expired,
  #[error("malformed token")]
  Malformed,
  #[error("token signature mismatch")]
  SignatureInvalid,
  #[error("signing failed: {0}")]
  Signing(jsonwebtoken::errors::Error),
}

/// A freshly signed token and the instant it stops being accepted.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

/// HS256 signing material, shared read-only by every request.
pub struct TokenKeys {
  encoding: EncodingKey,
  decoding: DecodingKey,
  ttl:      TimeDelta,
}

impl TokenKeys {
  pub fn new(secret: &[u8], ttl: TimeDelta) -> Self {
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      ttl,
    }
  }

  pub fn issue(&self, user_id: Uuid, role: Role) -> Result<IssuedToken, TokenError> {
    self.issue_at(user_id, role, Utc::now())
  }

  pub fn issue_at(
    &self,
    user_id: Uuid,
    role: Role,
    now: DateTime<Utc>,
  ) -> Result<IssuedToken, TokenError> {
    let expires_at = now + self.ttl;
    let claims = Claims {
      sub: user_id,
      role,
      iat: now.timestamp(),
      exp: expires_at.timestamp(),
    };
    let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
      .map_err(TokenError::Signing)?;
    Ok(IssuedToken { token, expires_at })
  }

  /// Validate `token`. Expiry is decided before the signature, with no
  /// leeway, so a stale token is `Expired` whoever signed it.
  pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
    let mut unverified = Validation::new(Algorithm::HS256);
    unverified.insecure_disable_signature_validation();
    unverified.validate_exp = false;
    let peeked = decode::<Claims>(token, &self.decoding, &unverified)
      .map_err(|_| TokenError::Malformed)?;
    if peeked.claims.exp <= Utc::now().timestamp() {
      return Err(TokenError::Expired);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Claims>(token, &self.decoding, &validation)
      .map(|data| data.claims)
      .map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
      })
  }
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// The caller, as established by a validated token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
  pub user_id: Uuid,
  pub role:    Role,
}

/// A set of roles a route accepts, named at the type level.
pub trait RoleSet: Send + Sync + 'static {
  const ROLES: &'static [Role];
}

/// Any signed-in user.
pub struct Members;

impl RoleSet for Members {
  const ROLES: &'static [Role] = &[Role::Member, Role::Admin];
}

pub struct Admins;

impl RoleSet for Admins {
  const ROLES: &'static [Role] = &[Role::Admin];
}

/// Extracts the caller from `Authorization: Bearer …` and rejects with 401
/// (no or bad token) or 403 (role not in `R`) before the handler runs.
pub struct Authorized<R: RoleSet>(pub AuthUser, PhantomData<R>);

impl<R: RoleSet> Authorized<R> {
  pub fn user(&self) -> AuthUser { self.0 }
}

fn bearer(headers: &HeaderMap) -> Result<&str, Error> {
  headers
    .get(header::AUTHORIZATION)
    .ok_or(Error::Unauthorized("missing bearer token"))?
    .to_str()
    .ok()
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .ok_or(Error::Unauthorized("invalid authorization header"))
}

impl<S, G, R> FromRequestParts<AppState<S, G>> for Authorized<R>
where
  S: Send + Sync + 'static,
  G: Send + Sync + 'static,
  R: RoleSet,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, G>,
  ) -> Result<Self, Self::Rejection> {
    let claims = state.tokens.validate(bearer(&parts.headers)?)?;
    let user = AuthUser { user_id: claims.sub, role: claims.role };

    if !authorize(user.role, R::ROLES).is_allowed() {
      tracing::debug!(user_id = %user.user_id, role = %user.role, "role denied");
      return Err(Error::Forbidden);
    }
    Ok(Authorized(user, PhantomData))
  }
}
