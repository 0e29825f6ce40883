//! Users — identity, credentials, role and subscription entitlement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Authorization role carried in session tokens.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
  Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Admin,
  #[default]
  Member,
}

/// The entitlement level derived from the payment ledger.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
  #[default]
  Free,
  Active,
  Expired,
}

// ─── User ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_id:                 Uuid,
  pub slug:                    String,
  pub email:                   String,
  /// argon2 PHC string. Never serialised.
  #[serde(skip_serializing, default)]
  pub password_hash:           String,
  pub display_name:            String,
  pub headline:                Option<String>,
  pub bio:                     Option<String>,
  pub location:                Option<String>,
  pub role:                    Role,
  pub subscription:            SubscriptionStatus,
  pub subscription_expires_at: Option<DateTime<Utc>>,
  pub created_at:              DateTime<Utc>,
  pub updated_at:              DateTime<Utc>,
}

impl User {
  /// The subscription status as of `now`. An `active` entitlement whose
  /// expiry has passed reads as `expired` even before the sweep persists it.
  pub fn subscription_at(&self, now: DateTime<Utc>) -> SubscriptionStatus {
    match (self.subscription, self.subscription_expires_at) {
      (SubscriptionStatus::Active, Some(until)) if until <= now => {
        SubscriptionStatus::Expired
      }
      (status, _) => status,
    }
  }

  pub fn summary(&self) -> UserSummary {
    UserSummary {
      user_id:      self.user_id,
      slug:         self.slug.clone(),
      display_name: self.display_name.clone(),
      headline:     self.headline.clone(),
      location:     self.location.clone(),
      created_at:   self.created_at,
    }
  }
}

/// The public view of a user returned by search and profile lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
  pub user_id:      Uuid,
  pub slug:         String,
  pub display_name: String,
  pub headline:     Option<String>,
  pub location:     Option<String>,
  pub created_at:   DateTime<Utc>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`IdentityStore::create_user`](crate::store::IdentityStore::create_user).
///
/// The password must already be hashed; the store never sees plaintext.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub email:         String,
  pub password_hash: String,
  pub slug:          String,
  pub display_name:  String,
  pub headline:      Option<String>,
  pub bio:           Option<String>,
  pub location:      Option<String>,
}

/// Partial profile update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
  pub display_name: Option<String>,
  pub headline:     Option<String>,
  pub bio:          Option<String>,
  pub location:     Option<String>,
}

impl ProfilePatch {
  pub fn is_empty(&self) -> bool {
    self.display_name.is_none()
      && self.headline.is_none()
      && self.bio.is_none()
      && self.location.is_none()
  }

  pub fn validate(&self) -> Result<()> {
    if let Some(name) = &self.display_name {
      validate_display_name(name)?;
    }
    check_len("headline", self.headline.as_deref(), 200)?;
    check_len("bio", self.bio.as_deref(), 2000)?;
    check_len("location", self.location.as_deref(), 120)?;
    Ok(())
  }

  /// Apply every supplied field to `user`.
  pub fn apply(self, user: &mut User) {
    if let Some(v) = self.display_name {
      user.display_name = v;
    }
    if let Some(v) = self.headline {
      user.headline = Some(v);
    }
    if let Some(v) = self.bio {
      user.bio = Some(v);
    }
    if let Some(v) = self.location {
      user.location = Some(v);
    }
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Normalise an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

pub fn validate_email(email: &str) -> Result<()> {
  let invalid = || Error::validation("email is not a valid address");
  if email.len() > 254 || email.chars().any(char::is_whitespace) {
    return Err(invalid());
  }
  let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
  if local.is_empty()
    || domain.contains('@')
    || !domain.contains('.')
    || domain.starts_with('.')
    || domain.ends_with('.')
  {
    return Err(invalid());
  }
  Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
  let len = password.chars().count();
  if len < MIN_PASSWORD_LEN {
    return Err(Error::validation(format!(
      "password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }
  if len > MAX_PASSWORD_LEN {
    return Err(Error::validation(format!(
      "password must be at most {MAX_PASSWORD_LEN} characters"
    )));
  }
  Ok(())
}

pub fn validate_display_name(name: &str) -> Result<()> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(Error::validation("display_name must not be empty"));
  }
  check_len("display_name", Some(trimmed), 100)
}

pub(crate) fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<()> {
  match value {
    Some(v) if v.chars().count() > max => Err(Error::validation(format!(
      "{field} must be at most {max} characters"
    ))),
    _ => Ok(()),
  }
}

/// Lower-case, ASCII-alphanumeric, hyphen-separated form of `name`.
///
/// Falls back to `"user"` when nothing survives.
pub fn slugify(name: &str) -> String {
  let mut slug = String::with_capacity(name.len());
  for c in name.chars() {
    if c.is_ascii_alphanumeric() {
      slug.push(c.to_ascii_lowercase());
    } else if !slug.is_empty() && !slug.ends_with('-') {
      slug.push('-');
    }
  }
  let slug = slug.trim_end_matches('-');
  if slug.is_empty() { "user".to_owned() } else { slug.to_owned() }
}
