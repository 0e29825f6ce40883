//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order matches chronological order. Dates are ISO 8601.
//! UUIDs are hyphenated lowercase strings. Enums use their lowercase names.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rostra_core::{
  profile::{Education, Experience, Skill},
  transaction::{Transaction, TransactionEvent},
  user::User,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

/// Decode a lowercase enum column via its `strum` string form.
pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::UnknownValue { kind, value: s.to_owned() })
}

/// Escape `%`, `_` and `\` for a `LIKE … ESCAPE '\'` pattern.
pub fn like_pattern(keyword: &str) -> String {
  let mut out = String::with_capacity(keyword.len() + 2);
  out.push('%');
  for c in keyword.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str = "user_id, slug, email, password_hash, display_name, headline, \
   bio, location, role, subscription, subscription_expires_at, created_at, updated_at";

pub const EDUCATION_COLUMNS: &str = "education_id, user_id, institution, degree, \
   field_of_study, start_date, end_date, description";

pub const EXPERIENCE_COLUMNS: &str = "experience_id, user_id, company, title, location, \
   start_date, end_date, description";

pub const SKILL_COLUMNS: &str = "skill_id, user_id, name, proficiency";

pub const TRANSACTION_COLUMNS: &str = "order_id, user_id, plan, gross_amount, status, \
   gateway_transaction_id, redirect_url, snap_token, version, created_at, updated_at";

pub const EVENT_COLUMNS: &str =
  "event_id, order_id, from_status, to_status, gateway_status, recorded_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub user_id:                 String,
  pub slug:                    String,
  pub email:                   String,
  pub password_hash:           String,
  pub display_name:            String,
  pub headline:                Option<String>,
  pub bio:                     Option<String>,
  pub location:                Option<String>,
  pub role:                    String,
  pub subscription:            String,
  pub subscription_expires_at: Option<String>,
  pub created_at:              String,
  pub updated_at:              String,
}

impl RawUser {
  /// Row mapper for [`USER_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:                 row.get(0)?,
      slug:                    row.get(1)?,
      email:                   row.get(2)?,
      password_hash:           row.get(3)?,
      display_name:            row.get(4)?,
      headline:                row.get(5)?,
      bio:                     row.get(6)?,
      location:                row.get(7)?,
      role:                    row.get(8)?,
      subscription:            row.get(9)?,
      subscription_expires_at: row.get(10)?,
      created_at:              row.get(11)?,
      updated_at:              row.get(12)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:                 decode_uuid(&self.user_id)?,
      slug:                    self.slug,
      email:                   self.email,
      password_hash:           self.password_hash,
      display_name:            self.display_name,
      headline:                self.headline,
      bio:                     self.bio,
      location:                self.location,
      role:                    decode_enum("role", &self.role)?,
      subscription:            decode_enum("subscription", &self.subscription)?,
      subscription_expires_at: self
        .subscription_expires_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      created_at:              decode_dt(&self.created_at)?,
      updated_at:              decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawEducation {
  pub education_id:   String,
  pub user_id:        String,
  pub institution:    String,
  pub degree:         String,
  pub field_of_study: Option<String>,
  pub start_date:     String,
  pub end_date:       Option<String>,
  pub description:    Option<String>,
}

impl RawEducation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      education_id:   row.get(0)?,
      user_id:        row.get(1)?,
      institution:    row.get(2)?,
      degree:         row.get(3)?,
      field_of_study: row.get(4)?,
      start_date:     row.get(5)?,
      end_date:       row.get(6)?,
      description:    row.get(7)?,
    })
  }

  pub fn into_education(self) -> Result<Education> {
    Ok(Education {
      education_id:   decode_uuid(&self.education_id)?,
      user_id:        decode_uuid(&self.user_id)?,
      institution:    self.institution,
      degree:         self.degree,
      field_of_study: self.field_of_study,
      start_date:     decode_date(&self.start_date)?,
      end_date:       self.end_date.as_deref().map(decode_date).transpose()?,
      description:    self.description,
    })
  }
}

pub struct RawExperience {
  pub experience_id: String,
  pub user_id:       String,
  pub company:       String,
  pub title:         String,
  pub location:      Option<String>,
  pub start_date:    String,
  pub end_date:      Option<String>,
  pub description:   Option<String>,
}

impl RawExperience {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      experience_id: row.get(0)?,
      user_id:       row.get(1)?,
      company:       row.get(2)?,
      title:         row.get(3)?,
      location:      row.get(4)?,
      start_date:    row.get(5)?,
      end_date:      row.get(6)?,
      description:   row.get(7)?,
    })
  }

  pub fn into_experience(self) -> Result<Experience> {
    Ok(Experience {
      experience_id: decode_uuid(&self.experience_id)?,
      user_id:       decode_uuid(&self.user_id)?,
      company:       self.company,
      title:         self.title,
      location:      self.location,
      start_date:    decode_date(&self.start_date)?,
      end_date:      self.end_date.as_deref().map(decode_date).transpose()?,
      description:   self.description,
    })
  }
}

pub struct RawSkill {
  pub skill_id:    String,
  pub user_id:     String,
  pub name:        String,
  pub proficiency: String,
}

impl RawSkill {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      skill_id:    row.get(0)?,
      user_id:     row.get(1)?,
      name:        row.get(2)?,
      proficiency: row.get(3)?,
    })
  }

  pub fn into_skill(self) -> Result<Skill> {
    Ok(Skill {
      skill_id:    decode_uuid(&self.skill_id)?,
      user_id:     decode_uuid(&self.user_id)?,
      name:        self.name,
      proficiency: decode_enum("proficiency", &self.proficiency)?,
    })
  }
}

pub struct RawTransaction {
  pub order_id:               String,
  pub user_id:                String,
  pub plan:                   String,
  pub gross_amount:           i64,
  pub status:                 String,
  pub gateway_transaction_id: Option<String>,
  pub redirect_url:           Option<String>,
  pub snap_token:             Option<String>,
  pub version:                i64,
  pub created_at:             String,
  pub updated_at:             String,
}

impl RawTransaction {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      order_id:               row.get(0)?,
      user_id:                row.get(1)?,
      plan:                   row.get(2)?,
      gross_amount:           row.get(3)?,
      status:                 row.get(4)?,
      gateway_transaction_id: row.get(5)?,
      redirect_url:           row.get(6)?,
      snap_token:             row.get(7)?,
      version:                row.get(8)?,
      created_at:             row.get(9)?,
      updated_at:             row.get(10)?,
    })
  }

  pub fn into_transaction(self) -> Result<Transaction> {
    Ok(Transaction {
      order_id:               self.order_id,
      user_id:                decode_uuid(&self.user_id)?,
      plan:                   decode_enum("plan", &self.plan)?,
      gross_amount:           self.gross_amount,
      status:                 decode_enum("transaction status", &self.status)?,
      gateway_transaction_id: self.gateway_transaction_id,
      redirect_url:           self.redirect_url,
      snap_token:             self.snap_token,
      version:                self.version,
      created_at:             decode_dt(&self.created_at)?,
      updated_at:             decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawEvent {
  pub event_id:       String,
  pub order_id:       String,
  pub from_status:    Option<String>,
  pub to_status:      String,
  pub gateway_status: Option<String>,
  pub recorded_at:    String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:       row.get(0)?,
      order_id:       row.get(1)?,
      from_status:    row.get(2)?,
      to_status:      row.get(3)?,
      gateway_status: row.get(4)?,
      recorded_at:    row.get(5)?,
    })
  }

  pub fn into_event(self) -> Result<TransactionEvent> {
    Ok(TransactionEvent {
      event_id:       decode_uuid(&self.event_id)?,
      order_id:       self.order_id,
      from_status:    self
        .from_status
        .as_deref()
        .map(|s| decode_enum("transaction status", s))
        .transpose()?,
      to_status:      decode_enum("transaction status", &self.to_status)?,
      gateway_status: self.gateway_status,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = DateTime::parse_from_rfc3339("2024-01-01T00:00:05.5Z").unwrap().with_timezone(&Utc);
    let b = DateTime::parse_from_rfc3339("2024-01-01T00:00:05.123Z").unwrap().with_timezone(&Utc);
    assert!(b < a);
    assert!(encode_dt(b) < encode_dt(a));
    assert_eq!(decode_dt(&encode_dt(a)).unwrap(), a);
  }

  #[test]
  fn like_pattern_escapes_wildcards() {
    assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    assert_eq!(like_pattern("rust"), "%rust%");
  }
}
