//! [`SqliteStore`] — the SQLite implementation of [`IdentityStore`].
//!
//! Every multi-statement operation runs inside one SQLite transaction on the
//! connection thread; the async methods only marshal owned inputs across.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use rostra_core::{
  Error as CoreError,
  profile::{
    Education, EducationPatch, Experience, ExperiencePatch, NewEducation, NewExperience,
    NewSkill, ProfileRecords, Skill,
  },
  store::{GatewayRefs, IdentityStore, MAX_SEARCH_RESULTS, SearchResults, StatusChange},
  transaction::{
    NewTransaction, Transaction, TransactionEvent, TransactionQuery, TransactionStatus,
  },
  user::{NewUser, ProfilePatch, Role, SubscriptionStatus, User, normalize_email},
};

use crate::{
  Result,
  encode::{
    EDUCATION_COLUMNS, EVENT_COLUMNS, EXPERIENCE_COLUMNS, RawEducation, RawEvent,
    RawExperience, RawSkill, RawTransaction, RawUser, SKILL_COLUMNS, TRANSACTION_COLUMNS,
    USER_COLUMNS, decode_dt, decode_enum, decode_uuid, encode_date, encode_dt, encode_uuid,
    like_pattern,
  },
  schema::SCHEMA,
};

/// Default page size for [`IdentityStore::list_transactions`].
const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rostra store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── IdentityStore impl ──────────────────────────────────────────────────────

impl IdentityStore for SqliteStore {
  type Error = crate::Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn create_user(&self, input: NewUser) -> Result<User> {
    let now = Utc::now();
    let user = User {
      user_id:                 Uuid::new_v4(),
      slug:                    input.slug,
      email:                   normalize_email(&input.email),
      password_hash:           input.password_hash,
      display_name:            input.display_name,
      headline:                input.headline,
      bio:                     input.bio,
      location:                input.location,
      role:                    Role::Member,
      subscription:            SubscriptionStatus::Free,
      subscription_expires_at: None,
      created_at:              now,
      updated_at:              now,
    };

    let row = user.clone();
    self.conn.call(move |conn| Ok(insert_user(conn, &row))).await??;
    Ok(user)
  }

  async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| Ok(select_user(conn, "user_id", id_str)))
      .await?
  }

  async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
    let email = normalize_email(email);
    self
      .conn
      .call(move |conn| Ok(select_user(conn, "email", email)))
      .await?
  }

  async fn get_user_by_slug(&self, slug: &str) -> Result<Option<User>> {
    let slug = slug.to_owned();
    self
      .conn
      .call(move |conn| Ok(select_user(conn, "slug", slug)))
      .await?
  }

  async fn update_profile(&self, id: Uuid, patch: ProfilePatch) -> Result<User> {
    patch.validate()?;
    let now = Utc::now();
    self
      .conn
      .call(move |conn| Ok(update_profile_tx(conn, id, patch, now)))
      .await?
  }

  async fn set_role(&self, id: Uuid, role: Role) -> Result<User> {
    let now = Utc::now();
    self
      .conn
      .call(move |conn| Ok(set_role_tx(conn, id, role, now)))
      .await?
  }

  async fn search_users(&self, keyword: &str) -> Result<SearchResults> {
    let pattern = like_pattern(keyword.trim());

    let raws: Vec<RawUser> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {USER_COLUMNS} FROM users
           WHERE display_name LIKE ?1 ESCAPE '\\'
              OR headline     LIKE ?1 ESCAPE '\\'
           ORDER BY created_at, user_id
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(params![pattern, MAX_SEARCH_RESULTS as i64], RawUser::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let hits = raws
      .into_iter()
      .map(|raw| raw.into_user().map(|u| u.summary()))
      .collect::<Result<Vec<_>>>()?;
    Ok(SearchResults::new(hits))
  }

  async fn expire_subscriptions(&self, now: DateTime<Utc>) -> Result<usize> {
    let now_str = encode_dt(now);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users
           SET subscription = 'expired', updated_at = ?1
           WHERE subscription = 'active'
             AND subscription_expires_at IS NOT NULL
             AND subscription_expires_at <= ?1",
          params![now_str],
        )?)
      })
      .await?;
    Ok(changed)
  }

  // ── Profile records ───────────────────────────────────────────────────────

  async fn profile_records(&self, user_id: Uuid) -> Result<ProfileRecords> {
    let id_str = encode_uuid(user_id);

    let (edu, exp, skills) = self
      .conn
      .call(move |conn| {
        let edu = conn
          .prepare(&format!(
            "SELECT {EDUCATION_COLUMNS} FROM education
             WHERE user_id = ?1 ORDER BY start_date DESC, education_id"
          ))?
          .query_map(params![id_str], RawEducation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let exp = conn
          .prepare(&format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experience
             WHERE user_id = ?1 ORDER BY start_date DESC, experience_id"
          ))?
          .query_map(params![id_str], RawExperience::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let skills = conn
          .prepare(&format!(
            "SELECT {SKILL_COLUMNS} FROM skills
             WHERE user_id = ?1 ORDER BY name COLLATE NOCASE, skill_id"
          ))?
          .query_map(params![id_str], RawSkill::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((edu, exp, skills))
      })
      .await?;

    Ok(ProfileRecords {
      education:  edu.into_iter().map(RawEducation::into_education).collect::<Result<_>>()?,
      experience: exp.into_iter().map(RawExperience::into_experience).collect::<Result<_>>()?,
      skills:     skills.into_iter().map(RawSkill::into_skill).collect::<Result<_>>()?,
    })
  }

  async fn add_education(&self, user_id: Uuid, input: NewEducation) -> Result<Education> {
    let record = input.into_record(user_id)?;
    let row = record.clone();
    self.conn.call(move |conn| Ok(insert_education(conn, &row))).await??;
    Ok(record)
  }

  async fn update_education(
    &self,
    caller: Uuid,
    id:     Uuid,
    patch:  EducationPatch,
  ) -> Result<Education> {
    self
      .conn
      .call(move |conn| Ok(update_education_tx(conn, caller, id, patch)))
      .await?
  }

  async fn delete_education(&self, caller: Uuid, id: Uuid) -> Result<()> {
    self
      .conn
      .call(move |conn| Ok(delete_owned(conn, OwnedTable::Education, caller, id)))
      .await?
  }

  async fn add_experience(&self, user_id: Uuid, input: NewExperience) -> Result<Experience> {
    let record = input.into_record(user_id)?;
    let row = record.clone();
    self.conn.call(move |conn| Ok(insert_experience(conn, &row))).await??;
    Ok(record)
  }

  async fn update_experience(
    &self,
    caller: Uuid,
    id:     Uuid,
    patch:  ExperiencePatch,
  ) -> Result<Experience> {
    self
      .conn
      .call(move |conn| Ok(update_experience_tx(conn, caller, id, patch)))
      .await?
  }

  async fn delete_experience(&self, caller: Uuid, id: Uuid) -> Result<()> {
    self
      .conn
      .call(move |conn| Ok(delete_owned(conn, OwnedTable::Experience, caller, id)))
      .await?
  }

  async fn add_skill(&self, user_id: Uuid, input: NewSkill) -> Result<Skill> {
    let record = input.into_record(user_id)?;
    let row = record.clone();
    self.conn.call(move |conn| Ok(insert_skill(conn, &row))).await??;
    Ok(record)
  }

  async fn delete_skill(&self, caller: Uuid, id: Uuid) -> Result<()> {
    self
      .conn
      .call(move |conn| Ok(delete_owned(conn, OwnedTable::Skills, caller, id)))
      .await?
  }

  async fn list_skill_names(&self) -> Result<Vec<String>> {
    let names = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT MIN(name) FROM skills
           GROUP BY lower(name)
           ORDER BY lower(MIN(name))",
        )?;
        let rows = stmt
          .query_map([], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  // ── Transactions ──────────────────────────────────────────────────────────

  async fn insert_transaction(&self, input: NewTransaction) -> Result<Transaction> {
    let now = Utc::now();
    let tx = Transaction {
      order_id:               input.order_id,
      user_id:                input.user_id,
      plan:                   input.plan,
      gross_amount:           input.gross_amount,
      status:                 TransactionStatus::Created,
      gateway_transaction_id: None,
      redirect_url:           None,
      snap_token:             None,
      version:                0,
      created_at:             now,
      updated_at:             now,
    };

    let row = tx.clone();
    self.conn.call(move |conn| Ok(insert_transaction_tx(conn, &row))).await??;
    Ok(tx)
  }

  async fn get_transaction(&self, order_id: &str) -> Result<Option<Transaction>> {
    let order_id = order_id.to_owned();
    let raw: Option<RawTransaction> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE order_id = ?1"),
              params![order_id],
              RawTransaction::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTransaction::into_transaction).transpose()
  }

  async fn transition(&self, change: StatusChange) -> Result<bool> {
    self
      .conn
      .call(move |conn| Ok(transition_tx(conn, change)))
      .await?
  }

  async fn record_gateway_refs(&self, order_id: &str, refs: GatewayRefs) -> Result<()> {
    let order_id = order_id.to_owned();
    let now = Utc::now();
    self
      .conn
      .call(move |conn| Ok(record_refs(conn, &order_id, refs, now)))
      .await?
  }

  async fn list_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
    let user_str   = query.user_id.map(encode_uuid);
    let status_str = query.status.map(|s| <&'static str>::from(s).to_owned());
    let before_str = query.created_before.map(encode_dt);
    let limit      = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT) as i64;

    let raws: Vec<RawTransaction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TRANSACTION_COLUMNS} FROM transactions
           WHERE (?1 IS NULL OR user_id = ?1)
             AND (?2 IS NULL OR status = ?2)
             AND (?3 IS NULL OR created_at < ?3)
           ORDER BY created_at DESC, order_id DESC
           LIMIT ?4"
        ))?;
        let rows = stmt
          .query_map(
            params![user_str, status_str, before_str, limit],
            RawTransaction::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTransaction::into_transaction).collect()
  }

  async fn transaction_history(&self, order_id: &str) -> Result<Vec<TransactionEvent>> {
    let order_id = order_id.to_owned();
    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM transaction_events
           WHERE order_id = ?1
           ORDER BY recorded_at, rowid"
        ))?;
        let rows = stmt
          .query_map(params![order_id], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }
}

// ─── Users (connection thread) ───────────────────────────────────────────────

fn select_user(conn: &Connection, column: &'static str, value: String) -> Result<Option<User>> {
  conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
      params![value],
      RawUser::from_row,
    )
    .optional()?
    .map(RawUser::into_user)
    .transpose()
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
  let role: &'static str = user.role.into();
  let subscription: &'static str = user.subscription.into();

  let inserted = conn.execute(
    &format!(
      "INSERT INTO users ({USER_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ),
    params![
      encode_uuid(user.user_id),
      user.slug,
      user.email,
      user.password_hash,
      user.display_name,
      user.headline,
      user.bio,
      user.location,
      role,
      subscription,
      user.subscription_expires_at.map(encode_dt),
      encode_dt(user.created_at),
      encode_dt(user.updated_at),
    ],
  );

  match inserted {
    Ok(_) => Ok(()),
    Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
      if err.code == rusqlite::ErrorCode::ConstraintViolation
        && msg.contains("users.email") =>
    {
      Err(CoreError::DuplicateEmail.into())
    }
    Err(e) => Err(e.into()),
  }
}

fn ensure_user(conn: &Connection, user_id: Uuid) -> Result<()> {
  let exists = conn
    .query_row(
      "SELECT 1 FROM users WHERE user_id = ?1",
      params![encode_uuid(user_id)],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if exists { Ok(()) } else { Err(CoreError::UserNotFound(user_id).into()) }
}

fn update_profile_tx(
  conn:  &mut Connection,
  id:    Uuid,
  patch: ProfilePatch,
  now:   DateTime<Utc>,
) -> Result<User> {
  let tx = conn.transaction()?;
  let mut user = select_user(&tx, "user_id", encode_uuid(id))?
    .ok_or(CoreError::UserNotFound(id))?;

  patch.apply(&mut user);
  user.updated_at = now;

  tx.execute(
    "UPDATE users
     SET display_name = ?2, headline = ?3, bio = ?4, location = ?5, updated_at = ?6
     WHERE user_id = ?1",
    params![
      encode_uuid(id),
      user.display_name,
      user.headline,
      user.bio,
      user.location,
      encode_dt(now),
    ],
  )?;
  tx.commit()?;
  Ok(user)
}

fn set_role_tx(conn: &mut Connection, id: Uuid, role: Role, now: DateTime<Utc>) -> Result<User> {
  let tx = conn.transaction()?;
  let mut user = select_user(&tx, "user_id", encode_uuid(id))?
    .ok_or(CoreError::UserNotFound(id))?;
  user.role = role;
  user.updated_at = now;

  let role_str: &'static str = role.into();
  tx.execute(
    "UPDATE users SET role = ?2, updated_at = ?3 WHERE user_id = ?1",
    params![encode_uuid(id), role_str, encode_dt(now)],
  )?;
  tx.commit()?;
  Ok(user)
}

// ─── Profile records (connection thread) ─────────────────────────────────────

/// Tables whose rows are owned by exactly one user.
#[derive(Clone, Copy)]
enum OwnedTable {
  Education,
  Experience,
  Skills,
}

impl OwnedTable {
  fn name(self) -> &'static str {
    match self {
      Self::Education => "education",
      Self::Experience => "experience",
      Self::Skills => "skills",
    }
  }

  fn key(self) -> &'static str {
    match self {
      Self::Education => "education_id",
      Self::Experience => "experience_id",
      Self::Skills => "skill_id",
    }
  }
}

/// Read the owner of `id` and refuse unless it is `caller`.
fn check_owner(conn: &Connection, table: OwnedTable, caller: Uuid, id: Uuid) -> Result<()> {
  let owner: Option<String> = conn
    .query_row(
      &format!("SELECT user_id FROM {} WHERE {} = ?1", table.name(), table.key()),
      params![encode_uuid(id)],
      |r| r.get(0),
    )
    .optional()?;

  let owner = owner.ok_or(CoreError::RecordNotFound(id))?;
  if decode_uuid(&owner)? != caller {
    return Err(CoreError::Forbidden(id).into());
  }
  Ok(())
}

fn delete_owned(conn: &mut Connection, table: OwnedTable, caller: Uuid, id: Uuid) -> Result<()> {
  let tx = conn.transaction()?;
  check_owner(&tx, table, caller, id)?;
  tx.execute(
    &format!("DELETE FROM {} WHERE {} = ?1 AND user_id = ?2", table.name(), table.key()),
    params![encode_uuid(id), encode_uuid(caller)],
  )?;
  tx.commit()?;
  Ok(())
}

fn insert_education(conn: &Connection, e: &Education) -> Result<()> {
  ensure_user(conn, e.user_id)?;
  conn.execute(
    &format!(
      "INSERT INTO education ({EDUCATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    ),
    params![
      encode_uuid(e.education_id),
      encode_uuid(e.user_id),
      e.institution,
      e.degree,
      e.field_of_study,
      encode_date(e.start_date),
      e.end_date.map(encode_date),
      e.description,
    ],
  )?;
  Ok(())
}

fn update_education_tx(
  conn:   &mut Connection,
  caller: Uuid,
  id:     Uuid,
  patch:  EducationPatch,
) -> Result<Education> {
  let tx = conn.transaction()?;
  check_owner(&tx, OwnedTable::Education, caller, id)?;

  let mut record = tx
    .query_row(
      &format!("SELECT {EDUCATION_COLUMNS} FROM education WHERE education_id = ?1"),
      params![encode_uuid(id)],
      RawEducation::from_row,
    )?
    .into_education()?;
  patch.apply(&mut record)?;

  tx.execute(
    "UPDATE education
     SET institution = ?3, degree = ?4, field_of_study = ?5,
         start_date = ?6, end_date = ?7, description = ?8
     WHERE education_id = ?1 AND user_id = ?2",
    params![
      encode_uuid(id),
      encode_uuid(caller),
      record.institution,
      record.degree,
      record.field_of_study,
      encode_date(record.start_date),
      record.end_date.map(encode_date),
      record.description,
    ],
  )?;
  tx.commit()?;
  Ok(record)
}

fn insert_experience(conn: &Connection, e: &Experience) -> Result<()> {
  ensure_user(conn, e.user_id)?;
  conn.execute(
    &format!(
      "INSERT INTO experience ({EXPERIENCE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    ),
    params![
      encode_uuid(e.experience_id),
      encode_uuid(e.user_id),
      e.company,
      e.title,
      e.location,
      encode_date(e.start_date),
      e.end_date.map(encode_date),
      e.description,
    ],
  )?;
  Ok(())
}

fn update_experience_tx(
  conn:   &mut Connection,
  caller: Uuid,
  id:     Uuid,
  patch:  ExperiencePatch,
) -> Result<Experience> {
  let tx = conn.transaction()?;
  check_owner(&tx, OwnedTable::Experience, caller, id)?;

  let mut record = tx
    .query_row(
      &format!("SELECT {EXPERIENCE_COLUMNS} FROM experience WHERE experience_id = ?1"),
      params![encode_uuid(id)],
      RawExperience::from_row,
    )?
    .into_experience()?;
  patch.apply(&mut record)?;

  tx.execute(
    "UPDATE experience
     SET company = ?3, title = ?4, location = ?5,
         start_date = ?6, end_date = ?7, description = ?8
     WHERE experience_id = ?1 AND user_id = ?2",
    params![
      encode_uuid(id),
      encode_uuid(caller),
      record.company,
      record.title,
      record.location,
      encode_date(record.start_date),
      record.end_date.map(encode_date),
      record.description,
    ],
  )?;
  tx.commit()?;
  Ok(record)
}

fn insert_skill(conn: &Connection, s: &Skill) -> Result<()> {
  ensure_user(conn, s.user_id)?;
  let proficiency: &'static str = s.proficiency.into();
  conn.execute(
    &format!("INSERT INTO skills ({SKILL_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
    params![encode_uuid(s.skill_id), encode_uuid(s.user_id), s.name, proficiency],
  )?;
  Ok(())
}

// ─── Transactions (connection thread) ────────────────────────────────────────

fn insert_event(
  conn:           &Connection,
  order_id:       &str,
  from:           Option<TransactionStatus>,
  to:             TransactionStatus,
  gateway_status: Option<&str>,
  at:             DateTime<Utc>,
) -> Result<()> {
  let from_str = from.map(<&'static str>::from);
  let to_str: &'static str = to.into();
  conn.execute(
    &format!("INSERT INTO transaction_events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
    params![
      encode_uuid(Uuid::new_v4()),
      order_id,
      from_str,
      to_str,
      gateway_status,
      encode_dt(at),
    ],
  )?;
  Ok(())
}

fn insert_transaction_tx(conn: &mut Connection, t: &Transaction) -> Result<()> {
  let tx = conn.transaction()?;
  ensure_user(&tx, t.user_id)?;

  let plan: &'static str = t.plan.into();
  let status: &'static str = t.status.into();
  tx.execute(
    &format!(
      "INSERT INTO transactions ({TRANSACTION_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, NULL, ?6, ?7, ?8)"
    ),
    params![
      t.order_id,
      encode_uuid(t.user_id),
      plan,
      t.gross_amount,
      status,
      t.version,
      encode_dt(t.created_at),
      encode_dt(t.updated_at),
    ],
  )?;
  insert_event(&tx, &t.order_id, None, t.status, None, t.created_at)?;
  tx.commit()?;
  Ok(())
}

fn record_refs(
  conn:     &Connection,
  order_id: &str,
  refs:     GatewayRefs,
  now:      DateTime<Utc>,
) -> Result<()> {
  let (token, redirect_url) = refs.session.map(|s| (s.token, s.redirect_url)).unzip();
  let updated = conn.execute(
    "UPDATE transactions
     SET gateway_transaction_id = COALESCE(gateway_transaction_id, ?2),
         snap_token             = COALESCE(snap_token, ?3),
         redirect_url           = COALESCE(redirect_url, ?4),
         updated_at             = ?5
     WHERE order_id = ?1",
    params![order_id, refs.gateway_transaction_id, token, redirect_url, encode_dt(now)],
  )?;
  if updated == 0 {
    return Err(CoreError::UnknownOrder(order_id.to_owned()).into());
  }
  Ok(())
}

fn transition_tx(conn: &mut Connection, change: StatusChange) -> Result<bool> {
  let tx = conn.transaction()?;
  let at_str = encode_dt(change.at);
  let to_str: &'static str = change.to.into();

  let updated = tx.execute(
    "UPDATE transactions
     SET status                 = ?1,
         version                = version + 1,
         updated_at             = ?2,
         gateway_transaction_id = COALESCE(gateway_transaction_id, ?3)
     WHERE order_id = ?4 AND version = ?5",
    params![
      to_str,
      at_str,
      change.gateway_transaction_id,
      change.order_id,
      change.expected_version,
    ],
  )?;

  // Lost the race: dropping `tx` rolls back.
  if updated == 0 {
    return Ok(false);
  }

  insert_event(
    &tx,
    &change.order_id,
    Some(change.from),
    change.to,
    change.gateway_status.as_deref(),
    change.at,
  )?;

  if let Some(grant) = change.entitlement {
    let user_str = encode_uuid(grant.user_id);
    let (current, expires): (String, Option<String>) = tx.query_row(
      "SELECT subscription, subscription_expires_at FROM users WHERE user_id = ?1",
      params![user_str],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    // Extend a still-running subscription rather than restarting it.
    let current: SubscriptionStatus = decode_enum("subscription", &current)?;
    let expires = expires.as_deref().map(decode_dt).transpose()?;
    let base = match (current, expires) {
      (SubscriptionStatus::Active, Some(until)) if until > change.at => until,
      _ => change.at,
    };

    tx.execute(
      "UPDATE users
       SET subscription = 'active', subscription_expires_at = ?2, updated_at = ?3
       WHERE user_id = ?1",
      params![user_str, encode_dt(base + grant.duration), at_str],
    )?;
  }

  tx.commit()?;
  Ok(true)
}
