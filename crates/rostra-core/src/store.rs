//! The `IdentityStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `rostra-store-sqlite`).
//! Higher layers (`rostra-server`) depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::{
  Error,
  gateway::GatewaySession,
  profile::{
    Education, EducationPatch, Experience, ExperiencePatch, NewEducation, NewExperience,
    NewSkill, ProfileRecords, Skill,
  },
  transaction::{
    NewTransaction, Transaction, TransactionEvent, TransactionQuery, TransactionStatus,
  },
  user::{NewUser, ProfilePatch, Role, User, UserSummary},
};

// ─── Error contract ──────────────────────────────────────────────────────────

/// Error type of a store backend.
///
/// Backends wrap domain failures ([`Error`]) alongside their own
/// infrastructure faults; `domain` lets callers tell the two apart without
/// knowing the backend.
pub trait StoreError: std::error::Error + From<Error> + Send + Sync + 'static {
  /// The domain failure carried by this error, if any.
  fn domain(&self) -> Option<&Error>;
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Upper bound on results returned by a single search.
pub const MAX_SEARCH_RESULTS: usize = 50;

/// A finite, consume-once sequence of search hits in a deterministic order
/// (creation time, then user id).
#[derive(Debug)]
pub struct SearchResults {
  inner: std::vec::IntoIter<UserSummary>,
}

impl SearchResults {
  pub fn new(hits: Vec<UserSummary>) -> Self { Self { inner: hits.into_iter() } }
}

impl Iterator for SearchResults {
  type Item = UserSummary;

  fn next(&mut self) -> Option<Self::Item> { self.inner.next() }

  fn size_hint(&self) -> (usize, Option<usize>) { self.inner.size_hint() }
}

impl ExactSizeIterator for SearchResults {}

// ─── Status change ───────────────────────────────────────────────────────────

/// Subscription extension granted when a transaction settles.
#[derive(Debug, Clone, Copy)]
pub struct Entitlement {
  pub user_id:  Uuid,
  pub duration: TimeDelta,
}

/// A guarded status write for [`IdentityStore::transition`].
///
/// The write only lands if the stored version still equals
/// `expected_version`.
#[derive(Debug, Clone)]
pub struct StatusChange {
  pub order_id:               String,
  pub expected_version:       i64,
  pub from:                   TransactionStatus,
  pub to:                     TransactionStatus,
  pub gateway_status:         Option<String>,
  pub gateway_transaction_id: Option<String>,
  pub entitlement:            Option<Entitlement>,
  pub at:                     DateTime<Utc>,
}

/// Gateway references recorded outside a status change.
#[derive(Debug, Clone, Default)]
pub struct GatewayRefs {
  pub gateway_transaction_id: Option<String>,
  pub session:                Option<GatewaySession>,
}

impl GatewayRefs {
  pub fn is_empty(&self) -> bool {
    self.gateway_transaction_id.is_none() && self.session.is_none()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Rostra storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait IdentityStore: Send + Sync {
  type Error: StoreError;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Persist a new `member` with a `free` subscription. Fails with
  /// [`Error::DuplicateEmail`] if the email is taken.
  fn create_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// Look up by normalised (lower-case) email.
  fn get_user_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  fn get_user_by_slug<'a>(
    &'a self,
    slug: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// Apply a partial profile update and return the updated user.
  fn update_profile(
    &self,
    id: Uuid,
    patch: ProfilePatch,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Change a user's role. Only the operator CLI does this; no HTTP route
  /// exposes it.
  fn set_role(
    &self,
    id: Uuid,
    role: Role,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// Case-insensitive substring match over display name and headline.
  fn search_users<'a>(
    &'a self,
    keyword: &'a str,
  ) -> impl Future<Output = Result<SearchResults, Self::Error>> + Send + 'a;

  /// Mark every `active` subscription whose expiry is at or before `now` as
  /// `expired`. Returns the number of users changed.
  fn expire_subscriptions(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Profile records ───────────────────────────────────────────────────

  fn profile_records(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<ProfileRecords, Self::Error>> + Send + '_;

  fn add_education(
    &self,
    user_id: Uuid,
    input: NewEducation,
  ) -> impl Future<Output = Result<Education, Self::Error>> + Send + '_;

  /// Fails with [`Error::Forbidden`] if `caller` does not own the record.
  /// The ownership check precedes the write within one store transaction.
  fn update_education(
    &self,
    caller: Uuid,
    id: Uuid,
    patch: EducationPatch,
  ) -> impl Future<Output = Result<Education, Self::Error>> + Send + '_;

  fn delete_education(
    &self,
    caller: Uuid,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_experience(
    &self,
    user_id: Uuid,
    input: NewExperience,
  ) -> impl Future<Output = Result<Experience, Self::Error>> + Send + '_;

  fn update_experience(
    &self,
    caller: Uuid,
    id: Uuid,
    patch: ExperiencePatch,
  ) -> impl Future<Output = Result<Experience, Self::Error>> + Send + '_;

  fn delete_experience(
    &self,
    caller: Uuid,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_skill(
    &self,
    user_id: Uuid,
    input: NewSkill,
  ) -> impl Future<Output = Result<Skill, Self::Error>> + Send + '_;

  fn delete_skill(
    &self,
    caller: Uuid,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Distinct skill names across all users, sorted case-insensitively.
  fn list_skill_names(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  // ── Transactions ──────────────────────────────────────────────────────

  /// Persist a transaction in the `created` state and log its creation.
  fn insert_transaction(
    &self,
    input: NewTransaction,
  ) -> impl Future<Output = Result<Transaction, Self::Error>> + Send + '_;

  fn get_transaction<'a>(
    &'a self,
    order_id: &'a str,
  ) -> impl Future<Output = Result<Option<Transaction>, Self::Error>> + Send + 'a;

  /// Compare-and-swap a status change. Returns `false` without writing if the
  /// stored version no longer matches. When the change carries an
  /// [`Entitlement`], the user's subscription is extended in the same store
  /// transaction.
  fn transition(
    &self,
    change: StatusChange,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Fill in gateway references the transaction does not carry yet. Values
  /// already stored win; status and version are left alone. Fails with
  /// [`Error::UnknownOrder`] if there is no such order.
  fn record_gateway_refs<'a>(
    &'a self,
    order_id: &'a str,
    refs: GatewayRefs,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Newest first.
  fn list_transactions<'a>(
    &'a self,
    query: &'a TransactionQuery,
  ) -> impl Future<Output = Result<Vec<Transaction>, Self::Error>> + Send + 'a;

  /// Oldest first.
  fn transaction_history<'a>(
    &'a self,
    order_id: &'a str,
  ) -> impl Future<Output = Result<Vec<TransactionEvent>, Self::Error>> + Send + 'a;
}
