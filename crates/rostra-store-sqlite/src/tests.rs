//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, TimeDelta, Utc};
use rostra_core::{
  Error as CoreError,
  gateway::GatewaySession,
  ledger::{GatewayUpdate, Outcome, apply_status},
  plan::Plan,
  profile::{EducationPatch, NewEducation, NewExperience, NewSkill, Proficiency},
  store::{GatewayRefs, IdentityStore, StoreError as _},
  transaction::{NewTransaction, TransactionQuery, TransactionStatus},
  user::{NewUser, ProfilePatch, Role, SubscriptionStatus, User},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn new_user(name: &str) -> NewUser {
  NewUser {
    email:         format!("{name}@example.com"),
    password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
    slug:          format!("{name}-x1"),
    display_name:  name.to_owned(),
    headline:      None,
    bio:           None,
    location:      None,
  }
}

async fn user(s: &SqliteStore, name: &str) -> User {
  s.create_user(new_user(name)).await.unwrap()
}

fn domain(err: &Error) -> &CoreError {
  err.domain().expect("domain error")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn education(institution: &str) -> NewEducation {
  NewEducation {
    institution:    institution.into(),
    degree:         "BSc".into(),
    field_of_study: Some("Computer Science".into()),
    start_date:     date(2015, 9, 1),
    end_date:       Some(date(2019, 6, 30)),
    description:    None,
  }
}

// ─── Users ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_fetch_user() {
  let s = store().await;
  let mut input = new_user("alice");
  input.email = "  Alice@Example.COM ".into();
  let alice = s.create_user(input).await.unwrap();

  assert_eq!(alice.email, "alice@example.com");
  assert_eq!(alice.role, Role::Member);
  assert_eq!(alice.subscription, SubscriptionStatus::Free);

  let by_id = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(by_id.email, alice.email);
  assert_eq!(by_id.password_hash, alice.password_hash);

  let by_email = s.get_user_by_email("ALICE@example.com").await.unwrap();
  assert_eq!(by_email.map(|u| u.user_id), Some(alice.user_id));

  let by_slug = s.get_user_by_slug("alice-x1").await.unwrap();
  assert_eq!(by_slug.map(|u| u.user_id), Some(alice.user_id));
}

#[tokio::test]
async fn missing_user_returns_none() {
  let s = store().await;
  assert!(s.get_user(Uuid::new_v4()).await.unwrap().is_none());
  assert!(s.get_user_by_email("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let s = store().await;
  user(&s, "alice").await;

  let mut again = new_user("alice");
  again.email = "ALICE@example.com".into();
  again.slug = "alice-x2".into();
  let err = s.create_user(again).await.unwrap_err();
  assert!(matches!(domain(&err), CoreError::DuplicateEmail));
}

#[tokio::test]
async fn partial_profile_update_keeps_other_fields() {
  let s = store().await;
  let mut input = new_user("alice");
  input.headline = Some("Rustacean".into());
  input.location = Some("Jakarta".into());
  let alice = s.create_user(input).await.unwrap();

  let patch = ProfilePatch { bio: Some("Writes parsers.".into()), ..Default::default() };
  let updated = s.update_profile(alice.user_id, patch).await.unwrap();

  assert_eq!(updated.bio.as_deref(), Some("Writes parsers."));
  assert_eq!(updated.headline.as_deref(), Some("Rustacean"));
  assert_eq!(updated.location.as_deref(), Some("Jakarta"));

  let stored = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(stored.bio, updated.bio);
  assert_eq!(stored.headline, updated.headline);
}

#[tokio::test]
async fn profile_update_for_unknown_user() {
  let s = store().await;
  let patch = ProfilePatch { headline: Some("x".into()), ..Default::default() };
  let err = s.update_profile(Uuid::new_v4(), patch).await.unwrap_err();
  assert!(matches!(domain(&err), CoreError::UserNotFound(_)));
}

#[tokio::test]
async fn promote_to_admin() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let promoted = s.set_role(alice.user_id, Role::Admin).await.unwrap();
  assert_eq!(promoted.role, Role::Admin);

  let stored = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(stored.role, Role::Admin);

  let err = s.set_role(Uuid::new_v4(), Role::Admin).await.unwrap_err();
  assert!(matches!(domain(&err), CoreError::UserNotFound(_)));
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_is_case_insensitive_and_ordered() {
  let s = store().await;
  let mut a = new_user("ann");
  a.headline = Some("Senior RUST engineer".into());
  let a = s.create_user(a).await.unwrap();
  let b = user(&s, "bob").await;
  let mut c = new_user("rusty");
  c.display_name = "Rusty Nail".into();
  let c = s.create_user(c).await.unwrap();

  let hits: Vec<_> = s.search_users("rust").await.unwrap().map(|u| u.user_id).collect();
  assert_eq!(hits, vec![a.user_id, c.user_id]);

  let all: Vec<_> = s.search_users("  ").await.unwrap().map(|u| u.user_id).collect();
  assert_eq!(all, vec![a.user_id, b.user_id, c.user_id]);
}

#[tokio::test]
async fn search_treats_wildcards_literally() {
  let s = store().await;
  user(&s, "alice").await;
  let results = s.search_users("%").await.unwrap();
  assert_eq!(results.len(), 0);
}

// ─── Profile records ─────────────────────────────────────────────────────────

#[tokio::test]
async fn add_records_and_read_profile() {
  let s = store().await;
  let alice = user(&s, "alice").await;

  s.add_education(alice.user_id, education("ITB")).await.unwrap();
  s.add_experience(
    alice.user_id,
    NewExperience {
      company:     "Acme".into(),
      title:       "Engineer".into(),
      location:    None,
      start_date:  date(2020, 1, 1),
      end_date:    None,
      description: None,
    },
  )
  .await
  .unwrap();
  s.add_skill(alice.user_id, NewSkill { name: "Rust".into(), proficiency: Proficiency::Expert })
    .await
    .unwrap();

  let records = s.profile_records(alice.user_id).await.unwrap();
  assert_eq!(records.education.len(), 1);
  assert_eq!(records.education[0].institution, "ITB");
  assert_eq!(records.experience.len(), 1);
  assert_eq!(records.skills.len(), 1);
  assert_eq!(records.skills[0].proficiency, Proficiency::Expert);
}

#[tokio::test]
async fn adding_a_record_leaves_siblings_untouched() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let first = s.add_education(alice.user_id, education("ITB")).await.unwrap();
  s.add_education(alice.user_id, education("UI")).await.unwrap();

  let records = s.profile_records(alice.user_id).await.unwrap();
  assert_eq!(records.education.len(), 2);
  assert!(records.education.contains(&first));
}

#[tokio::test]
async fn add_record_for_unknown_user() {
  let s = store().await;
  let err = s.add_education(Uuid::new_v4(), education("ITB")).await.unwrap_err();
  assert!(matches!(domain(&err), CoreError::UserNotFound(_)));
}

#[tokio::test]
async fn invalid_record_is_rejected_before_write() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let mut bad = education("ITB");
  bad.end_date = Some(date(2010, 1, 1));

  let err = s.add_education(alice.user_id, bad).await.unwrap_err();
  assert!(matches!(domain(&err), CoreError::Validation(_)));
  assert!(s.profile_records(alice.user_id).await.unwrap().education.is_empty());
}

#[tokio::test]
async fn owner_can_patch_education() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let record = s.add_education(alice.user_id, education("ITB")).await.unwrap();

  let patch = EducationPatch { degree: Some("MSc".into()), ..Default::default() };
  let updated = s
    .update_education(alice.user_id, record.education_id, patch)
    .await
    .unwrap();
  assert_eq!(updated.degree, "MSc");
  assert_eq!(updated.institution, "ITB");

  let records = s.profile_records(alice.user_id).await.unwrap();
  assert_eq!(records.education[0].degree, "MSc");
}

#[tokio::test]
async fn other_user_cannot_touch_education() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let record = s.add_education(alice.user_id, education("ITB")).await.unwrap();

  let patch = EducationPatch { degree: Some("PhD".into()), ..Default::default() };
  let err = s
    .update_education(bob.user_id, record.education_id, patch)
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), CoreError::Forbidden(_)));

  let err = s
    .delete_education(bob.user_id, record.education_id)
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), CoreError::Forbidden(_)));

  let records = s.profile_records(alice.user_id).await.unwrap();
  assert_eq!(records.education, vec![record]);
}

#[tokio::test]
async fn delete_then_not_found() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let skill = s
    .add_skill(alice.user_id, NewSkill { name: "Go".into(), proficiency: Proficiency::Beginner })
    .await
    .unwrap();

  s.delete_skill(alice.user_id, skill.skill_id).await.unwrap();
  let err = s.delete_skill(alice.user_id, skill.skill_id).await.unwrap_err();
  assert!(matches!(domain(&err), CoreError::RecordNotFound(_)));
  assert!(s.profile_records(alice.user_id).await.unwrap().skills.is_empty());
}

#[tokio::test]
async fn skill_catalogue_is_distinct_and_sorted() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  for (owner, name) in [(&alice, "rust"), (&alice, "Go"), (&bob, "Rust"), (&bob, "axum")] {
    s.add_skill(owner.user_id, NewSkill { name: name.into(), proficiency: Proficiency::default() })
      .await
      .unwrap();
  }

  let names = s.list_skill_names().await.unwrap();
  assert_eq!(names, vec!["axum", "Go", "Rust"]);
}

// ─── Transactions ────────────────────────────────────────────────────────────

async fn transaction(s: &SqliteStore, owner: &User, plan: Plan) -> String {
  let tx = s
    .insert_transaction(NewTransaction::new(owner.user_id, plan))
    .await
    .unwrap();
  assert_eq!(tx.status, TransactionStatus::Created);
  tx.order_id
}

fn from_gateway(status: &str) -> GatewayUpdate {
  GatewayUpdate {
    gateway_status:         Some(status.into()),
    gateway_transaction_id: Some("gw-1".into()),
  }
}

fn session(tag: &str) -> GatewaySession {
  GatewaySession {
    token:        format!("snap-{tag}"),
    redirect_url: format!("https://pay.example/{tag}"),
  }
}

#[tokio::test]
async fn session_is_recorded_without_a_status_change() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;

  let refs = GatewayRefs { session: Some(session("abc")), ..Default::default() };
  s.record_gateway_refs(&order, refs).await.unwrap();

  let tx = s.get_transaction(&order).await.unwrap().unwrap();
  assert_eq!(tx.status, TransactionStatus::Created);
  assert_eq!(tx.version, 0);
  assert_eq!(tx.snap_token.as_deref(), Some("snap-abc"));
  assert_eq!(tx.redirect_url.as_deref(), Some("https://pay.example/abc"));

  let outcome = apply_status(&s, &order, TransactionStatus::Pending, GatewayUpdate::default())
    .await
    .unwrap();
  assert_eq!(
    outcome,
    Outcome::Applied { from: TransactionStatus::Created, to: TransactionStatus::Pending }
  );
  let tx = s.get_transaction(&order).await.unwrap().unwrap();
  assert_eq!(tx.redirect_url.as_deref(), Some("https://pay.example/abc"));
  assert_eq!(tx.version, 1);
}

#[tokio::test]
async fn session_recorded_after_pending_notification() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;

  // The gateway's pending notification lands before its session response.
  apply_status(&s, &order, TransactionStatus::Pending, from_gateway("pending"))
    .await
    .unwrap();
  let refs = GatewayRefs { session: Some(session("late")), ..Default::default() };
  s.record_gateway_refs(&order, refs).await.unwrap();

  let tx = s.get_transaction(&order).await.unwrap().unwrap();
  assert_eq!(tx.status, TransactionStatus::Pending);
  assert_eq!(tx.redirect_url.as_deref(), Some("https://pay.example/late"));
  assert_eq!(tx.gateway_transaction_id.as_deref(), Some("gw-1"));
}

#[tokio::test]
async fn recorded_refs_are_never_overwritten() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;

  let first = GatewayRefs {
    gateway_transaction_id: Some("gw-first".into()),
    session:                Some(session("first")),
  };
  let second = GatewayRefs {
    gateway_transaction_id: Some("gw-second".into()),
    session:                Some(session("second")),
  };
  s.record_gateway_refs(&order, first).await.unwrap();
  s.record_gateway_refs(&order, second).await.unwrap();

  let tx = s.get_transaction(&order).await.unwrap().unwrap();
  assert_eq!(tx.gateway_transaction_id.as_deref(), Some("gw-first"));
  assert_eq!(tx.snap_token.as_deref(), Some("snap-first"));

  let err = s
    .record_gateway_refs("rostra-missing", GatewayRefs::default())
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), CoreError::UnknownOrder(_)));
}

#[tokio::test]
async fn unchanged_status_still_records_gateway_id() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &order, TransactionStatus::Pending, GatewayUpdate::default())
    .await
    .unwrap();

  let outcome = apply_status(&s, &order, TransactionStatus::Pending, from_gateway("pending"))
    .await
    .unwrap();
  assert_eq!(outcome, Outcome::Unchanged { status: TransactionStatus::Pending });

  let tx = s.get_transaction(&order).await.unwrap().unwrap();
  assert_eq!(tx.gateway_transaction_id.as_deref(), Some("gw-1"));
  assert_eq!(tx.version, 1);
  assert_eq!(s.transaction_history(&order).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_order_is_reported() {
  let s = store().await;
  let err = apply_status(&s, "rostra-missing", TransactionStatus::Settled, GatewayUpdate::default())
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), CoreError::UnknownOrder(_)));
}

#[tokio::test]
async fn settle_grants_entitlement_once() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &order, TransactionStatus::Pending, GatewayUpdate::default())
    .await
    .unwrap();

  let before = Utc::now() - TimeDelta::seconds(1);
  let first = apply_status(&s, &order, TransactionStatus::Settled, from_gateway("settlement"))
    .await
    .unwrap();
  assert!(matches!(first, Outcome::Applied { to: TransactionStatus::Settled, .. }));

  let active = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(active.subscription, SubscriptionStatus::Active);
  let expires = active.subscription_expires_at.unwrap();
  assert!(expires >= before + TimeDelta::days(30));
  assert!(expires <= Utc::now() + TimeDelta::days(30));

  let second = apply_status(&s, &order, TransactionStatus::Settled, from_gateway("settlement"))
    .await
    .unwrap();
  assert_eq!(second, Outcome::Unchanged { status: TransactionStatus::Settled });

  let again = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(again.subscription_expires_at, Some(expires));

  let settles = s
    .transaction_history(&order)
    .await
    .unwrap()
    .into_iter()
    .filter(|e| e.to_status == TransactionStatus::Settled)
    .count();
  assert_eq!(settles, 1);

  let tx = s.get_transaction(&order).await.unwrap().unwrap();
  assert_eq!(tx.gateway_transaction_id.as_deref(), Some("gw-1"));
}

#[tokio::test]
async fn second_settlement_extends_running_subscription() {
  let s = store().await;
  let alice = user(&s, "alice").await;

  let first = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &first, TransactionStatus::Settled, GatewayUpdate::default())
    .await
    .unwrap();
  let after_first = s.get_user(alice.user_id).await.unwrap().unwrap();

  let second = transaction(&s, &alice, Plan::Yearly).await;
  apply_status(&s, &second, TransactionStatus::Settled, GatewayUpdate::default())
    .await
    .unwrap();
  let after_second = s.get_user(alice.user_id).await.unwrap().unwrap();

  assert_eq!(
    after_second.subscription_expires_at,
    after_first.subscription_expires_at.map(|t| t + TimeDelta::days(365)),
  );
}

#[tokio::test]
async fn conflicting_terminal_status_is_refused() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &order, TransactionStatus::Denied, from_gateway("deny"))
    .await
    .unwrap();

  let err = apply_status(&s, &order, TransactionStatus::Settled, from_gateway("settlement"))
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), CoreError::AlreadyTerminal { .. }));

  let err = apply_status(&s, &order, TransactionStatus::Pending, from_gateway("pending"))
    .await
    .unwrap_err();
  assert!(matches!(domain(&err), CoreError::InvalidTransition { .. }));

  let tx = s.get_transaction(&order).await.unwrap().unwrap();
  assert_eq!(tx.status, TransactionStatus::Denied);
}

#[tokio::test]
async fn denied_leaves_active_subscription_alone() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let paid = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &paid, TransactionStatus::Settled, GatewayUpdate::default())
    .await
    .unwrap();
  let before = s.get_user(alice.user_id).await.unwrap().unwrap();

  let failed = transaction(&s, &alice, Plan::Yearly).await;
  apply_status(&s, &failed, TransactionStatus::Denied, from_gateway("deny"))
    .await
    .unwrap();

  let after = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(after.subscription, SubscriptionStatus::Active);
  assert_eq!(after.subscription_expires_at, before.subscription_expires_at);
}

#[tokio::test]
async fn concurrent_conflicting_notifications() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &order, TransactionStatus::Pending, GatewayUpdate::default())
    .await
    .unwrap();

  let (a, b) = tokio::join!(
    apply_status(&s, &order, TransactionStatus::Settled, from_gateway("settlement")),
    apply_status(&s, &order, TransactionStatus::Cancelled, from_gateway("cancel")),
  );

  let results = [a, b];
  let applied = results.iter().filter(|r| matches!(r, Ok(Outcome::Applied { .. }))).count();
  let refused = results
    .iter()
    .filter(|r| {
      r.as_ref()
        .err()
        .is_some_and(|e| matches!(e.domain(), Some(CoreError::AlreadyTerminal { .. })))
    })
    .count();
  assert_eq!(applied, 1);
  assert_eq!(refused, 1);

  let terminal_events = s
    .transaction_history(&order)
    .await
    .unwrap()
    .into_iter()
    .filter(|e| e.to_status.is_terminal())
    .count();
  assert_eq!(terminal_events, 1);
}

#[tokio::test]
async fn history_is_oldest_first() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &order, TransactionStatus::Pending, GatewayUpdate::default())
    .await
    .unwrap();
  apply_status(&s, &order, TransactionStatus::Expired, from_gateway("expire"))
    .await
    .unwrap();

  let history = s.transaction_history(&order).await.unwrap();
  let steps: Vec<_> = history.iter().map(|e| (e.from_status, e.to_status)).collect();
  assert_eq!(
    steps,
    vec![
      (None, TransactionStatus::Created),
      (Some(TransactionStatus::Created), TransactionStatus::Pending),
      (Some(TransactionStatus::Pending), TransactionStatus::Expired),
    ]
  );
  assert_eq!(history[2].gateway_status.as_deref(), Some("expire"));
}

#[tokio::test]
async fn list_transactions_filters() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let a1 = transaction(&s, &alice, Plan::Monthly).await;
  let a2 = transaction(&s, &alice, Plan::Yearly).await;
  let b1 = transaction(&s, &bob, Plan::Monthly).await;
  apply_status(&s, &a2, TransactionStatus::Pending, GatewayUpdate::default())
    .await
    .unwrap();

  let mine = s
    .list_transactions(&TransactionQuery { user_id: Some(alice.user_id), ..Default::default() })
    .await
    .unwrap();
  let ids: Vec<_> = mine.iter().map(|t| t.order_id.clone()).collect();
  assert_eq!(ids, vec![a2.clone(), a1.clone()]);

  let created = s
    .list_transactions(&TransactionQuery {
      status: Some(TransactionStatus::Created),
      ..Default::default()
    })
    .await
    .unwrap();
  let ids: Vec<_> = created.iter().map(|t| t.order_id.clone()).collect();
  assert_eq!(ids, vec![b1, a1]);

  let stale = s
    .list_transactions(&TransactionQuery {
      created_before: Some(Utc::now() - TimeDelta::hours(1)),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(stale.is_empty());
}

#[tokio::test]
async fn lapsed_subscriptions_expire() {
  let s = store().await;
  let alice = user(&s, "alice").await;
  let bob = user(&s, "bob").await;
  let order = transaction(&s, &alice, Plan::Monthly).await;
  apply_status(&s, &order, TransactionStatus::Settled, GatewayUpdate::default())
    .await
    .unwrap();

  assert_eq!(s.expire_subscriptions(Utc::now()).await.unwrap(), 0);

  let later = Utc::now() + TimeDelta::days(31);
  assert_eq!(s.expire_subscriptions(later).await.unwrap(), 1);

  let alice = s.get_user(alice.user_id).await.unwrap().unwrap();
  assert_eq!(alice.subscription, SubscriptionStatus::Expired);
  let bob = s.get_user(bob.user_id).await.unwrap().unwrap();
  assert_eq!(bob.subscription, SubscriptionStatus::Free);
}
