//! Background sweep for transactions and subscriptions that time has
//! overtaken.
//!
//! Every interval the sweeper:
//! 1. expires transactions still `created` after `stale_after`, which only
//!    happens when the gateway never answered the session request;
//! 2. marks `active` subscriptions whose expiry has passed as `expired`.
//!
//! Both go through the same guarded writes as request handling, so a sweep
//! racing a late notification simply loses or wins the compare-and-swap.

use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use rostra_core::{
  Error as CoreError,
  ledger::{GatewayUpdate, apply_status},
  store::{IdentityStore, StoreError as _},
  transaction::{TransactionQuery, TransactionStatus},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::SweepConfig;

/// Stale orders handled per sweep.
const BATCH: usize = 200;

pub struct Sweeper<S> {
  store:       Arc<S>,
  interval:    Duration,
  stale_after: TimeDelta,
}

impl<S: IdentityStore + 'static> Sweeper<S> {
  pub fn new(store: Arc<S>, config: &SweepConfig) -> Self {
    Self {
      store,
      interval: Duration::from_secs(config.interval_secs.max(1)),
      stale_after: TimeDelta::seconds(config.stale_after_secs as i64),
    }
  }

  /// Run until `shutdown` fires. Spawn with `tokio::spawn(sweeper.run(token))`.
  pub async fn run(self, shutdown: CancellationToken) {
    info!(interval_secs = self.interval.as_secs(), "sweeper starting");
    let mut ticker = tokio::time::interval(self.interval);

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          self.sweep_once().await;
        }
        _ = shutdown.cancelled() => {
          info!("sweeper shutting down");
          return;
        }
      }
    }
  }

  /// One pass. Failures are logged; the next tick tries again.
  pub async fn sweep_once(&self) -> SweepReport {
    let mut report = SweepReport::default();
    let now = Utc::now();

    let query = TransactionQuery {
      status:         Some(TransactionStatus::Created),
      created_before: Some(now - self.stale_after),
      limit:          Some(BATCH),
      ..Default::default()
    };

    match self.store.list_transactions(&query).await {
      Ok(stale) => {
        for tx in stale {
          let update = GatewayUpdate::default();
          match apply_status(self.store.as_ref(), &tx.order_id, TransactionStatus::Expired, update)
            .await
          {
            Ok(_) => report.expired_orders += 1,
            Err(e)
              if matches!(
                e.domain(),
                Some(CoreError::AlreadyTerminal { .. } | CoreError::InvalidTransition { .. })
              ) => {}
            Err(e) => warn!(order_id = %tx.order_id, error = %e, "failed to expire stale order"),
          }
        }
      }
      Err(e) => warn!(error = %e, "failed to list stale orders"),
    }

    match self.store.expire_subscriptions(now).await {
      Ok(n) => report.expired_subscriptions = n,
      Err(e) => warn!(error = %e, "failed to expire subscriptions"),
    }

    if report != SweepReport::default() {
      info!(
        expired_orders = report.expired_orders,
        expired_subscriptions = report.expired_subscriptions,
        "sweep complete"
      );
    }
    report
  }
}

/// Counts from one [`Sweeper::sweep_once`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
  pub expired_orders:        usize,
  pub expired_subscriptions: usize,
}
