//! Reconciler - queued のまま止まっているジョブの再配送
//!
//! Producer は「create 成功 / enqueue 失敗」でもエラーにしません。
//! その穴をこのスイープが埋めます。
//!
//! # フロー
//! 1. JobStore::list_stale_queued(now - stale_after) で候補を取得
//! 2. claim_stale（CAS）で updated_at を now に進める
//! 3. 勝った場合だけ {id, params} を enqueue
//!
//! 負けた claim（他のスイーパーか worker が先に触った）は黙ってスキップします。
//! 重複配送は worker 側で安全に扱えるので、ここでは排他しきらなくてよい。

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::domain::{BobbinError, DispatchMessage, JobRecord};
use crate::ports::{Clock, JobStore, WorkQueue};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Time between sweeps.
    pub interval: Duration,

    /// A queued record untouched for this long is re-dispatched.
    pub stale_after: Duration,

    /// Records examined per sweep.
    pub batch_limit: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(120),
            batch_limit: 100,
        }
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub redispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    clock: Arc<dyn Clock>,
    config: ReconcileConfig,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
        config: ReconcileConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// One pass over stale queued records.
    pub async fn sweep(&self) -> Result<ReconcileReport, BobbinError> {
        let mut report = ReconcileReport::default();
        let now = self.clock.now();
        let Some(cutoff) = TimeDelta::from_std(self.config.stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return Ok(report);
        };

        let stale = self
            .retry
            .run("job_store.list_stale_queued", || {
                self.store.list_stale_queued(cutoff, self.config.batch_limit)
            })
            .await?;
        report.scanned = stale.len();

        for record in stale {
            match self.redispatch(&record, now).await {
                Ok(true) => report.redispatched += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(job_id = %record.id, error = %err, "re-dispatch failed");
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                redispatched = report.redispatched,
                skipped = report.skipped,
                failed = report.failed,
                "reconcile sweep finished"
            );
        }
        Ok(report)
    }

    async fn redispatch(
        &self,
        record: &JobRecord,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, BobbinError> {
        let claimed = self
            .retry
            .run("job_store.claim_stale", || {
                self.store.claim_stale(&record.id, record.updated_at, now)
            })
            .await;
        match claimed {
            Ok(true) => {}
            Ok(false) | Err(crate::domain::StoreError::NotFound(_)) => return Ok(false),
            Err(err) => return Err(err.into()),
        }

        let message = DispatchMessage::new(record.id.clone(), record.params.clone());
        self.retry
            .run("work_queue.enqueue", || self.queue.enqueue(&message))
            .await?;
        tracing::info!(job_id = %record.id, "stale job re-dispatched");
        Ok(true)
    }
}

/// Runs `Reconciler::sweep` every `interval` until shutdown.
pub struct ReconcileLoop {
    reconciler: Arc<Reconciler>,
}

impl ReconcileLoop {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.reconciler.config().interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!("reconcile loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.reconciler.sweep().await {
                        tracing::warn!(error = %err, "reconcile sweep failed");
                    }
                }
            }
        }
        tracing::debug!("reconcile loop stopped");
    }
}
