//! Worker - 配送メッセージを処理してジョブを終端状態にする
//!
//! # フロー（1 メッセージ）
//! decode → get → (終端なら skip) → mark_running → 操作を順に実行 → update_terminal → ack
//!
//! - 同じメッセージが 2 回届いても安全（終端ならクエリエンジンを呼ばない）
//! - 操作の失敗・タイムアウトはジョブの `failed` として記録（配送内リトライなし）
//! - ストアの一時障害が続いたら ack しない（visibility timeout 後に再配送）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::app::catalog::OperationCatalog;
use crate::domain::{
    BobbinError, DispatchMessage, JobRecord, JobResult, QueryError, StoreError, TerminalOutcome,
    TransitionError,
};
use crate::ports::{Clock, Delivery, JobStore, QueryEngine, WorkQueue};
use crate::retry::RetryPolicy;

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound for one operation.
    pub query_timeout: Duration,

    /// Long-poll wait per dequeue.
    pub dequeue_wait: Duration,

    /// Backoff for transient store / queue failures.
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(60),
            dequeue_wait: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// How one delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Committed `succeeded`.
    Succeeded,
    /// Committed `failed`.
    Failed,
    /// The job was already terminal; nothing executed.
    AlreadyTerminal,
    /// No record for the id.
    UnknownJob,
    /// Body could not be decoded.
    Undecodable,
    /// The store refused a transition it should have accepted.
    InvariantViolation,
    /// Transient store failure; left unacknowledged for redelivery.
    Deferred,
}

impl ProcessOutcome {
    /// Everything except `Deferred` is acknowledged.
    pub fn should_ack(self) -> bool {
        !matches!(self, ProcessOutcome::Deferred)
    }
}

pub struct Worker {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    engine: Arc<dyn QueryEngine>,
    catalog: Arc<OperationCatalog>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        engine: Arc<dyn QueryEngine>,
        catalog: Arc<OperationCatalog>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            engine,
            catalog,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process one delivery and acknowledge it unless the outcome is `Deferred`.
    pub async fn process(&self, delivery: Box<dyn Delivery>) -> ProcessOutcome {
        let outcome = self.handle(delivery.body()).await;
        if !outcome.should_ack() {
            tracing::warn!(
                message_id = delivery.message_id(),
                receive_count = delivery.receive_count(),
                "leaving message unacknowledged for redelivery"
            );
            return outcome;
        }
        let message_id = delivery.message_id().to_string();
        if let Err(err) = delivery.ack().await {
            // 期限切れ ack は再配送されるだけ（処理は冪等）
            tracing::warn!(message_id = %message_id, error = %err, "ack failed");
        }
        outcome
    }

    async fn handle(&self, body: &str) -> ProcessOutcome {
        let message = match DispatchMessage::decode(body) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "undecodable dispatch message, dropping");
                return ProcessOutcome::Undecodable;
            }
        };
        let id = &message.id;
        let retry = &self.config.retry;

        let record = match retry.run("job_store.get", || self.store.get(id)).await {
            Ok(record) => record,
            Err(err) => return self.store_failure(&err),
        };
        if record.is_terminal() {
            tracing::info!(job_id = %id, status = %record.status(), "job already terminal, skipping");
            return ProcessOutcome::AlreadyTerminal;
        }
        if message.params != record.params {
            tracing::warn!(job_id = %id, "message params differ from the stored job, using stored params");
        }

        let now = self.clock.now();
        if let Err(err) = retry
            .run("job_store.mark_running", || self.store.mark_running(id, now))
            .await
        {
            return self.store_failure(&err);
        }
        tracing::info!(job_id = %id, "job running");

        let outcome = match self.execute(&record).await {
            Ok(result) => TerminalOutcome::Succeeded(result),
            Err(err) => {
                tracing::warn!(job_id = %id, error = %err, "job failed");
                TerminalOutcome::Failed(err.to_string())
            }
        };
        let mut succeeded = matches!(outcome, TerminalOutcome::Succeeded(_));

        let now = self.clock.now();
        let mut committed = retry
            .run("job_store.update_terminal", || {
                self.store.update_terminal(id, outcome.clone(), now)
            })
            .await;
        // 結果を保存できないなら failed で終端にする（running のまま残さない）
        let unstorable = match &committed {
            Err(StoreError::Corrupt { reason, .. }) if succeeded => Some(reason.clone()),
            _ => None,
        };
        if let Some(reason) = unstorable {
            tracing::error!(job_id = %id, reason = %reason, "result could not be stored, failing the job");
            let failed = TerminalOutcome::Failed(format!("result could not be stored: {reason}"));
            succeeded = false;
            committed = retry
                .run("job_store.update_terminal", || {
                    self.store.update_terminal(id, failed.clone(), now)
                })
                .await;
        }
        match committed {
            Ok(_) if succeeded => {
                tracing::info!(job_id = %id, "job succeeded");
                ProcessOutcome::Succeeded
            }
            Ok(_) => ProcessOutcome::Failed,
            Err(err) => self.store_failure(&err),
        }
    }

    /// Run every enabled, recognized operation in name order.
    async fn execute(&self, record: &JobRecord) -> Result<JobResult, BobbinError> {
        let mut result = JobResult::new();
        for name in record.params.enabled() {
            let Some(operation) = self.catalog.get(name) else {
                tracing::debug!(job_id = %record.id, operation = name, "unrecognized operation, skipping");
                continue;
            };
            let timeout = self.config.query_timeout;
            let rows = match tokio::time::timeout(timeout, self.engine.execute(operation)).await {
                Ok(Ok(rows)) => rows,
                Ok(Err(source)) => {
                    return Err(BobbinError::OperationExecution {
                        operation: name.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    return Err(BobbinError::OperationExecution {
                        operation: name.to_string(),
                        source: QueryError::Timeout(timeout),
                    });
                }
            };
            tracing::debug!(job_id = %record.id, operation = name, rows = rows.len(), "operation done");
            result.insert(name.to_string(), rows);
        }
        Ok(result)
    }

    fn store_failure(&self, err: &StoreError) -> ProcessOutcome {
        match err {
            StoreError::NotFound(id) => {
                tracing::warn!(job_id = %id, "no job record for message, dropping");
                ProcessOutcome::UnknownJob
            }
            StoreError::Unavailable(_) => {
                tracing::warn!(error = %err, "job store unavailable");
                ProcessOutcome::Deferred
            }
            // 他の配送が先に終端にした
            StoreError::Transition {
                id,
                source: TransitionError::Regression { from, .. },
            } => {
                tracing::info!(job_id = %id, status = %from, "job finished elsewhere, skipping");
                ProcessOutcome::AlreadyTerminal
            }
            StoreError::Transition {
                source: TransitionError::Conflict { .. },
                ..
            }
            | StoreError::Corrupt { .. } => {
                tracing::error!(error = %err, "invariant violation");
                ProcessOutcome::InvariantViolation
            }
        }
    }

    /// Dequeue and process until shutdown is signalled.
    ///
    /// In-flight processing is not cancelled; the loop only stops taking new
    /// deliveries.
    pub async fn run(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(worker_id, "worker started");
        let mut failures = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }

            // dequeue は待つ可能性があるので select で shutdown と競合させる
            let dequeued = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                dequeued = self.queue.dequeue(self.config.dequeue_wait) => dequeued,
            };

            match dequeued {
                Ok(Some(delivery)) => {
                    failures = 0;
                    let outcome = self.process(delivery).await;
                    tracing::debug!(worker_id, ?outcome, "delivery processed");
                }
                Ok(None) => failures = 0,
                Err(err) => {
                    failures += 1;
                    let delay = self.config.retry.next_delay(failures);
                    tracing::warn!(worker_id, error = %err, delay_ms = delay.as_millis() as u64, "dequeue failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
        tracing::debug!(worker_id, "worker stopped");
    }
}
