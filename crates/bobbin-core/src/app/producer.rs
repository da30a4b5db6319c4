//! Producer - ジョブ投入
//!
//! # フロー
//! 1. job id を決める（指定がなければ生成）
//! 2. `queued` の初期レコードを作る
//! 3. JobStore::create（冪等）
//! 4. WorkQueue::enqueue({id, params})
//! 5. `{id, status}` を返す
//!
//! 3 が失敗したら enqueue しない。3 成功 / 4 失敗のすき間は
//! Reconciler の定期スイープが埋める（ここではエラーにしない）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{BobbinError, DispatchMessage, JobId, JobParams, JobRecord, JobStatus};
use crate::ports::{Clock, CreateOutcome, IdGenerator, JobStore, WorkQueue};
use crate::retry::RetryPolicy;

/// A job submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Client-chosen id. Absent or empty means "generate one".
    #[serde(default, alias = "job_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "crate::domain::params::nullable")]
    pub params: JobParams,
}

impl SubmitRequest {
    pub fn new(params: JobParams) -> Self {
        Self { id: None, params }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// What the caller gets back from `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub id: JobId,
    pub status: JobStatus,
}

pub struct Producer {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    retry: RetryPolicy,
}

impl Producer {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            ids,
            retry,
        }
    }

    /// Register a job and dispatch it.
    ///
    /// Resubmitting the same id with the same params is accepted without a
    /// second dispatch and reports the job's current status. The same id with
    /// different params is `IdConflict`.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, BobbinError> {
        let id = match request.id.as_deref().filter(|raw| !raw.is_empty()) {
            Some(raw) => JobId::parse(raw)?,
            None => self.ids.generate_job_id(),
        };
        // ストアから戻る形に揃えてから比較・保存する
        let params = request.params.canonical();

        let record = JobRecord::queued(id.clone(), params, self.clock.now());
        let created = self
            .retry
            .run("job_store.create", || self.store.create(record.clone()))
            .await?;

        match created {
            CreateOutcome::Existing(existing) => {
                if existing.params != record.params {
                    tracing::info!(job_id = %id, "job id reused with different params");
                    return Err(BobbinError::IdConflict(id));
                }
                tracing::info!(
                    job_id = %id,
                    status = %existing.status(),
                    "job already submitted, not dispatching again"
                );
                Ok(SubmitReceipt {
                    id,
                    status: existing.status(),
                })
            }
            CreateOutcome::Created => {
                let message = DispatchMessage::new(id.clone(), record.params);
                match self
                    .retry
                    .run("work_queue.enqueue", || self.queue.enqueue(&message))
                    .await
                {
                    Ok(()) => tracing::info!(job_id = %id, "job submitted"),
                    // レコードは durable。Reconciler が後で再送する
                    Err(err) => tracing::warn!(
                        job_id = %id,
                        error = %err,
                        "job stored but dispatch failed; leaving it to the reconciler"
                    ),
                }
                Ok(SubmitReceipt {
                    id,
                    status: JobStatus::Queued,
                })
            }
        }
    }
}
