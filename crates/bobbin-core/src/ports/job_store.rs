//! JobStore port - ジョブレコードの正本（source of truth）
//!
//! JobStore は以下を保証します：
//! - 作成は id について冪等（既存レコードは変更しない）
//! - 終端遷移（succeeded + result / failed + error）は単一の原子的操作
//! - 終端状態からの遷移はしない（同一内容の再適用は no-op、異なる内容は衝突）
//!
//! # 実装
//! - `InMemoryJobStore`（impls）: 開発・テスト用

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{JobId, JobRecord, StoreError, TerminalOutcome, Transition};

/// What `create` found.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// The record was inserted.
    Created,
    /// A record with this id already existed and was left as is.
    Existing(JobRecord),
}

/// Durable mapping job id -> job record.
///
/// Implementations must be safe for concurrent use by many producers,
/// workers and sweepers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert `record` unless a record with the same id exists.
    async fn create(&self, record: JobRecord) -> Result<CreateOutcome, StoreError>;

    /// Current record, or `StoreError::NotFound`.
    async fn get(&self, id: &JobId) -> Result<JobRecord, StoreError>;

    /// Queued -> Running. A no-op on a running record; a terminal record
    /// yields `StoreError::Transition` with a regression.
    async fn mark_running(&self, id: &JobId, now: DateTime<Utc>)
    -> Result<Transition, StoreError>;

    /// Atomically commit the terminal status with its payload.
    async fn update_terminal(
        &self,
        id: &JobId,
        outcome: TerminalOutcome,
        now: DateTime<Utc>,
    ) -> Result<Transition, StoreError>;

    /// Queued records with `updated_at <= cutoff`, oldest first.
    async fn list_stale_queued(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// Compare-and-set used by the reconciliation sweep: bump `updated_at` to
    /// `now` only if the record is still queued and unchanged since it was
    /// observed. `updated_at` always moves past the observed value, even when
    /// `now` lags it. Returns whether this caller won the claim.
    async fn claim_stale(
        &self,
        id: &JobId,
        observed_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
