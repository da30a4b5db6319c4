//! InMemoryJobStore - 開発・テスト用のジョブストア
//!
//! レコードは `Item`（Decimal の数値を持つ属性マップ）として保持し、
//! 読み出しのたびに `item::decode_record` で正規化します。
//! すべての条件付き更新は 1 回のロック内で read-modify-write します。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use super::item::{Item, decode_record, encode_record, stored_form};
use crate::domain::{JobId, JobRecord, JobStatus, StoreError, TerminalOutcome, Transition};
use crate::ports::{CreateOutcome, JobStore};

/// In-memory job store.
#[derive(Default)]
pub struct InMemoryJobStore {
    items: Mutex<HashMap<JobId, Item>>,
    /// Simulated outage: every call fails with `Unavailable` while set.
    unavailable: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle a simulated outage.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    /// Read-modify-write one record under the lock.
    async fn modify<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut JobRecord) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_available()?;
        let mut items = self.items.lock().await;
        let item = items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut record = decode_record(id, item)?;
        let out = f(&mut record)?;
        *item = encode_record(&record)?;
        Ok(out)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, record: JobRecord) -> Result<CreateOutcome, StoreError> {
        self.check_available()?;
        let encoded = encode_record(&record)?;
        let mut items = self.items.lock().await;
        if let Some(existing) = items.get(&record.id) {
            return Ok(CreateOutcome::Existing(decode_record(&record.id, existing)?));
        }
        items.insert(record.id, encoded);
        Ok(CreateOutcome::Created)
    }

    async fn get(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        self.check_available()?;
        let items = self.items.lock().await;
        let item = items
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        decode_record(id, item)
    }

    async fn mark_running(
        &self,
        id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        self.modify(id, |record| {
            record.start(now).map_err(|source| StoreError::Transition {
                id: id.clone(),
                source,
            })
        })
        .await
    }

    async fn update_terminal(
        &self,
        id: &JobId,
        outcome: TerminalOutcome,
        now: DateTime<Utc>,
    ) -> Result<Transition, StoreError> {
        // 保存済みの結果とは保存後の形で比べる（1.0 は 1 として戻る）
        let outcome = outcome_stored_form(id, outcome)?;
        self.modify(id, |record| {
            record
                .finish(outcome, now)
                .map_err(|source| StoreError::Transition {
                    id: id.clone(),
                    source,
                })
        })
        .await
    }

    async fn list_stale_queued(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        self.check_available()?;
        let items = self.items.lock().await;
        let mut stale = Vec::new();
        for (id, item) in items.iter() {
            let record = decode_record(id, item)?;
            if record.status() == JobStatus::Queued && record.updated_at <= cutoff {
                stale.push(record);
            }
        }
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        stale.truncate(limit);
        Ok(stale)
    }

    async fn claim_stale(
        &self,
        id: &JobId,
        observed_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.modify(id, |record| {
            if record.status() != JobStatus::Queued || record.updated_at != observed_updated_at {
                return Ok(false);
            }
            // 時計がずれていても updated_at は必ず進める
            record.touch(now.max(observed_updated_at + TimeDelta::milliseconds(1)));
            Ok(true)
        })
        .await
    }
}

fn outcome_stored_form(id: &JobId, outcome: TerminalOutcome) -> Result<TerminalOutcome, StoreError> {
    let TerminalOutcome::Succeeded(result) = outcome else {
        return Ok(outcome);
    };
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };
    let value = serde_json::to_value(&result).map_err(|e| corrupt(e.to_string()))?;
    let value = stored_form(&value).map_err(corrupt)?;
    let result = serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
    Ok(TerminalOutcome::Succeeded(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobParams, JobResult, TransitionError};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn queued(id: &str, at: DateTime<Utc>) -> JobRecord {
        JobRecord::queued(JobId::parse(id).unwrap(), JobParams::new().with("op_a", true), at)
    }

    #[tokio::test]
    async fn create_is_idempotent_and_never_mutates() {
        let store = InMemoryJobStore::new();
        let first = queued("a", t0());
        assert_eq!(store.create(first.clone()).await.unwrap(), CreateOutcome::Created);

        store.mark_running(&first.id, t0()).await.unwrap();

        let again = store.create(queued("a", t0() + Duration::seconds(9))).await.unwrap();
        let CreateOutcome::Existing(existing) = again else {
            panic!("expected existing record");
        };
        assert_eq!(existing.status(), JobStatus::Running);
        assert_eq!(existing.created_at, t0());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store.get(&JobId::parse("nope").unwrap()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn terminal_update_is_atomic_and_idempotent() {
        let store = InMemoryJobStore::new();
        let record = queued("a", t0());
        store.create(record.clone()).await.unwrap();
        store.mark_running(&record.id, t0()).await.unwrap();

        let result = JobResult::from([("op_a".to_string(), vec![])]);
        let first = store
            .update_terminal(&record.id, TerminalOutcome::Succeeded(result.clone()), t0())
            .await
            .unwrap();
        assert_eq!(first, Transition::Applied);

        let second = store
            .update_terminal(&record.id, TerminalOutcome::Succeeded(result.clone()), t0())
            .await
            .unwrap();
        assert_eq!(second, Transition::Unchanged);

        let stored = store.get(&record.id).await.unwrap();
        assert_eq!(stored.result(), Some(&result));
    }

    fn rows(value: serde_json::Value) -> JobResult {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn repeating_a_result_with_whole_floats_is_unchanged() {
        let store = InMemoryJobStore::new();
        let record = queued("a", t0());
        store.create(record.clone()).await.unwrap();
        let result = rows(serde_json::json!({"op_a": [{"label": "cat", "pct_within_split": 1.0}]}));

        for expected in [Transition::Applied, Transition::Unchanged] {
            let got = store
                .update_terminal(&record.id, TerminalOutcome::Succeeded(result.clone()), t0())
                .await
                .unwrap();
            assert_eq!(got, expected);
        }
        let stored = store.get(&record.id).await.unwrap();
        assert_eq!(stored.result().unwrap()["op_a"][0]["pct_within_split"], serde_json::json!(1));
    }

    #[tokio::test]
    async fn numbers_beyond_decimal_range_are_kept() {
        let store = InMemoryJobStore::new();
        let record = JobRecord::queued(
            JobId::parse("big").unwrap(),
            JobParams::new().with("op_a", 1e300),
            t0(),
        );
        store.create(record.clone()).await.unwrap();
        let result = rows(serde_json::json!({"op_a": [{"x": 1e30, "tiny": 1e-30}]}));

        store
            .update_terminal(&record.id, TerminalOutcome::Succeeded(result.clone()), t0())
            .await
            .unwrap();
        let again = store
            .update_terminal(&record.id, TerminalOutcome::Succeeded(result.clone()), t0())
            .await
            .unwrap();
        assert_eq!(again, Transition::Unchanged);

        let stored = store.get(&record.id).await.unwrap();
        assert_eq!(stored.params, record.params);
        assert_eq!(stored.result(), Some(&result));
    }

    #[tokio::test]
    async fn conflicting_terminal_update_is_surfaced() {
        let store = InMemoryJobStore::new();
        let record = queued("a", t0());
        store.create(record.clone()).await.unwrap();
        store
            .update_terminal(&record.id, TerminalOutcome::Failed("boom".into()), t0())
            .await
            .unwrap();

        let err = store
            .update_terminal(&record.id, TerminalOutcome::Succeeded(JobResult::new()), t0())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transition {
                source: TransitionError::Conflict { .. },
                ..
            }
        ));
        assert_eq!(store.get(&record.id).await.unwrap().error(), Some("boom"));
    }

    #[tokio::test]
    async fn stale_queued_jobs_are_listed_oldest_first() {
        let store = InMemoryJobStore::new();
        store.create(queued("new", t0() + Duration::minutes(9))).await.unwrap();
        store.create(queued("old", t0())).await.unwrap();
        store.create(queued("mid", t0() + Duration::minutes(1))).await.unwrap();
        store.create(queued("run", t0())).await.unwrap();
        store
            .mark_running(&JobId::parse("run").unwrap(), t0())
            .await
            .unwrap();

        let stale = store
            .list_stale_queued(t0() + Duration::minutes(5), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = stale.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "mid"]);

        let limited = store
            .list_stale_queued(t0() + Duration::minutes(5), 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn only_one_claim_wins() {
        let store = InMemoryJobStore::new();
        let record = queued("a", t0());
        store.create(record.clone()).await.unwrap();

        let later = t0() + Duration::minutes(5);
        assert!(store.claim_stale(&record.id, t0(), later).await.unwrap());
        assert!(!store.claim_stale(&record.id, t0(), later).await.unwrap());
        assert_eq!(store.get(&record.id).await.unwrap().updated_at, later);
    }

    #[tokio::test]
    async fn claim_advances_updated_at_even_when_the_clock_lags() {
        let store = InMemoryJobStore::new();
        let record = queued("a", t0());
        store.create(record.clone()).await.unwrap();

        // 遅れた時計の sweeper
        let behind = t0() - Duration::seconds(3);
        assert!(store.claim_stale(&record.id, t0(), behind).await.unwrap());
        assert!(!store.claim_stale(&record.id, t0(), behind).await.unwrap());
        assert!(store.get(&record.id).await.unwrap().updated_at > t0());
    }

    #[tokio::test]
    async fn outage_surfaces_as_unavailable() {
        let store = InMemoryJobStore::new();
        store.set_unavailable(true);
        let err = store.create(queued("a", t0())).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        store.set_unavailable(false);
        assert!(store.create(queued("a", t0())).await.is_ok());
    }
}
