//! Status - ジョブ状態の読み出し
//!
//! 作成後ならいつでも読める独立した読み取り経路です。
//! 数値の正規化はストア側（`impls::item`）で済んでいるので、ここでは射影するだけ。

use std::sync::Arc;

use crate::domain::{BobbinError, JobId, JobView, ValidationError};
use crate::ports::JobStore;
use crate::retry::RetryPolicy;

pub struct StatusReader {
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
}

impl StatusReader {
    pub fn new(store: Arc<dyn JobStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Client-safe view of job `id`.
    ///
    /// An empty id is a validation error. Any other id that could never have
    /// been stored is simply not found.
    pub async fn get_status(&self, id: &str) -> Result<JobView, BobbinError> {
        if id.is_empty() {
            return Err(ValidationError::new("id", "must not be empty").into());
        }
        let id = JobId::parse(id).map_err(|_| BobbinError::NotFound(id.to_string()))?;
        let record = self
            .retry
            .run("job_store.get", || self.store.get(&id))
            .await?;
        Ok(JobView::from(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobParams, JobRecord, JobResult, JobStatus, Row, TerminalOutcome};
    use crate::impls::InMemoryJobStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn reader(store: Arc<InMemoryJobStore>) -> StatusReader {
        StatusReader::new(store, RetryPolicy::none())
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = Arc::new(InMemoryJobStore::new());
        let err = reader(store).get_status("missing").await.unwrap_err();
        assert!(matches!(err, BobbinError::NotFound(_)));
    }

    #[rstest::rstest]
    #[case::whitespace("a b")]
    #[case::slash("a/b")]
    #[tokio::test]
    async fn id_that_cannot_exist_is_not_found(#[case] id: &str) {
        let store = Arc::new(InMemoryJobStore::new());
        let err = reader(store).get_status(id).await.unwrap_err();
        assert!(matches!(err, BobbinError::NotFound(ref got) if got == id));
    }

    #[tokio::test]
    async fn missing_id_is_a_validation_error() {
        let store = Arc::new(InMemoryJobStore::new());
        let err = reader(store).get_status("").await.unwrap_err();
        assert!(matches!(err, BobbinError::Validation(_)));
    }

    #[tokio::test]
    async fn succeeded_job_exposes_result_with_plain_numbers() {
        let store = Arc::new(InMemoryJobStore::new());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let id = JobId::parse("job-9").unwrap();
        store
            .create(JobRecord::queued(
                id.clone(),
                JobParams::new().with("sql_2", "true"),
                now,
            ))
            .await
            .unwrap();

        let mut row = Row::new();
        row.insert("total_objects".into(), json!(40));
        row.insert("pct_within_split".into(), json!(0.8));
        let result = JobResult::from([("sql_2".to_string(), vec![row])]);
        store
            .update_terminal(&id, TerminalOutcome::Succeeded(result), now)
            .await
            .unwrap();

        let view = reader(store).get_status("job-9").await.unwrap();
        assert_eq!(view.status, JobStatus::Succeeded);
        assert_eq!(view.created_at, now.timestamp());
        assert!(view.error.is_none());

        let body = serde_json::to_value(&view).unwrap();
        assert_eq!(body["result"]["sql_2"][0]["total_objects"], json!(40));
        assert_eq!(body["result"]["sql_2"][0]["pct_within_split"], json!(0.8));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn failed_job_exposes_error_only() {
        let store = Arc::new(InMemoryJobStore::new());
        let now = Utc::now();
        let id = JobId::parse("job-f").unwrap();
        store
            .create(JobRecord::queued(id.clone(), JobParams::new(), now))
            .await
            .unwrap();
        store
            .update_terminal(&id, TerminalOutcome::Failed("boom".into()), now)
            .await
            .unwrap();

        let view = reader(store).get_status("job-f").await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("boom"));
        assert!(view.result.is_none());
    }
}
