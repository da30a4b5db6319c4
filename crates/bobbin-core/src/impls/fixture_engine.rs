//! FixtureQueryEngine - 固定の行を返すクエリエンジン
//!
//! 操作名ごとに「返す行」「失敗」「遅延」を設定できます。
//! 設定のない操作は空の行を返します。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Operation, QueryError, Row};
use crate::ports::QueryEngine;

#[derive(Debug, Clone, Default)]
struct Fixture {
    rows: Vec<Row>,
    failure: Option<String>,
    delay: Option<Duration>,
}

/// Query engine backed by canned rows.
#[derive(Default)]
pub struct FixtureQueryEngine {
    fixtures: Mutex<HashMap<String, Fixture>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FixtureQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{"op_name": [ {row}, ... ], ...}`.
    pub fn from_json(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::Execution(
                "fixtures must be an object of operation -> rows".into(),
            ));
        };
        let engine = Self::new();
        for (name, rows) in map {
            let rows: Vec<Row> = serde_json::from_value(rows.clone()).map_err(|e| {
                QueryError::Execution(format!("fixture rows for {name} are invalid: {e}"))
            })?;
            engine.set_rows(name, rows);
        }
        Ok(engine)
    }

    pub fn with_rows(self, operation: &str, rows: Vec<Row>) -> Self {
        self.set_rows(operation, rows);
        self
    }

    pub fn with_failure(self, operation: &str, message: impl Into<String>) -> Self {
        self.update(operation, |f| f.failure = Some(message.into()));
        self
    }

    pub fn with_delay(self, operation: &str, delay: Duration) -> Self {
        self.update(operation, |f| f.delay = Some(delay));
        self
    }

    pub fn set_rows(&self, operation: &str, rows: Vec<Row>) {
        self.update(operation, |f| f.rows = rows);
    }

    /// How many times `operation` has been executed.
    pub fn calls(&self, operation: &str) -> u32 {
        self.calls
            .lock()
            .map(|c| c.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().map(|c| c.values().sum()).unwrap_or(0)
    }

    fn update(&self, operation: &str, f: impl FnOnce(&mut Fixture)) {
        if let Ok(mut fixtures) = self.fixtures.lock() {
            f(fixtures.entry(operation.to_string()).or_default());
        }
    }
}

#[async_trait]
impl QueryEngine for FixtureQueryEngine {
    async fn execute(&self, operation: &Operation) -> Result<Vec<Row>, QueryError> {
        let name = operation.name().as_str();
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(name.to_string()).or_insert(0) += 1;
        }
        // ロックは await をまたがない
        let fixture = self
            .fixtures
            .lock()
            .map_err(|_| QueryError::Execution("fixture table is poisoned".into()))?
            .get(name)
            .cloned()
            .unwrap_or_default();

        if let Some(delay) = fixture.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = fixture.failure {
            return Err(QueryError::Execution(message));
        }
        tracing::debug!(operation = name, rows = fixture.rows.len(), "fixture query executed");
        Ok(fixture.rows)
    }
}
