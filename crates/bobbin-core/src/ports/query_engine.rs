//! QueryEngine port - 外部クエリエンジン（Athena 相当）
//!
//! 最も遅い境界（数十秒かかりうる）。タイムアウトは worker 側で強制します。

use async_trait::async_trait;

use crate::domain::{Operation, QueryError, Row};

/// Executes one named operation and returns its rows.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(&self, operation: &Operation) -> Result<Vec<Row>, QueryError>;
}
