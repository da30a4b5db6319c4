//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Producer**: ジョブ投入（create → enqueue）
//! - **Worker / WorkerPool**: 配送メッセージの処理（get → running → 実行 → 終端 → ack）
//! - **StatusReader**: ジョブ状態の読み出し
//! - **Reconciler / ReconcileLoop**: queued のまま止まったジョブの再配送
//! - **OperationCatalog**: 認識する操作名とクエリ本文

pub mod builder;
pub mod catalog;
pub mod producer;
pub mod reconciler;
pub mod status;
pub mod worker;
pub mod worker_pool;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder, Background, BuildError};
pub use self::catalog::{CatalogError, OperationCatalog};
pub use self::producer::{Producer, SubmitReceipt, SubmitRequest};
pub use self::reconciler::{ReconcileConfig, ReconcileLoop, ReconcileReport, Reconciler};
pub use self::status::StatusReader;
pub use self::worker::{ProcessOutcome, Worker, WorkerConfig};
pub use self::worker_pool::WorkerPool;
