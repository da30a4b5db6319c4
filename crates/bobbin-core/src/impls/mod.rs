//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryJobStore**: Decimal 属性マップで保持するジョブストア
//! - **InMemoryWorkQueue**: visibility timeout / dead-letter 付きの配送キュー
//! - **FixtureQueryEngine**: 固定の行を返すクエリエンジン
//! - **item**: ストア表現 <-> JSON の変換（数値の正規化はここだけ）

pub mod fixture_engine;
pub mod inmem_queue;
pub mod inmem_store;
pub mod item;

pub use self::fixture_engine::FixtureQueryEngine;
pub use self::inmem_queue::{DeadLetter, InMemoryWorkQueue, QueueConfig, QueueDepth};
pub use self::inmem_store::InMemoryJobStore;
