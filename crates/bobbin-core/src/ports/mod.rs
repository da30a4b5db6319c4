//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ジョブストア、キュー、クエリエンジン）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - JobStore が正本（source of truth）
//! - WorkQueue は配送のみ（ジョブの存在判定には使わない）
//! - すべて起動時に明示的に構築して注入する（グローバル状態を持たない）

pub mod clock;
pub mod id_generator;
pub mod job_store;
pub mod query_engine;
pub mod work_queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{CreateOutcome, JobStore};
pub use self::query_engine::QueryEngine;
pub use self::work_queue::{Delivery, WorkQueue};
