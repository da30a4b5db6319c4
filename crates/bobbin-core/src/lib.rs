//! bobbin-core
//!
//! Core building blocks for the Bobbin job service: submit a job, process it
//! asynchronously against a query engine, read its status.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, params, job record, dispatch message, errors）
//! - **ports**: 抽象化レイヤー（JobStore, WorkQueue, QueryEngine, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryJobStore, InMemoryWorkQueue, FixtureQueryEngine）
//! - **app**: アプリケーションロジック（producer, worker, status, reconciler, builder）
//! - **retry**: 一時障害のバックオフ

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod retry;
