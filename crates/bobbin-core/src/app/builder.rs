//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 方針
//! - ports はすべて起動時に明示的に注入（グローバル状態なし）
//! - 起動時検証（Fail-fast）: 必須 port の欠落・期待する操作の未登録は build() で失敗
//! - Clock / IdGenerator / RetryPolicy には本番向けのデフォルトがある

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::app::catalog::{CatalogError, OperationCatalog};
use crate::app::producer::Producer;
use crate::app::reconciler::{ReconcileConfig, ReconcileLoop, Reconciler};
use crate::app::status::StatusReader;
use crate::app::worker::{Worker, WorkerConfig};
use crate::app::worker_pool::WorkerPool;
use crate::ports::{Clock, IdGenerator, JobStore, QueryEngine, SystemClock, UlidGenerator, WorkQueue};
use crate::retry::RetryPolicy;

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .store(store)
///     .queue(queue)
///     .engine(engine)
///     .register_operation("sql_1", SQL_1)?
///     .expect_operations(&["sql_1"])
///     .build()?;
/// ```
pub struct AppBuilder {
    store: Option<Arc<dyn JobStore>>,
    queue: Option<Arc<dyn WorkQueue>>,
    engine: Option<Arc<dyn QueryEngine>>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    catalog: OperationCatalog,
    expected_operations: Option<Vec<String>>,
    worker: WorkerConfig,
    reconcile: ReconcileConfig,
    retry: RetryPolicy,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing {0}: it must be provided before build()")]
    MissingPort(&'static str),

    #[error("missing operations: {0:?}. These operations were expected but not registered.")]
    MissingOperations(Vec<String>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            queue: None,
            engine: None,
            clock: Arc::new(SystemClock),
            ids: None,
            catalog: OperationCatalog::new(),
            expected_operations: None,
            worker: WorkerConfig::default(),
            reconcile: ReconcileConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to a `UlidGenerator` over the builder's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Replace the whole catalog.
    pub fn catalog(mut self, catalog: OperationCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn register_operation(
        mut self,
        name: impl Into<String>,
        query: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        self.catalog.register(name, query)?;
        Ok(self)
    }

    /// Operation names that must be registered for `build()` to succeed.
    pub fn expect_operations(mut self, names: &[&str]) -> Self {
        self.expected_operations = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker = config;
        self
    }

    pub fn reconcile_config(mut self, config: ReconcileConfig) -> Self {
        self.reconcile = config;
        self
    }

    /// Backoff used by the producer, status reader and reconciler.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// # 検証
    /// - store / queue / engine が設定されているか
    /// - expect_operations() で設定された操作が全て登録されているか
    pub fn build(self) -> Result<App, BuildError> {
        if let Some(expected) = &self.expected_operations {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.catalog.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingOperations(missing));
            }
        }
        let store = self.store.ok_or(BuildError::MissingPort("job store"))?;
        let queue = self.queue.ok_or(BuildError::MissingPort("work queue"))?;
        let engine = self.engine.ok_or(BuildError::MissingPort("query engine"))?;
        let clock = self.clock;
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(ClockHandle(Arc::clone(&clock)))),
        };
        let catalog = Arc::new(self.catalog);

        Ok(App {
            producer: Arc::new(Producer::new(
                Arc::clone(&store),
                Arc::clone(&queue),
                Arc::clone(&clock),
                ids,
                self.retry.clone(),
            )),
            status: Arc::new(StatusReader::new(Arc::clone(&store), self.retry.clone())),
            worker: Arc::new(Worker::new(
                Arc::clone(&store),
                Arc::clone(&queue),
                engine,
                Arc::clone(&catalog),
                Arc::clone(&clock),
                self.worker,
            )),
            reconciler: Arc::new(Reconciler::new(
                store,
                queue,
                clock,
                self.reconcile,
                self.retry,
            )),
            catalog,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets a shared `Arc<dyn Clock>` drive a generic `UlidGenerator`.
struct ClockHandle(Arc<dyn Clock>);

impl Clock for ClockHandle {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.0.now()
    }
}

/// The wired application: one handle per component.
pub struct App {
    pub producer: Arc<Producer>,
    pub status: Arc<StatusReader>,
    pub worker: Arc<Worker>,
    pub reconciler: Arc<Reconciler>,
    pub catalog: Arc<OperationCatalog>,
}

impl App {
    /// Spawn `workers` worker loops plus the reconcile loop, sharing one
    /// shutdown signal.
    pub fn start(&self, workers: usize) -> Background {
        let pool = WorkerPool::spawn(workers, Arc::clone(&self.worker));
        let reconcile = tokio::spawn(
            ReconcileLoop::new(Arc::clone(&self.reconciler)).run(pool.shutdown_signal()),
        );
        Background { pool, reconcile }
    }
}

/// Handles of the background loops started by `App::start`.
pub struct Background {
    pool: WorkerPool,
    reconcile: JoinHandle<()>,
}

impl Background {
    /// Stop taking new work and wait for in-flight deliveries to finish.
    pub async fn shutdown(self) {
        self.pool.shutdown_and_join().await;
        if let Err(err) = self.reconcile.await {
            tracing::error!(error = %err, "reconcile loop panicked");
        }
    }
}
