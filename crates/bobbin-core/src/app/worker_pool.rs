use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::worker::Worker;

/// Worker pool handle.
/// - `request_shutdown` でワーカー全体が新しい配送を取らなくなる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
/// - `shutdown_signal()` で同じ停止シグナルを他のループ（Reconciler）にも配れる
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers sharing one `Worker`.
    pub fn spawn(n: usize, worker: Arc<Worker>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let worker = Arc::clone(&worker);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                worker.run(worker_id, rx).await;
            }));
        }
        tracing::info!(workers = n, "worker pool started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// A receiver that flips to `true` when the pool is asked to stop.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Request shutdown for all workers.
    /// In-flight processing is not cancelled; workers just stop taking new
    /// deliveries.
    pub fn request_shutdown(&self) {
        // send を受け取る側がもういなくても構わない
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker task panicked");
            }
        }
        tracing::info!("worker pool stopped");
    }
}
