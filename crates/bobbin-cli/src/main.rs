//! bobbin: HTTP job service over the in-memory adapters.
//!
//! 起動順: config → tracing → catalog / fixtures → AppBuilder（fail-fast 検証）
//! → worker pool + reconcile loop → HTTP。Ctrl-C で HTTP を閉じ、
//! 処理中の配送が終わるのを待ってから終了します。

mod api;
mod catalog;
mod config;

use std::sync::Arc;

use anyhow::Context;
use bobbin_core::app::{AppBuilder, ReconcileConfig, WorkerConfig};
use bobbin_core::impls::{FixtureQueryEngine, InMemoryJobStore, InMemoryWorkQueue, QueueConfig};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_json);

    let catalog = match &config.catalog_path {
        Some(path) => catalog::load_catalog(path)?,
        None => catalog::builtin_catalog()?,
    };
    let (engine, fixture_ops) = match &config.fixtures_path {
        Some(path) => catalog::load_fixtures(path)?,
        None => (FixtureQueryEngine::new(), Vec::new()),
    };
    let expected: Vec<&str> = fixture_ops.iter().map(String::as_str).collect();

    let app = AppBuilder::new()
        .store(Arc::new(InMemoryJobStore::new()))
        .queue(Arc::new(InMemoryWorkQueue::new(QueueConfig {
            visibility_timeout: config.visibility_timeout,
            max_receive_count: config.max_receive_count,
        })))
        .engine(Arc::new(engine))
        .catalog(catalog)
        .expect_operations(&expected)
        .worker_config(WorkerConfig {
            query_timeout: config.query_timeout,
            ..WorkerConfig::default()
        })
        .reconcile_config(ReconcileConfig {
            interval: config.reconcile_interval,
            stale_after: config.stale_after,
            ..ReconcileConfig::default()
        })
        .build()
        .context("wiring the application")?;

    tracing::info!(
        bind = %config.bind,
        workers = config.workers,
        operations = ?app.catalog.names().collect::<Vec<_>>(),
        "bobbin starting"
    );

    let background = app.start(config.workers);
    let router = api::router(api::ApiState::new(&app));
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    tracing::info!("http server stopped, draining workers");
    background.shutdown().await;
    Ok(())
}

/// `RUST_LOG` filter (default `info`), optionally as JSON lines.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
