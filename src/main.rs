//! OpenRouter Proxy - Main entry point
//!
//! This binary loads configuration from the environment and serves the proxy
//! routes until terminated.

use anyhow::Result;
use openrouter_proxy::{
    build_router,
    core::{init_metrics, init_tracing},
    AppConfig, AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    // Detect optimal worker threads from environment or cgroup
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| {
            pick_worker_threads(
                detect_cpu_limit(),
                std::thread::available_parallelism().ok().map(|n| n.get()),
            )
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> Result<()> {
    init_tracing();
    init_metrics();

    let config = AppConfig::from_env()?;
    tracing::info!(worker_threads, "Tokio runtime started");
    tracing::debug!(config = ?config, "Loaded configuration");

    if config.upstream.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; chat completions will be rejected");
    }
    if let Some(path) = &config.model_filter_file {
        tracing::info!(path = %path.display(), "Model allow-list enabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = Arc::new(AppState::new(config)?);
    let app = build_router(state);

    tracing::info!("Starting OpenRouter proxy on {}", addr);
    tracing::info!("OpenAI API: /v1/chat/completions, /v1/models");
    tracing::info!("Diagnostics: /health, /test-connection, /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// A cgroup quota wins; a host without one uses every available core.
fn pick_worker_threads(cgroup_limit: Option<usize>, available: Option<usize>) -> usize {
    cgroup_limit.or(available).unwrap_or(1).max(1)
}

/// CPU quota from cgroup v2, falling back to v1.
fn detect_cpu_limit() -> Option<usize> {
    if let Ok(max) = std::fs::read_to_string("/sys/fs/cgroup/cpu.max") {
        let parts: Vec<&str> = max.split_whitespace().collect();
        if let [quota, period] = parts.as_slice() {
            if let (Ok(quota), Ok(period)) = (quota.parse::<i64>(), period.parse::<i64>()) {
                if quota > 0 && period > 0 {
                    return Some(((quota as f64 / period as f64).ceil() as usize).max(1));
                }
            }
        }
    }

    let read = |path: &str| -> Option<i64> {
        std::fs::read_to_string(path).ok()?.trim().parse::<i64>().ok()
    };
    let quota = read("/sys/fs/cgroup/cpu/cpu.cfs_quota_us")?;
    let period = read("/sys/fs/cgroup/cpu/cpu.cfs_period_us")?;

    if quota > 0 && period > 0 {
        Some(((quota as f64 / period as f64).ceil() as usize).max(1))
    } else {
        None
    }
}
