//! Interpolation worker binary.

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tween_queue::InterpolationQueue;
use tween_worker::{
    build_interpolator, metrics, FrameLimits, InferenceService, TaskExecutor, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for rediss:// brokers)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("tween=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting tween-worker");

    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::init_metrics(port)?;
        info!("Serving metrics on port {}", port);
    }

    let queue = InterpolationQueue::from_env().context("Failed to create task queue")?;
    let interpolator = build_interpolator(&config)?;
    let inference = InferenceService::spawn(
        interpolator,
        FrameLimits {
            max_width: config.max_width,
            max_height: config.max_height,
        },
    )
    .context("Failed to start inference thread")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    TaskExecutor::new(config, queue, inference)
        .run(shutdown_rx)
        .await?;

    info!("Worker shutdown complete");
    Ok(())
}
