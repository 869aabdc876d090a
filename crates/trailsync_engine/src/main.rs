use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use trailsync_engine::EngineConfig;
use trailsync_engine::coordinator::{SyncCoordinator, SyncOutcome, SyncReport, SyncSettings};
use trailsync_engine::error::{SyncError, SyncResult};
use trailsync_engine::repository::{SqliteWatermarkStore, SqliteWorkoutRepository};
use trailsync_provider::config::Config as ProviderConfig;
use trailsync_provider::http_client::ReqwestHealthProvider;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configure logging from env var `TRAILSYNC_LOG_LEVEL` (or fallback to `RUST_LOG`, default `info`).
    let log_env = std::env::var("TRAILSYNC_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    let env_filter = tracing_subscriber::EnvFilter::try_new(&log_env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // tracing goes to stderr; stdout carries the JSON pass reports
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    tracing::info!("trailsync: log filter: {}", log_env);

    let provider_cfg = ProviderConfig::from_env()?;
    let engine_cfg = EngineConfig::from_env()?;

    let provider = ReqwestHealthProvider::with_timeout(
        &provider_cfg.base_url,
        provider_cfg.user_id.clone(),
        provider_cfg.api_key.clone(),
        engine_cfg.provider_timeout,
    );
    let repository = SqliteWorkoutRepository::open(&engine_cfg.db_path)?;
    let watermarks = SqliteWatermarkStore::open(&engine_cfg.db_path)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut shutdown_rx = cancel_rx.clone();

    let mut coordinator = SyncCoordinator::new(
        Arc::new(provider),
        Box::new(repository),
        Box::new(watermarks),
        SyncSettings::from(&engine_cfg),
        cancel_rx,
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested, cancelling sync");
            let _ = cancel_tx.send(true);
        }
    });

    let report = match run_once(&mut coordinator, engine_cfg.sync_interval).await {
        Ok(report) => report,
        Err(SyncError::Cancelled) => {
            tracing::info!("sync cancelled before completion");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}", serde_json::to_string(&report)?);

    if std::env::args().any(|a| a == "--watch") {
        tracing::info!(
            interval_secs = engine_cfg.sync_interval.as_secs(),
            "entering watch mode"
        );
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(engine_cfg.sync_interval) => {
                    match coordinator.incremental_sync(engine_cfg.sync_interval).await {
                        Ok(report) => {
                            if report.outcome == SyncOutcome::Completed {
                                println!("{}", serde_json::to_string(&report)?);
                            }
                        }
                        Err(SyncError::Cancelled) => break,
                        Err(e) => tracing::error!(error = %e, "sync pass failed"),
                    }
                }
            }
        }
        tracing::info!("watch mode stopped");
    }

    Ok(())
}

/// One full cycle: backfill when the store is empty, otherwise an
/// incremental pass against the watermark.
async fn run_once(
    coordinator: &mut SyncCoordinator,
    interval: Duration,
) -> SyncResult<SyncReport> {
    let report = coordinator.initial_sync().await?;
    if report.outcome == SyncOutcome::AlreadyPopulated {
        return coordinator.incremental_sync(interval).await;
    }
    Ok(report)
}
