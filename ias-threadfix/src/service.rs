//! Service mode: run the sync now, then on a fixed interval until shutdown.
//!
//! Runs are sequential, so a slow run delays the next one instead of
//! overlapping it.
use log::{error, info};
use std::future::Future;
use tokio::signal;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::orchestrator::SyncEngine;
use crate::settings::ExportConfiguration;
use crate::source::{DestinationApi, SourceApi};

/// Run until Ctrl+C. Returns the number of completed sync cycles.
pub async fn run_service<S: SourceApi, D: DestinationApi>(
    engine: &SyncEngine<'_, S, D>,
    configurations: &[ExportConfiguration],
    interval_minutes: u64,
) -> usize {
    info!("Starting ias-threadfix service mode");
    info!("  Interval: {interval_minutes} minutes");
    info!(
        "  Enabled export configurations: {}",
        configurations.iter().filter(|c| c.enabled).count()
    );

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, gracefully stopping service..."),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    run_until(
        engine,
        configurations,
        Duration::from_secs(interval_minutes.max(1).saturating_mul(60)),
        shutdown,
    )
    .await
}

/// Run a cycle immediately and then once per `period` until `shutdown` completes.
///
/// A cycle in progress is never interrupted.
pub async fn run_until<S, D, F>(
    engine: &SyncEngine<'_, S, D>,
    configurations: &[ExportConfiguration],
    period: Duration,
    shutdown: F,
) -> usize
where
    S: SourceApi,
    D: DestinationApi,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer.tick().await; // First tick happens immediately

    let mut cycles = 0;
    loop {
        let summary = engine.run(configurations).await;
        cycles += 1;
        info!(
            "Sync cycle {cycles} complete: {} configurations processed, {} failed, {} scans uploaded, {} scans failed",
            summary.configurations_processed,
            summary.configurations_failed,
            summary.scans_uploaded,
            summary.scans_failed
        );

        tokio::select! {
            _ = timer.tick() => {}
            () = &mut shutdown => {
                info!("Service shutting down");
                break;
            }
        }
    }
    cycles
}
