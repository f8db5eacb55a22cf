use std::time::Duration;

use tokio::sync::watch::Receiver as WatchReceiver;
use tokio::time::MissedTickBehavior;

use blobs_store::HybridDataProvider;

/// Run blob cleanup every `interval` until shutdown is signalled.
///
/// Runs are sequential, so a slow run delays the next tick instead of
/// overlapping it. A run in progress is finished before shutting down.
/// Returns the number of runs started.
pub async fn spawn_cleanup(
    provider: HybridDataProvider,
    interval: Duration,
    mut shutdown_rx: WatchReceiver<()>,
) -> usize {
    tracing::info!(
        scope = provider.scope(),
        interval_secs = interval.as_secs(),
        external = provider.is_external_configured(),
        "Starting cleanup scheduler"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut runs = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                tracing::info!("Shutdown signal received, stopping cleanup scheduler");
                break;
            }
            _ = ticker.tick() => {
                runs += 1;
                match provider.cleanup_blobs().await {
                    Some(stats) => tracing::info!(
                        run = runs,
                        deleted = stats.deleted,
                        failed = stats.failed,
                        "scheduled cleanup finished"
                    ),
                    None => tracing::debug!(run = runs, "scheduled cleanup produced no reconciliation stats"),
                }
            }
        }
    }

    runs
}
