//! Periodic retry scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing;

use queuectl_entity::job::model;

use crate::queue::JobQueue;

/// Spawn the retry scheduler task.
///
/// Each tick requeues failed jobs whose backoff delay has elapsed. The
/// sleep starts after the tick finishes (fixed delay, never overlapping);
/// errors are logged and the loop survives them.
pub fn spawn_retry_scheduler(
    queue: Arc<JobQueue>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Retry scheduler started with interval {}s",
            interval.as_secs()
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // A dropped sender also means the pool is gone.
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {
                    match queue.process_retries(model::now()).await {
                        Ok(count) if count > 0 => {
                            tracing::debug!("Retry tick requeued {} jobs", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!("Error processing retries: {}", e);
                        }
                    }
                }
            }
        }

        tracing::info!("Retry scheduler stopped");
    })
}
