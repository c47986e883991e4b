use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::orchestrator::Orchestrator;

/// Interval between connection status checks
const STATUS_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background loop that reports connection health until shutdown.
pub struct MonitorTask {
    orchestrator: Arc<Orchestrator>,
    shutdown: broadcast::Receiver<()>,
}

impl MonitorTask {
    pub fn new(orchestrator: Arc<Orchestrator>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            orchestrator,
            shutdown,
        }
    }

    /// Run status checks until the shutdown channel fires.
    pub async fn run(mut self) {
        let mut status_timer = tokio::time::interval(STATUS_CHECK_INTERVAL);

        // Skip immediate first tick
        status_timer.tick().await;

        tracing::info!(
            interval_secs = STATUS_CHECK_INTERVAL.as_secs(),
            "Monitoring connections; press Ctrl+C to close them and exit"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Monitor received shutdown signal");
                    break;
                }
                _ = status_timer.tick() => {
                    self.orchestrator.status_check().await;
                }
            }
        }

        tracing::info!("Monitor stopped");
    }
}
