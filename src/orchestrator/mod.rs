//! Connection orchestrator: owns the registry of held connections, opens
//! them sequentially, reports their health, and sweeps them on shutdown.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;

use crate::config::DatabaseTarget;
use crate::connection::HeldConnection;
use crate::error::{AppError, Result};

/// Pause between successive connection opens, to avoid bursting the target.
const CONNECT_PACING_DELAY: Duration = Duration::from_millis(100);

/// How the spawn pass should open connections.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Number of connections to open.
    pub count: usize,
    /// Statements to run on qualifying connections right after open.
    pub init_query: Option<String>,
    /// Percentage of connections that run `init_query`; all of them if unset.
    pub query_percent: Option<f64>,
}

/// Outcome counts of a spawn pass.
#[derive(Debug, Default)]
pub struct SpawnSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub with_init: usize,
    pub without_init: usize,
}

/// Owns the ordered registry of held connections.
///
/// The registry is mutated by the spawn pass and the shutdown sweep and read
/// by the monitor; the mutex keeps those safe against each other even though
/// they normally take turns on the main flow.
pub struct Orchestrator {
    target: DatabaseTarget,
    registry: Mutex<Vec<HeldConnection>>,
}

impl Orchestrator {
    pub fn new(target: DatabaseTarget) -> Self {
        Self {
            target,
            registry: Mutex::new(Vec::new()),
        }
    }

    /// Open `opts.count` connections sequentially, retaining the successful
    /// ones in the registry.
    ///
    /// Individual failures are logged and counted; only a pass where every
    /// slot fails is fatal.
    pub async fn spawn_connections(&self, opts: &SpawnOptions) -> Result<SpawnSummary> {
        tracing::info!(count = opts.count, "Spawning connections");

        let init_slots = match (&opts.init_query, opts.query_percent) {
            (Some(sql), Some(percent)) => {
                let slots = select_init_slots(&mut rand::rng(), opts.count, percent);
                tracing::info!(
                    statements = %sql,
                    selected = slots.len(),
                    total = opts.count,
                    percent = percent,
                    "Initialization statements will run on a random subset of connections"
                );
                slots
            }
            (Some(sql), None) => {
                tracing::info!(
                    statements = %sql,
                    "Initialization statements will run on all connections"
                );
                (1..=opts.count).collect()
            }
            (None, _) => HashSet::new(),
        };

        let mut summary = SpawnSummary::default();
        for seq in 1..=opts.count {
            let init = if init_slots.contains(&seq) {
                opts.init_query.as_deref()
            } else {
                None
            };

            match HeldConnection::open(&self.target, seq, init).await {
                Ok(held) => {
                    self.registry.lock().await.push(held);
                    summary.succeeded += 1;
                    if init.is_some() {
                        summary.with_init += 1;
                    } else {
                        summary.without_init += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(connection = seq, error = %e, "Connection attempt failed");
                    summary.failed += 1;
                }
            }

            if seq < opts.count {
                tokio::time::sleep(CONNECT_PACING_DELAY).await;
            }
        }

        let open = self.registry.lock().await.len();
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            open = open,
            "Connection summary"
        );
        if opts.init_query.is_some() && opts.query_percent.is_some() {
            tracing::info!(
                with_init = summary.with_init,
                without_init = summary.without_init,
                "Initialization statement coverage"
            );
        }

        if summary.succeeded == 0 {
            tracing::error!("No connections were established");
            return Err(AppError::NoConnections);
        }
        Ok(summary)
    }

    /// Count still-open registry entries and probe a sample of them.
    ///
    /// Probe failures are warnings only; the run never stops because of one.
    pub async fn status_check(&self) {
        let mut registry = self.registry.lock().await;
        let total = registry.len();
        let open = registry.iter().filter(|held| held.is_open()).count();
        tracing::info!(open = open, total = total, "Status check");

        if total == 0 {
            return;
        }

        for idx in sample_positions(total) {
            let held = &mut registry[idx];
            if !held.is_open() {
                continue;
            }
            if let Err(e) = held.probe().await {
                tracing::warn!(
                    connection = held.seq(),
                    error = %e,
                    "Liveness probe failed"
                );
            }
        }
    }

    /// Close every held connection and empty the registry.
    ///
    /// Per-connection close failures are logged without stopping the sweep.
    /// Safe to call again once the registry is empty.
    pub async fn shutdown(&self) {
        let mut registry = self.registry.lock().await;
        let total = registry.len();
        tracing::info!(total = total, "Closing connections");

        let mut closed = 0;
        for mut held in registry.drain(..) {
            let seq = held.seq();
            match held.close().await {
                Ok(()) => {
                    closed += 1;
                    tracing::info!(connection = seq, "Closed connection");
                }
                Err(e) => {
                    tracing::error!(connection = seq, error = %e, "Error closing connection");
                }
            }
        }

        tracing::info!(closed = closed, total = total, "Connection sweep complete");
    }

    /// Number of entries currently in the registry.
    pub async fn registry_len(&self) -> usize {
        self.registry.lock().await.len()
    }
}

/// Pick which sequence numbers in `1..=count` receive the initialization
/// statements: a uniform sample without replacement of size
/// `max(1, floor(count * percent / 100))`.
fn select_init_slots<R: Rng + ?Sized>(rng: &mut R, count: usize, percent: f64) -> HashSet<usize> {
    if count == 0 {
        return HashSet::new();
    }
    let wanted = ((count as f64 * percent / 100.0).floor() as usize)
        .max(1)
        .min(count);
    rand::seq::index::sample(rng, count, wanted)
        .into_iter()
        .map(|idx| idx + 1)
        .collect()
}

/// Registry positions sampled during a status check: first, middle, last.
fn sample_positions(len: usize) -> Vec<usize> {
    let mut positions = vec![0, len / 2, len.saturating_sub(1)];
    positions.dedup();
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::config::{DatabaseParams, DatabaseTarget};

    #[test]
    fn init_slot_count_matches_formula() {
        let mut rng = StdRng::seed_from_u64(7);
        for count in 1..=40 {
            for percent in [0.0, 1.0, 10.0, 33.3, 50.0, 99.0, 100.0] {
                let slots = select_init_slots(&mut rng, count, percent);
                let expected = ((count as f64 * percent / 100.0).floor() as usize).max(1);
                assert_eq!(slots.len(), expected, "count={count} percent={percent}");
                assert!(slots.iter().all(|&seq| (1..=count).contains(&seq)));
            }
        }
    }

    #[test]
    fn init_slots_half_of_ten() {
        let mut rng = StdRng::seed_from_u64(42);
        let slots = select_init_slots(&mut rng, 10, 50.0);
        assert_eq!(slots.len(), 5);
        assert!(slots.iter().all(|&seq| (1..=10).contains(&seq)));
    }

    #[test]
    fn init_slots_full_percent_selects_all() {
        let mut rng = StdRng::seed_from_u64(1);
        let slots = select_init_slots(&mut rng, 8, 100.0);
        assert_eq!(slots, (1..=8usize).collect::<HashSet<_>>());
    }

    #[test]
    fn init_slots_zero_percent_selects_one() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(select_init_slots(&mut rng, 20, 0.0).len(), 1);
    }

    #[test]
    fn sample_positions_first_middle_last() {
        assert_eq!(sample_positions(1), vec![0]);
        assert_eq!(sample_positions(2), vec![0, 1]);
        assert_eq!(sample_positions(3), vec![0, 1, 2]);
        assert_eq!(sample_positions(10), vec![0, 5, 9]);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_on_empty_registry() {
        let orchestrator = Orchestrator::new(DatabaseTarget::Params(DatabaseParams {
            host: "127.0.0.1".into(),
            port: 1,
            name: "unused".into(),
            user: "unused".into(),
            password: "unused".into(),
        }));

        orchestrator.shutdown().await;
        orchestrator.shutdown().await;
        assert_eq!(orchestrator.registry_len().await, 0);
    }
}
