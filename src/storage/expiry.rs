//! Active Expiry
//!
//! Lazy expiry (on access) never reclaims a key that is not read again. The
//! active cycle covers that gap without scanning the whole keyspace:
//!
//! 1. Sample up to [`SAMPLE_QUOTA`] entries that carry a deadline
//! 2. Delete the ones that have passed it
//! 3. If at least [`CONTINUE_THRESHOLD`] of the quota was deleted, sample again
//!
//! A low yield means most expired keys are already gone, so the cycle stops.
//! The yield is always measured against the full quota, even when fewer
//! volatile entries exist, which makes a small keyspace finish in one round.
//!
//! The cycle does not schedule itself. The reactor calls it from its event
//! loop; the threaded engine runs an [`ExpirySweeper`] task.

use crate::storage::engine::{lock_store, now_ms, SharedStore, Store};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Volatile entries inspected per sample.
pub const SAMPLE_QUOTA: usize = 20;

/// Minimum fraction of the quota a sample must delete for the cycle to continue.
pub const CONTINUE_THRESHOLD: f64 = 0.25;

/// Default cadence of the expiry cycle.
pub const DEFAULT_CRON_INTERVAL: Duration = Duration::from_secs(1);

/// Summary of one [`run_expiry_cycle`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Samples taken
    pub rounds: usize,
    /// Keys deleted across all samples
    pub deleted: usize,
    /// Keys left in the store afterwards
    pub remaining: usize,
}

/// Takes one sample at the current time. Returns the deleted fraction of the quota.
pub fn sample(store: &mut Store) -> f64 {
    sample_at(store, now_ms())
}

/// Takes one sample treating `now` as the current time.
pub fn sample_at(store: &mut Store, now: u64) -> f64 {
    let outcome = store.sample_volatile(SAMPLE_QUOTA, now);
    outcome.deleted as f64 / SAMPLE_QUOTA as f64
}

/// Samples until a round's yield drops below [`CONTINUE_THRESHOLD`].
///
/// There is no cap on the number of rounds: under sustained expiry churn the
/// caller is held for as long as samples keep paying off.
pub fn run_expiry_cycle(store: &mut Store) -> CycleReport {
    let before = store.len();
    let mut rounds = 0;

    loop {
        rounds += 1;
        if sample(store) < CONTINUE_THRESHOLD {
            break;
        }
    }

    let report = CycleReport {
        rounds,
        deleted: before - store.len(),
        remaining: store.len(),
    };

    if report.deleted > 0 {
        debug!(
            rounds = report.rounds,
            deleted = report.deleted,
            remaining = report.remaining,
            "Expired keys reclaimed"
        );
    }

    report
}

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between expiry cycles
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CRON_INTERVAL,
        }
    }
}

/// Handle to a background task that runs the expiry cycle on a shared store.
///
/// The task stops when the handle is dropped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current tokio runtime.
    ///
    /// ```ignore
    /// let store = Store::shared();
    /// let sweeper = ExpirySweeper::start(Arc::clone(&store), ExpiryConfig::default());
    /// // ...
    /// drop(sweeper);
    /// ```
    pub fn start(store: SharedStore, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(store, config, shutdown_rx));

        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Signals the task to stop. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(store: SharedStore, config: ExpiryConfig, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        // The guard must not live across the next await.
        run_expiry_cycle(&mut lock_store(&store));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::engine::Expiry;
    use bytes::Bytes;
    use std::sync::Arc;

    fn populate(store: &mut Store, expired: usize, persistent: usize) {
        let past = now_ms() - 5_000;
        for i in 0..expired {
            store.set_with_expiry(Bytes::from(format!("exp{}", i)), Bytes::from("v"), Expiry::At(past));
        }
        for i in 0..persistent {
            store.set(Bytes::from(format!("keep{}", i)), Bytes::from("v"));
        }
    }

    #[test]
    fn test_sample_fraction_uses_quota() {
        let mut store = Store::new();
        populate(&mut store, 3, 0);

        assert_eq!(sample(&mut store), 3.0 / 20.0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_repeated_samples_reclaim_only_expired() {
        let mut store = Store::new();
        populate(&mut store, 30, 10);

        assert_eq!(sample(&mut store), 1.0);
        assert_eq!(sample(&mut store), 0.5);
        assert_eq!(sample(&mut store), 0.0);

        assert_eq!(store.len(), 10);
        for i in 0..10 {
            assert!(store.exists(format!("keep{}", i).as_bytes()));
        }
    }

    #[test]
    fn test_cycle_terminates_after_low_yield() {
        let mut store = Store::new();
        populate(&mut store, 30, 10);

        let report = run_expiry_cycle(&mut store);
        assert_eq!(
            report,
            CycleReport {
                rounds: 3,
                deleted: 30,
                remaining: 10,
            }
        );
    }

    #[test]
    fn test_cycle_on_empty_store() {
        let mut store = Store::new();
        assert_eq!(run_expiry_cycle(&mut store).rounds, 1);
    }

    #[test]
    fn test_cycle_leaves_live_volatile_keys() {
        let mut store = Store::new();
        for i in 0..40 {
            store.set_with_ttl(Bytes::from(format!("k{}", i)), Bytes::from("v"), Duration::from_secs(60));
        }

        let report = run_expiry_cycle(&mut store);
        assert_eq!(report.deleted, 0);
        assert_eq!(store.len(), 40);
    }

    #[test]
    fn test_sample_at_future_time() {
        let mut store = Store::new();
        store.set_with_ttl(Bytes::from("k"), Bytes::from("v"), Duration::from_secs(60));

        assert_eq!(sample_at(&mut store, now_ms()), 0.0);
        assert_eq!(sample_at(&mut store, now_ms() + 120_000), 1.0 / 20.0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_reclaims_shared_store() {
        let store = Store::shared();
        populate(&mut lock_store(&store), 30, 1);

        let config = ExpiryConfig {
            interval: Duration::from_millis(10),
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&store), config);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let store = lock_store(&store);
        assert_eq!(store.len(), 1);
        assert!(store.exists(b"keep0"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let store = Store::shared();
        let config = ExpiryConfig {
            interval: Duration::from_millis(10),
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&store), config);
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        populate(&mut lock_store(&store), 5, 0);
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(lock_store(&store).len(), 5);
    }
}
