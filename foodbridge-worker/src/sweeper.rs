/// Periodic sweeper
///
/// Runs every registered [`Sweep`] once per interval until shutdown is
/// requested through the cancellation token.
///
/// # Architecture
///
/// ```text
/// Sweeper
///   ├─> interval tick
///   ├─> ExpireOverdue: open donations past expiry -> expired, notify
///   └─> RefreshUrgency: recompute drifted urgency levels
/// ```
///
/// A failing sweep is logged and the loop carries on; the next tick retries.
/// All writes are conditional on the current status, so a sweep racing an
/// API request never overwrites a newer state.
///
/// # Example
///
/// ```no_run
/// use foodbridge_worker::sweeper::{Sweeper, SweeperConfig};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let sweeper = Sweeper::with_config(pool, SweeperConfig { interval_secs: 30 });
///
/// let token = sweeper.shutdown_token();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     token.cancel();
/// });
///
/// sweeper.run().await;
/// # Ok(())
/// # }
/// ```

use crate::sweep::{ExpireOverdue, RefreshUrgency, Sweep, SweepReport, SweepResult};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Sweeper configuration
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Seconds between passes
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig { interval_secs: 60 }
    }
}

impl SweeperConfig {
    /// Reads `SWEEP_INTERVAL_SECS` (default 60)
    pub fn from_env() -> anyhow::Result<Self> {
        let interval_secs = match std::env::var("SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid SWEEP_INTERVAL_SECS '{}': {}", raw, e))?,
            Err(_) => Self::default().interval_secs,
        };

        if interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be positive");
        }

        Ok(SweeperConfig { interval_secs })
    }
}

pub struct Sweeper {
    db: PgPool,
    config: SweeperConfig,

    /// Run in registration order
    sweeps: Vec<Arc<dyn Sweep>>,

    shutdown_token: CancellationToken,
}

impl Sweeper {
    /// Creates a sweeper with the default interval and the built-in sweeps
    pub fn new(db: PgPool) -> Self {
        Self::with_config(db, SweeperConfig::default())
    }

    pub fn with_config(db: PgPool, config: SweeperConfig) -> Self {
        let sweeps: Vec<Arc<dyn Sweep>> = vec![Arc::new(ExpireOverdue), Arc::new(RefreshUrgency)];

        Sweeper {
            db,
            config,
            sweeps,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Appends a sweep after the built-in ones
    pub fn register_sweep(&mut self, sweep: Arc<dyn Sweep>) {
        tracing::info!(sweep = sweep.name(), "Registering sweep");
        self.sweeps.push(sweep);
    }

    pub fn sweep_names(&self) -> Vec<&'static str> {
        self.sweeps.iter().map(|s| s.name()).collect()
    }

    /// Used to signal graceful shutdown from external handlers
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs every sweep once, in order, and returns each outcome
    ///
    /// A failing sweep does not stop the ones after it.
    pub async fn run_once(&self) -> Vec<(&'static str, SweepResult<SweepReport>)> {
        let mut results = Vec::with_capacity(self.sweeps.len());

        for sweep in &self.sweeps {
            let name = sweep.name();
            let result = sweep.run(&self.db).await;

            match &result {
                Ok(report) if report.affected > 0 => {
                    tracing::info!(sweep = name, affected = report.affected, "Sweep changed rows");
                }
                Ok(_) => tracing::debug!(sweep = name, "Sweep found nothing to do"),
                Err(e) => tracing::error!(sweep = name, error = %e, "Sweep failed"),
            }

            results.push((name, result));
        }

        results
    }

    /// Sweeps on every tick until the shutdown token is cancelled
    ///
    /// The first pass runs immediately. A pass in progress finishes before
    /// shutdown completes.
    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.interval_secs,
            sweeps = ?self.sweep_names(),
            "Sweeper starting"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!("Shutdown requested, sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        tracing::info!("Sweeper shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Counting(Arc<AtomicU64>);

    #[async_trait]
    impl Sweep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _pool: &PgPool) -> SweepResult<SweepReport> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SweepReport::new(n))
        }
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(100))
            .connect_lazy("postgresql://foodbridge@127.0.0.1:1/unreachable")
            .unwrap()
    }

    /// A sweeper with only the given sweep, so no database is touched
    fn isolated(sweep: Arc<dyn Sweep>, interval_secs: u64) -> Sweeper {
        Sweeper {
            db: lazy_pool(),
            config: SweeperConfig { interval_secs },
            sweeps: vec![sweep],
            shutdown_token: CancellationToken::new(),
        }
    }

    #[test]
    fn test_sweeper_config_default() {
        assert_eq!(SweeperConfig::default().interval_secs, 60);
    }

    #[tokio::test]
    async fn test_builtin_sweeps_in_order() {
        let mut sweeper = Sweeper::new(lazy_pool());
        let counter = Arc::new(AtomicU64::new(0));
        sweeper.register_sweep(Arc::new(Counting(counter)));

        assert_eq!(
            sweeper.sweep_names(),
            vec!["expire_overdue", "refresh_urgency", "counting"]
        );
    }

    #[tokio::test]
    async fn test_failing_sweep_does_not_stop_the_rest() {
        let mut sweeper = Sweeper::new(lazy_pool());
        let counter = Arc::new(AtomicU64::new(0));
        sweeper.register_sweep(Arc::new(Counting(counter.clone())));

        let results = sweeper.run_once().await;

        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_err());
        assert_eq!(results[2].1.as_ref().unwrap().affected, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_cancelled() {
        let counter = Arc::new(AtomicU64::new(0));
        let sweeper = Arc::new(isolated(Arc::new(Counting(counter.clone())), 10));
        let token = sweeper.shutdown_token();

        let handle = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.run().await })
        };

        // Immediate first pass, then one per 10s
        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
