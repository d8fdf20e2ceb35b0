use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use super::executor::ProbeExecutor;
use super::statechange::StateChangeDetector;
use crate::config::Checks;
use crate::database::Database;

/// Drives the wall-clock-aligned check cycle.
///
/// Every tick fires at the next multiple of the interval, lists the known
/// hosts and fans out one concurrent probe-and-record task per host, all
/// tagged with the tick's boundary timestamp. Ticks and probes overlap;
/// every spawned task is tracked so shutdown can drain them.
pub struct Scheduler {
    database: Arc<dyn Database>,
    executor: Arc<ProbeExecutor>,
    detector: Arc<StateChangeDetector>,
    enabled: bool,
    interval_secs: i64,
    retention_secs: i64,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        database: Arc<dyn Database>,
        executor: Arc<ProbeExecutor>,
        detector: Arc<StateChangeDetector>,
        checks: &Checks,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            database,
            executor,
            detector,
            enabled: checks.enabled,
            interval_secs: checks.interval_secs,
            retention_secs: checks.retention_days * 24 * 3600,
            tasks: TaskTracker::new(),
            shutdown,
        }
    }

    /// Run until cancelled, then drain every in-flight task.
    pub async fn run(self) {
        info!("Check scheduler started (interval {}s)", self.interval_secs);

        loop {
            let now = Utc::now();

            if let Some(cutoff) = self.prune_cutoff(now) {
                let database = Arc::clone(&self.database);
                self.tasks.spawn(async move {
                    if let Err(err) = database.delete_checks_before(cutoff).await {
                        warn!("Failed to prune expired checks: {err}");
                    }
                });
            }

            let tick = Self::aligned_tick(now, self.interval_secs);
            let wait = (tick - now).to_std().unwrap_or_default();

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            if self.enabled {
                self.spawn_tick(tick);
            }
        }

        info!("Check scheduler draining in-flight checks");
        self.tasks.close();
        self.tasks.wait().await;
        info!("Check scheduler stopped");
    }

    /// Fan out one probe-and-record task per known host.
    fn spawn_tick(&self, tick: DateTime<Utc>) {
        let database = Arc::clone(&self.database);
        let executor = Arc::clone(&self.executor);
        let detector = Arc::clone(&self.detector);
        let tasks = self.tasks.clone();

        self.tasks.spawn(async move {
            let hosts = match database.list_hosts().await {
                Ok(hosts) => hosts,
                Err(err) => {
                    error!("Failed to list hosts for tick: {err}");
                    return;
                }
            };

            for host in hosts {
                let database = Arc::clone(&database);
                let executor = Arc::clone(&executor);
                let detector = Arc::clone(&detector);
                let tracker = tasks.clone();
                tasks.spawn(async move {
                    run_check(database, executor, detector, &tracker, host, tick).await;
                });
            }
        });
    }

    /// Next wall-clock boundary that is a whole multiple of the interval.
    fn aligned_tick(now: DateTime<Utc>, interval_secs: i64) -> DateTime<Utc> {
        let boundary = (now.timestamp().div_euclid(interval_secs) + 1) * interval_secs;
        DateTime::from_timestamp(boundary, 0).unwrap_or(now)
    }

    /// Retention cutoff for this cycle, none when retention is disabled.
    fn prune_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.retention_secs <= 0 {
            return None;
        }
        let floor = now.timestamp().div_euclid(self.interval_secs) * self.interval_secs;
        DateTime::from_timestamp(floor - self.retention_secs, 0)
    }
}

/// Probe one host and record the outcome.
///
/// State-change detection and persistence are two independent side effects
/// of the completed probe; neither failure affects the other, and neither
/// stops the tick.
async fn run_check(
    database: Arc<dyn Database>,
    executor: Arc<ProbeExecutor>,
    detector: Arc<StateChangeDetector>,
    tasks: &TaskTracker,
    host: String,
    tick: DateTime<Utc>,
) {
    let outcome = executor.dispatch(&host).await;
    if let Some(err) = &outcome.error {
        warn!("Check of {host} failed: {err}");
    }

    let observed_host = host.clone();
    let (rtt, up) = (outcome.rtt, outcome.up);
    tasks.spawn(async move {
        detector.observe(&observed_host, rtt, tick, up).await;
    });

    if let Err(err) = database.save_check(&host, tick, outcome.rtt, outcome.up).await {
        error!("Failed to save check for {host}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::monitoring::notify::Notifier;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::timeout;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    fn test_checks(interval_secs: i64, retention_days: i64) -> Checks {
        Checks {
            enabled: true,
            interval_secs,
            timeout_secs: 1,
            ping_retry_count: 1,
            http_method: "GET".to_string(),
            allow_single_checks: false,
            retention_days,
        }
    }

    fn build_scheduler(
        database: Arc<MemoryDatabase>,
        checks: &Checks,
        shutdown: CancellationToken,
    ) -> Scheduler {
        let executor = Arc::new(ProbeExecutor::new(1, "GET", 1).unwrap());
        let detector =
            Arc::new(StateChangeDetector::new(database.clone(), Arc::new(NullNotifier)));
        Scheduler::new(database, executor, detector, checks, shutdown)
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn test_aligned_tick_boundaries() {
        let mid_interval = DateTime::from_timestamp(1001, 500_000_000).unwrap();
        assert_eq!(Scheduler::aligned_tick(mid_interval, 60).timestamp(), 1020);

        // A tick starting exactly on a boundary targets the next one.
        let on_boundary = DateTime::from_timestamp(960, 0).unwrap();
        assert_eq!(Scheduler::aligned_tick(on_boundary, 60).timestamp(), 1020);

        assert_eq!(Scheduler::aligned_tick(on_boundary, 1).timestamp(), 961);
    }

    #[tokio::test]
    async fn test_tick_probes_all_hosts_with_shared_timestamp() {
        // Unclassifiable targets record a down result without network I/O.
        let hosts = ["x:y:z", "p:q:r", "m:n:o"];
        let database = Arc::new(MemoryDatabase::new());
        for host in hosts {
            database.add_host(host).await.unwrap();
        }

        let shutdown = CancellationToken::new();
        let scheduler = build_scheduler(database.clone(), &test_checks(1, 0), shutdown.clone());
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(1700)).await;
        shutdown.cancel();
        timeout(Duration::from_secs(3), handle).await.expect("drain timed out").unwrap();

        let mut first_timestamps = Vec::new();
        for host in hosts {
            let checks = database.get_checks(host, epoch(), Utc::now()).await.unwrap();
            assert!(!checks.is_empty(), "no checks recorded for {host}");
            assert!(!checks[0].up);
            first_timestamps.push(checks[0].check_time);
        }
        assert!(
            first_timestamps.windows(2).all(|pair| pair[0] == pair[1]),
            "hosts in one tick must share the tick timestamp"
        );

        // Nothing may be recorded after the drain completes.
        let drained = database.get_checks(hosts[0], epoch(), Utc::now()).await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(1300)).await;
        let after = database.get_checks(hosts[0], epoch(), Utc::now()).await.unwrap().len();
        assert_eq!(after, drained);
    }

    #[tokio::test]
    async fn test_retention_prunes_expired_checks() {
        let database = Arc::new(MemoryDatabase::new());
        database.add_host("a:b:c").await.unwrap();

        let old = Utc::now() - chrono::Duration::days(30);
        database.save_check("a:b:c", old, 5, true).await.unwrap();

        let shutdown = CancellationToken::new();
        let scheduler = build_scheduler(database.clone(), &test_checks(1, 1), shutdown.clone());
        let handle = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.cancel();
        timeout(Duration::from_secs(3), handle).await.expect("drain timed out").unwrap();

        let window = chrono::Duration::seconds(5);
        let around_old = database.get_checks("a:b:c", old - window, old + window).await.unwrap();
        assert!(around_old.is_empty(), "expired check still present");
    }
}
