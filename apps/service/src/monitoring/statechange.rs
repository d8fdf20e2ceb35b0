use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::notify::{Notifier, prepare_action};
use crate::database::Database;

/// Debounce memory for one host. Process-local only: after a restart the
/// first observation becomes the new baseline.
#[derive(Debug, Clone)]
struct StateChangeData {
    last_observed: DateTime<Utc>,
    up: bool,
    pending: i64,
}

/// Decides when an observed up/down flip is real and fires the configured
/// notification exactly once per confirmed transition.
///
/// Hosts opt in by having notification params stored; observations for any
/// other host are ignored. A flip is confirmed once the count of
/// consecutive opposite observations reaches the host's threshold.
pub struct StateChangeDetector {
    database: Arc<dyn Database>,
    notifier: Arc<dyn Notifier>,
    states: Mutex<HashMap<String, StateChangeData>>,
}

impl StateChangeDetector {
    pub fn new(database: Arc<dyn Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self { database, notifier, states: Mutex::new(HashMap::new()) }
    }

    /// Feed one completed probe result through the state machine.
    pub async fn observe(&self, host: &str, rtt: i64, check_time: DateTime<Utc>, up: bool) {
        // Params are fetched before taking the lock; no I/O happens while
        // it is held.
        let params = match self.database.get_notification_params(host).await {
            Ok(Some(params)) => params,
            Ok(None) => return,
            Err(err) => {
                warn!("Failed to load notification params for {host}: {err}");
                return;
            }
        };

        let confirmed = {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            match states.get_mut(host) {
                None => {
                    let seed = StateChangeData { last_observed: check_time, up, pending: 0 };
                    states.insert(host.to_string(), seed);
                    false
                }
                Some(state) if state.up == up => {
                    state.last_observed = check_time;
                    state.pending = 0;
                    false
                }
                Some(state) => {
                    state.last_observed = check_time;
                    state.pending += 1;
                    if state.pending >= params.change_threshold {
                        state.up = up;
                        state.pending = 0;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if confirmed {
            let state = if up { "up" } else { "down" };
            info!("Host {host} changed state to {state}");

            let url = prepare_action(host, rtt, check_time, up, &params.action);
            if let Err(err) = self.notifier.notify(&url).await {
                warn!("State change notification for {host} failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::database::models::StateChangeParams;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingNotifier {
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingNotifier {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.fail { Err(anyhow!("delivery failed")) } else { Ok(()) }
        }
    }

    const HOST: &str = "node.example";

    async fn detector_with_threshold(
        threshold: i64,
        fail_notify: bool,
    ) -> (StateChangeDetector, Arc<RecordingNotifier>) {
        let database = Arc::new(MemoryDatabase::new());
        database.add_host(HOST).await.unwrap();
        database
            .upsert_notification_params(&StateChangeParams {
                host: HOST.to_string(),
                change_threshold: threshold,
                action: "http://n/?h={HOST}&s={STATE}".to_string(),
            })
            .await
            .unwrap();

        let notifier =
            Arc::new(RecordingNotifier { fail: fail_notify, calls: Mutex::new(Vec::new()) });
        let detector = StateChangeDetector::new(database, notifier.clone());
        (detector, notifier)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_host_without_params_is_ignored() {
        let database = Arc::new(MemoryDatabase::new());
        database.add_host(HOST).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let detector = StateChangeDetector::new(database, notifier.clone());

        detector.observe(HOST, 10, at(0), true).await;
        detector.observe(HOST, 10, at(60), false).await;
        detector.observe(HOST, 10, at(120), false).await;

        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_observation_seeds_silently() {
        let (detector, notifier) = detector_with_threshold(1, false).await;

        detector.observe(HOST, 10, at(0), true).await;

        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_three_fires_on_third_consecutive_opposite() {
        let (detector, notifier) = detector_with_threshold(3, false).await;

        // Confirmed-down baseline, then down,down,up,up,up,up.
        detector.observe(HOST, 10, at(0), false).await;
        detector.observe(HOST, 10, at(60), false).await;
        detector.observe(HOST, 10, at(120), false).await;
        detector.observe(HOST, 10, at(180), true).await;
        detector.observe(HOST, 10, at(240), true).await;
        assert!(notifier.calls().is_empty(), "two opposite observations must not confirm");

        detector.observe(HOST, 10, at(300), true).await;
        assert_eq!(notifier.calls(), vec![format!("http://n/?h={HOST}&s=up")]);

        detector.observe(HOST, 10, at(360), true).await;
        assert_eq!(notifier.calls().len(), 1, "exactly one notification per flip");
    }

    #[tokio::test]
    async fn test_same_state_observation_resets_pending() {
        let (detector, notifier) = detector_with_threshold(2, false).await;

        detector.observe(HOST, 10, at(0), false).await;
        detector.observe(HOST, 10, at(60), true).await;
        // Back to the confirmed state, pending evidence is discarded.
        detector.observe(HOST, 10, at(120), false).await;
        detector.observe(HOST, 10, at(180), true).await;
        assert!(notifier.calls().is_empty());

        detector.observe(HOST, 10, at(240), true).await;
        assert_eq!(notifier.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_alternating_confirmed_flips_each_fire_once() {
        let (detector, notifier) = detector_with_threshold(1, false).await;

        detector.observe(HOST, 10, at(0), false).await;
        detector.observe(HOST, 10, at(60), true).await;
        detector.observe(HOST, 10, at(120), true).await;
        detector.observe(HOST, 10, at(180), false).await;
        detector.observe(HOST, 10, at(240), true).await;

        let states: Vec<String> = notifier
            .calls()
            .iter()
            .map(|url| url.rsplit("s=").next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(states, vec!["up", "down", "up"]);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_commits_the_flip() {
        let (detector, notifier) = detector_with_threshold(1, true).await;

        detector.observe(HOST, 10, at(0), false).await;
        detector.observe(HOST, 10, at(60), true).await;
        detector.observe(HOST, 10, at(120), true).await;

        assert_eq!(notifier.calls().len(), 1, "flip is committed despite delivery failure");
    }
}
