use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{CheckData, StateChangeParams};
use super::repository::{Database, StoreError, StoreResult};

#[derive(Default)]
struct MemoryState {
    hosts: BTreeSet<String>,
    checks: HashMap<String, Vec<CheckData>>,
    params: BTreeMap<String, StateChangeParams>,
}

/// Process-local store for tests and throwaway runs.
///
/// Same contract as the libsql backend, nothing survives a restart.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn add_host(&self, host: &str) -> StoreResult<()> {
        let mut state = self.lock();
        if !state.hosts.insert(host.to_string()) {
            return Err(StoreError::HostExists);
        }
        Ok(())
    }

    async fn remove_host(&self, host: &str) -> StoreResult<()> {
        let mut state = self.lock();
        if !state.hosts.remove(host) {
            return Err(StoreError::NoSuchHost);
        }
        state.checks.remove(host);
        state.params.remove(host);
        Ok(())
    }

    async fn list_hosts(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock().hosts.iter().cloned().collect())
    }

    async fn host_exists(&self, host: &str) -> StoreResult<bool> {
        Ok(self.lock().hosts.contains(host))
    }

    async fn save_check(
        &self,
        host: &str,
        check_time: DateTime<Utc>,
        rtt: i64,
        up: bool,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let checks = state.checks.entry(host.to_string()).or_default();
        // Same second replaces, matching the libsql primary key.
        checks.retain(|check| check.check_time.timestamp() != check_time.timestamp());
        checks.push(CheckData { check_time, rtt, up });
        Ok(())
    }

    async fn get_checks(
        &self,
        host: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<CheckData>> {
        let state = self.lock();
        let mut checks: Vec<CheckData> = state
            .checks
            .get(host)
            .map(|all| {
                all.iter()
                    .filter(|check| check.check_time >= start && check.check_time <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        checks.sort_by_key(|check| check.check_time);
        Ok(checks)
    }

    async fn get_last_check(&self, host: &str) -> StoreResult<Option<CheckData>> {
        let state = self.lock();
        Ok(state
            .checks
            .get(host)
            .and_then(|all| all.iter().max_by_key(|check| check.check_time))
            .copied())
    }

    async fn delete_checks_before(&self, cutoff: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.lock();
        for checks in state.checks.values_mut() {
            checks.retain(|check| check.check_time >= cutoff);
        }
        Ok(())
    }

    async fn upsert_notification_params(&self, params: &StateChangeParams) -> StoreResult<()> {
        let mut state = self.lock();
        if !state.hosts.contains(&params.host) {
            return Err(StoreError::NoSuchHost);
        }
        state.params.insert(params.host.clone(), params.clone());
        Ok(())
    }

    async fn delete_notification_params(&self, host: &str) -> StoreResult<()> {
        self.lock().params.remove(host);
        Ok(())
    }

    async fn get_notification_params(
        &self,
        host: &str,
    ) -> StoreResult<Option<StateChangeParams>> {
        Ok(self.lock().params.get(host).cloned())
    }

    async fn list_notification_params(&self) -> StoreResult<Vec<StateChangeParams>> {
        Ok(self.lock().params.values().cloned().collect())
    }
}
