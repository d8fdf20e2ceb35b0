use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::DateTime;
use tracing::warn;

use super::chart::truncate_to_interval;
use crate::config::{Auth, Web};
use crate::database::models::{CheckData, ChecksRequest};

/// Pulls check history off peer instances for chart and table display.
///
/// Best-effort and read-only: failures are logged and skipped, merged
/// results are never persisted.
pub struct RemoteChecks {
    client: reqwest::Client,
    urls: Vec<String>,
    credentials: Option<(String, String)>,
    enabled: bool,
}

impl RemoteChecks {
    pub fn new(web: &Web, auth: &Auth, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let credentials =
            auth.enabled.then(|| (auth.username.clone(), auth.password.clone()));

        Ok(Self {
            client,
            urls: web.remote_checks_urls.clone(),
            credentials,
            enabled: web.use_remote_checks,
        })
    }

    /// Fetch every configured peer's series for the request and fold it
    /// into `local`, keyed by interval-truncated timestamp.
    pub async fn merge_into(
        &self,
        local: &mut HashMap<i64, CheckData>,
        request: &ChecksRequest,
        interval_secs: i64,
    ) {
        if !self.enabled {
            return;
        }

        for url in &self.urls {
            match self.fetch(url, request).await {
                Ok(remote) => merge_checks(local, remote, interval_secs),
                Err(err) => warn!("Failed to fetch remote checks from {url}: {err:#}"),
            }
        }
    }

    async fn fetch(&self, base: &str, request: &ChecksRequest) -> Result<Vec<CheckData>> {
        let url = format!("{}/api/checks", base.trim_end_matches('/'));

        let mut req = self.client.post(&url).json(request);
        if let Some((username, password)) = &self.credentials {
            req = req.basic_auth(username, Some(password));
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("response status: {status}");
        }

        Ok(response.json().await?)
    }
}

/// A remote record wins an occupied slot only when it is up and the local
/// record is down, or both are up and the remote rtt is lower. Empty
/// slots always take the remote record.
pub fn merge_checks(
    local: &mut HashMap<i64, CheckData>,
    remote: Vec<CheckData>,
    interval_secs: i64,
) {
    for mut check in remote {
        let slot = truncate_to_interval(check.check_time.timestamp(), interval_secs);
        if let Some(aligned) = DateTime::from_timestamp(slot, 0) {
            check.check_time = aligned;
        }

        match local.get(&slot) {
            None => {
                local.insert(slot, check);
            }
            Some(existing) if check.up && (!existing.up || check.rtt < existing.rtt) => {
                local.insert(slot, check);
            }
            Some(_) => {}
        }
    }
}
