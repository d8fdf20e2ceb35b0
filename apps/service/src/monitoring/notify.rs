use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use url::form_urlencoded::byte_serialize;

/// Outbound delivery of a confirmed state-change event.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fire one event at the prepared URL. No retries; the state flip has
    /// already been committed whatever happens here.
    async fn notify(&self, url: &str) -> Result<()>;
}

/// Expand an action template into the URL to fire.
///
/// Placeholders: `{HOST}`, `{TIME}`, `{TIMESTAMP}`, `{RTT}` (nanoseconds),
/// `{RTTSTR}`, `{STATE}` (`up`/`down`), `{UP}` and `{DOWN}` (booleans).
/// Host and time-derived fields are URL-escaped.
pub fn prepare_action(
    host: &str,
    rtt: i64,
    check_time: DateTime<Utc>,
    up: bool,
    action: &str,
) -> String {
    let time = check_time.format("%Y-%m-%d %H:%M:%S %z %Z").to_string();

    let action = action
        .replace("{HOST}", &escape(host))
        .replace("{TIME}", &escape(&time))
        .replace("{TIMESTAMP}", &check_time.timestamp().to_string())
        .replace("{RTT}", &rtt.to_string())
        .replace("{RTTSTR}", &escape(&rtt_string(rtt)));

    if up {
        action.replace("{STATE}", "up").replace("{UP}", "true").replace("{DOWN}", "false")
    } else {
        action.replace("{STATE}", "down").replace("{UP}", "false").replace("{DOWN}", "true")
    }
}

fn escape(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Human-readable round-trip time, `15.3ms` style.
fn rtt_string(rtt: i64) -> String {
    match u64::try_from(rtt) {
        Ok(ns) => format!("{:?}", Duration::from_nanos(ns)),
        Err(_) => format!("{rtt}ns"),
    }
}

/// Notifier issuing one HTTP GET per event.
pub struct HttpNotifier {
    client: reqwest::Client,
    credentials: Option<(String, String)>,
}

impl HttpNotifier {
    pub fn new(credentials: Option<(String, String)>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self { client, credentials })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, url: &str) -> Result<()> {
        debug!("Firing notification: {url}");

        let mut request = self.client.get(url);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if !(200..400).contains(&status) {
            bail!("response status: {status}");
        }

        Ok(())
    }
}
