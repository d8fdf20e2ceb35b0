use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded probe of a host.
///
/// `rtt` is nanoseconds, or -1 when nothing was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckData {
    #[serde(rename = "time")]
    pub check_time: DateTime<Utc>,
    pub rtt: i64,
    pub up: bool,
}

/// Notification settings for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeParams {
    pub host: String,
    #[serde(rename = "threshold")]
    pub change_threshold: i64,
    pub action: String,
}

/// Request body shared by the history endpoints.
///
/// Absent dates decode as the Unix epoch, matching clients that only
/// send a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksRequest {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: DateTime<Utc>,
}

/// Export/import payload for the backup endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupData {
    pub hosts: Vec<String>,
    pub notifications: Vec<StateChangeParams>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub checks: HashMap<String, Vec<CheckData>>,
}
