use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;

use super::models::{CheckData, StateChangeParams};
use crate::pool::{LibsqlManager, LibsqlPool};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("host already exists")]
    HostExists,
    #[error("no such host")]
    NoSuchHost,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<libsql::Error> for StoreError {
    fn from(err: libsql::Error) -> Self {
        Self::Other(err.into())
    }
}

impl From<deadpool::managed::PoolError<libsql::Error>> for StoreError {
    fn from(err: deadpool::managed::PoolError<libsql::Error>) -> Self {
        Self::Other(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Database trait for abstracting storage operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Register a host for monitoring
    async fn add_host(&self, host: &str) -> StoreResult<()>;

    /// Remove a host along with its checks and notification params
    async fn remove_host(&self, host: &str) -> StoreResult<()>;

    /// Get all monitored hosts
    async fn list_hosts(&self) -> StoreResult<Vec<String>>;

    /// Whether a host is registered
    async fn host_exists(&self, host: &str) -> StoreResult<bool>;

    /// Record one check result
    async fn save_check(
        &self,
        host: &str,
        check_time: DateTime<Utc>,
        rtt: i64,
        up: bool,
    ) -> StoreResult<()>;

    /// Get the checks for a host within an inclusive time range
    async fn get_checks(
        &self,
        host: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<CheckData>>;

    /// Get the most recent check for a host
    async fn get_last_check(&self, host: &str) -> StoreResult<Option<CheckData>>;

    /// Delete all checks strictly older than the cutoff
    async fn delete_checks_before(&self, cutoff: DateTime<Utc>) -> StoreResult<()>;

    /// Create or replace the notification params for a host
    async fn upsert_notification_params(&self, params: &StateChangeParams) -> StoreResult<()>;

    /// Delete the notification params for a host
    async fn delete_notification_params(&self, host: &str) -> StoreResult<()>;

    /// Get the notification params for a host
    async fn get_notification_params(&self, host: &str)
        -> StoreResult<Option<StateChangeParams>>;

    /// Get the notification params of every host
    async fn list_notification_params(&self) -> StoreResult<Vec<StateChangeParams>>;
}

/// LibSQL database implementation
pub struct LibsqlDatabase {
    pool: LibsqlPool,
}

impl LibsqlDatabase {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> StoreResult<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn row_to_check(row: &libsql::Row) -> StoreResult<CheckData> {
    Ok(CheckData {
        check_time: DateTime::from_timestamp(row.get::<i64>(0)?, 0).unwrap_or_default(),
        rtt: row.get(1)?,
        up: row.get::<i64>(2)? != 0,
    })
}

#[async_trait]
impl Database for LibsqlDatabase {
    async fn add_host(&self, host: &str) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        let affected = conn
            .execute("INSERT OR IGNORE INTO hosts (host) VALUES (?)", params![host])
            .await?;

        if affected == 0 {
            return Err(StoreError::HostExists);
        }
        Ok(())
    }

    async fn remove_host(&self, host: &str) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        let affected = conn
            .execute("DELETE FROM hosts WHERE host = ?", params![host])
            .await?;

        if affected == 0 {
            return Err(StoreError::NoSuchHost);
        }

        conn.execute("DELETE FROM checks WHERE host = ?", params![host]).await?;
        conn.execute("DELETE FROM state_change_params WHERE host = ?", params![host]).await?;
        Ok(())
    }

    async fn list_hosts(&self) -> StoreResult<Vec<String>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn.prepare("SELECT host FROM hosts ORDER BY host").await?;

        let mut rows = stmt.query(()).await?;
        let mut hosts = Vec::new();

        while let Some(row) = rows.next().await? {
            hosts.push(row.get(0)?);
        }

        Ok(hosts)
    }

    async fn host_exists(&self, host: &str) -> StoreResult<bool> {
        let conn = self.get_conn().await?;
        let mut stmt = conn.prepare("SELECT 1 FROM hosts WHERE host = ?").await?;

        let mut rows = stmt.query(params![host]).await?;
        Ok(rows.next().await?.is_some())
    }

    async fn save_check(
        &self,
        host: &str,
        check_time: DateTime<Utc>,
        rtt: i64,
        up: bool,
    ) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR REPLACE INTO checks (host, check_time, rtt, up) VALUES (?, ?, ?, ?)",
            params![host, check_time.timestamp(), rtt, if up { 1 } else { 0 }],
        )
        .await?;
        Ok(())
    }

    async fn get_checks(
        &self,
        host: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<CheckData>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT check_time, rtt, up FROM checks
                 WHERE host = ? AND check_time BETWEEN ? AND ?
                 ORDER BY check_time",
            )
            .await?;

        let mut rows = stmt
            .query(params![host, start.timestamp(), end.timestamp()])
            .await?;
        let mut checks = Vec::new();

        while let Some(row) = rows.next().await? {
            checks.push(row_to_check(&row)?);
        }

        Ok(checks)
    }

    async fn get_last_check(&self, host: &str) -> StoreResult<Option<CheckData>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT check_time, rtt, up FROM checks
                 WHERE host = ? ORDER BY check_time DESC LIMIT 1",
            )
            .await?;

        let mut rows = stmt.query(params![host]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_check(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn delete_checks_before(&self, cutoff: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "DELETE FROM checks WHERE check_time < ?",
            params![cutoff.timestamp()],
        )
        .await?;
        Ok(())
    }

    async fn upsert_notification_params(&self, params: &StateChangeParams) -> StoreResult<()> {
        if !self.host_exists(&params.host).await? {
            return Err(StoreError::NoSuchHost);
        }

        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR REPLACE INTO state_change_params (host, change_threshold, action)
             VALUES (?, ?, ?)",
            params![
                params.host.as_str(),
                params.change_threshold,
                params.action.as_str()
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_notification_params(&self, host: &str) -> StoreResult<()> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM state_change_params WHERE host = ?", params![host])
            .await?;
        Ok(())
    }

    async fn get_notification_params(
        &self,
        host: &str,
    ) -> StoreResult<Option<StateChangeParams>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT host, change_threshold, action FROM state_change_params
                 WHERE host = ? LIMIT 1",
            )
            .await?;

        let mut rows = stmt.query(params![host]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(StateChangeParams {
                host: row.get(0)?,
                change_threshold: row.get(1)?,
                action: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn list_notification_params(&self) -> StoreResult<Vec<StateChangeParams>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare("SELECT host, change_threshold, action FROM state_change_params ORDER BY host")
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut all = Vec::new();

        while let Some(row) = rows.next().await? {
            all.push(StateChangeParams {
                host: row.get(0)?,
                change_threshold: row.get(1)?,
                action: row.get(2)?,
            });
        }

        Ok(all)
    }
}
