/// Storage layer
///
/// One trait fronts two backends: a pooled libsql file database for real
/// deployments and a process-local store for tests and throwaway runs.
pub mod memory;
pub mod migrations;
pub mod models;
pub mod repository;

#[cfg(test)]
mod tests;

pub use memory::MemoryDatabase;
pub use models::{BackupData, CheckData, ChecksRequest, StateChangeParams};
pub use repository::{Database, LibsqlDatabase, StoreError, StoreResult};

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use deadpool::managed::{Pool, PoolConfig};
use libsql::Builder;

use crate::config;
use crate::pool::LibsqlManager;

/// Open the configured backend and bring its schema up to date.
pub async fn open_database(settings: &config::Database) -> Result<Arc<dyn Database>> {
    match settings.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryDatabase::new())),
        "libsql" => {
            let database = Builder::new_local(&settings.path)
                .build()
                .await
                .with_context(|| format!("failed to open database at {}", settings.path))?;

            let conn = database.connect()?;
            migrations::run_migrations(&conn).await?;

            let manager = LibsqlManager::new(database);
            let pool = Pool::builder(manager).config(PoolConfig::default()).build()?;
            Ok(Arc::new(LibsqlDatabase::new(pool)))
        }
        other => bail!("unknown database backend {other:?}"),
    }
}
