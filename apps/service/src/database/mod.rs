/// Database abstraction layer
///
/// Monitors, SSL watches, notification groups and the per-type heartbeat
/// tables live in a single local libSQL file.

pub mod repository;
pub mod migrations;
pub mod models;

use std::path::Path;
use std::sync::Arc;

pub use repository::{Database, DatabaseImpl};

use anyhow::{Context, Result};

use crate::pool::create_pool;

const POOL_SIZE: usize = 8;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the database file at `path`, bring its schema up to date and
/// return a shared handle.
pub async fn connect(path: impl AsRef<Path>) -> Result<Arc<dyn Database>> {
    let path = path.as_ref();
    let pool = create_pool(path, POOL_SIZE)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))?;

    {
        let conn = pool.get().await.context("Failed to get a database connection")?;
        initialize_database(&conn).await?;
    }

    Ok(Arc::new(DatabaseImpl::new_from_pool(pool)))
}
