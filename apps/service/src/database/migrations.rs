use anyhow::Result;
use libsql::Connection;

use crate::monitoring::types::MonitorType;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// This is the single source of truth for the database schema.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Monitors, notification groups and heartbeat tables").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "SSL watches").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

/// Get current schema version from database
async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i64> = row.get(0)?;
        Ok(version.unwrap_or(0) as i32)
    } else {
        Ok(0)
    }
}

/// Record that a migration was applied
async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version as i64, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: monitors, notification groups and one heartbeat table per monitor type
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            group_name TEXT NOT NULL,
            emails TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            monitor_type TEXT NOT NULL,
            url TEXT NOT NULL DEFAULT '',
            port INTEGER,
            timeout_seconds INTEGER,
            method TEXT NOT NULL DEFAULT 'GET',
            headers TEXT,
            body TEXT,
            http_auth_method TEXT NOT NULL DEFAULT 'none',
            basic_auth_user TEXT,
            basic_auth_pass TEXT,
            bearer_token TEXT,
            redirects INTEGER NOT NULL DEFAULT 0,
            frequency_minutes INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1,
            status INTEGER NOT NULL DEFAULT 0,
            last_changed INTEGER,
            notification_id INTEGER,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_user_id ON monitors(user_id)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_monitors_active ON monitors(active)", ()).await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_notifications_user_id ON notifications(user_id)", ())
        .await?;

    for monitor_type in MonitorType::ALL {
        let table = monitor_type.heartbeat_table();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    monitor_id INTEGER NOT NULL,
                    status INTEGER NOT NULL,
                    code INTEGER NOT NULL DEFAULT 0,
                    message TEXT NOT NULL DEFAULT '',
                    response_time_ms INTEGER NOT NULL DEFAULT 0,
                    timestamp INTEGER NOT NULL,
                    diagnostics TEXT
                )"
            ),
            (),
        )
        .await?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_monitor_timestamp ON {table}(monitor_id, timestamp DESC)"
            ),
            (),
        )
        .await?;
    }

    Ok(())
}

/// Migration v2: SSL watches with a single mutable certificate snapshot
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ssl_monitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            frequency_minutes INTEGER NOT NULL DEFAULT 60,
            notification_id INTEGER,
            status INTEGER NOT NULL DEFAULT 0,
            last_changed INTEGER,
            info TEXT,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_ssl_monitors_user_id ON ssl_monitors(user_id)", ())
        .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_ssl_monitors_active ON ssl_monitors(active)", ())
        .await?;

    Ok(())
}
