use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use tracing::warn;

use super::models::{
    Heartbeat, MONITOR_COLUMNS, Monitor, NotificationGroup, SSL_MONITOR_COLUMNS, SslInfo,
    SslMonitor, timestamp_to_i64,
};
use crate::monitoring::types::{MonitorStatus, MonitorType};
use crate::pool::LibsqlPool;

/// Database trait for abstracting persistence of monitors, heartbeats,
/// SSL watches and notification groups
#[async_trait]
pub trait Database: Send + Sync {
    /// Insert a monitor and return its id
    async fn insert_monitor(&self, monitor: &Monitor) -> Result<i64>;

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>>;

    /// Monitors of one user, newest first
    async fn get_user_monitors(&self, user_id: i64, active_only: bool) -> Result<Vec<Monitor>>;

    /// Active monitors of every user, newest first
    async fn get_active_monitors(&self) -> Result<Vec<Monitor>>;

    /// Persist the editable fields of a monitor (not status)
    async fn update_monitor(&self, monitor: &Monitor) -> Result<()>;

    /// Flip `active` for a monitor owned by `user_id`; false when nothing matched
    async fn set_monitor_active(&self, id: i64, user_id: i64, active: bool) -> Result<bool>;

    /// Write status and last change time in a single statement
    async fn update_monitor_status(
        &self,
        id: i64,
        status: MonitorStatus,
        last_changed: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn delete_monitor(&self, id: i64) -> Result<bool>;

    /// Append a heartbeat to the table of `monitor_type`
    async fn insert_heartbeat(&self, monitor_type: MonitorType, heartbeat: &Heartbeat) -> Result<i64>;

    /// Heartbeats stamped within `[since, until]`, newest first
    async fn get_heartbeats_between(
        &self,
        monitor_type: MonitorType,
        monitor_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>>;

    /// Delete every heartbeat of a monitor, returns the number removed
    async fn delete_heartbeats(&self, monitor_type: MonitorType, monitor_id: i64) -> Result<u64>;

    async fn insert_ssl_monitor(&self, monitor: &SslMonitor) -> Result<i64>;

    async fn get_ssl_monitor(&self, id: i64) -> Result<Option<SslMonitor>>;

    async fn get_user_ssl_monitors(&self, user_id: i64, active_only: bool) -> Result<Vec<SslMonitor>>;

    async fn get_active_ssl_monitors(&self) -> Result<Vec<SslMonitor>>;

    async fn update_ssl_monitor(&self, monitor: &SslMonitor) -> Result<()>;

    async fn set_ssl_monitor_active(&self, id: i64, user_id: i64, active: bool) -> Result<bool>;

    /// Overwrite the certificate snapshot together with the derived status.
    /// `None` keeps the previous snapshot.
    async fn update_ssl_info(
        &self,
        id: i64,
        info: Option<&SslInfo>,
        status: MonitorStatus,
        last_changed: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn delete_ssl_monitor(&self, id: i64) -> Result<bool>;

    async fn insert_notification_group(&self, group: &NotificationGroup) -> Result<i64>;

    async fn get_notification_group(&self, id: i64) -> Result<Option<NotificationGroup>>;

    async fn get_user_notification_groups(&self, user_id: i64) -> Result<Vec<NotificationGroup>>;

    async fn update_notification_group(&self, group: &NotificationGroup) -> Result<()>;

    async fn delete_notification_group(&self, id: i64) -> Result<bool>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn query_monitors(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut monitors = Vec::new();

        while let Some(row) = rows.next().await? {
            // A row we cannot decode (e.g. an unknown type) must not hide the others
            match Monitor::from_row(&row) {
                Ok(monitor) => monitors.push(monitor),
                Err(e) => warn!("Skipping unreadable monitor row: {:#}", e),
            }
        }

        Ok(monitors)
    }

    async fn query_ssl_monitors(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SslMonitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut monitors = Vec::new();

        while let Some(row) = rows.next().await? {
            match SslMonitor::from_row(&row) {
                Ok(monitor) => monitors.push(monitor),
                Err(e) => warn!("Skipping unreadable SSL monitor row: {:#}", e),
            }
        }

        Ok(monitors)
    }
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn insert_monitor(&self, monitor: &Monitor) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitors (user_id, name, monitor_type, url, port, timeout_seconds, method, headers, body, http_auth_method, basic_auth_user, basic_auth_pass, bearer_token, redirects, frequency_minutes, active, status, last_changed, notification_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                monitor.user_id,
                monitor.name.clone(),
                monitor.monitor_type.as_str(),
                monitor.url.clone(),
                monitor.port.map(|v| v as i64),
                monitor.timeout_seconds.map(|v| v as i64),
                monitor.method.clone(),
                monitor.headers.clone(),
                monitor.body.clone(),
                monitor.http_auth_method.clone(),
                monitor.basic_auth_user.clone(),
                monitor.basic_auth_pass.clone(),
                monitor.bearer_token.clone(),
                monitor.redirects as i64,
                monitor.frequency_minutes as i64,
                if monitor.active { 1 } else { 0 },
                monitor.status.code(),
                monitor.last_changed.map(timestamp_to_i64),
                monitor.notification_id,
                timestamp_to_i64(monitor.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"), params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Monitor::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_user_monitors(&self, user_id: i64, active_only: bool) -> Result<Vec<Monitor>> {
        let sql = if active_only {
            format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE user_id = ? AND active = 1 ORDER BY created_at DESC, id DESC")
        } else {
            format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE user_id = ? ORDER BY created_at DESC, id DESC")
        };
        self.query_monitors(&sql, params![user_id]).await
    }

    async fn get_active_monitors(&self) -> Result<Vec<Monitor>> {
        self.query_monitors(
            &format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE active = 1 ORDER BY created_at DESC, id DESC"),
            (),
        )
        .await
    }

    async fn update_monitor(&self, monitor: &Monitor) -> Result<()> {
        let Some(id) = monitor.id else {
            anyhow::bail!("Cannot update a monitor that has not been saved");
        };

        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET name = ?, monitor_type = ?, url = ?, port = ?, timeout_seconds = ?, method = ?, headers = ?, body = ?, http_auth_method = ?, basic_auth_user = ?, basic_auth_pass = ?, bearer_token = ?, redirects = ?, frequency_minutes = ?, active = ?, notification_id = ? WHERE id = ?",
            params![
                monitor.name.clone(),
                monitor.monitor_type.as_str(),
                monitor.url.clone(),
                monitor.port.map(|v| v as i64),
                monitor.timeout_seconds.map(|v| v as i64),
                monitor.method.clone(),
                monitor.headers.clone(),
                monitor.body.clone(),
                monitor.http_auth_method.clone(),
                monitor.basic_auth_user.clone(),
                monitor.basic_auth_pass.clone(),
                monitor.bearer_token.clone(),
                monitor.redirects as i64,
                monitor.frequency_minutes as i64,
                if monitor.active { 1 } else { 0 },
                monitor.notification_id,
                id
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_monitor_active(&self, id: i64, user_id: i64, active: bool) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE monitors SET active = ? WHERE id = ? AND user_id = ?",
                params![if active { 1 } else { 0 }, id, user_id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn update_monitor_status(
        &self,
        id: i64,
        status: MonitorStatus,
        last_changed: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE monitors SET status = ?, last_changed = ? WHERE id = ?",
            params![status.code(), last_changed.map(timestamp_to_i64), id],
        )
        .await?;
        Ok(())
    }

    async fn delete_monitor(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn.execute("DELETE FROM monitors WHERE id = ?", params![id]).await?;
        Ok(deleted > 0)
    }

    async fn insert_heartbeat(&self, monitor_type: MonitorType, heartbeat: &Heartbeat) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            &format!(
                "INSERT INTO {} (monitor_id, status, code, message, response_time_ms, timestamp, diagnostics) VALUES (?, ?, ?, ?, ?, ?, ?)",
                monitor_type.heartbeat_table()
            ),
            params![
                heartbeat.monitor_id,
                heartbeat.status.code(),
                heartbeat.code,
                heartbeat.message.clone(),
                heartbeat.response_time_ms as i64,
                timestamp_to_i64(heartbeat.timestamp),
                heartbeat.diagnostics.clone()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_heartbeats_between(
        &self,
        monitor_type: MonitorType,
        monitor_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Heartbeat>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT id, monitor_id, status, code, message, response_time_ms, timestamp, diagnostics FROM {} WHERE monitor_id = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp DESC, id DESC",
                    monitor_type.heartbeat_table()
                ),
                params![monitor_id, timestamp_to_i64(since), timestamp_to_i64(until)],
            )
            .await?;

        let mut heartbeats = Vec::new();
        while let Some(row) = rows.next().await? {
            heartbeats.push(Heartbeat::from_row(&row)?);
        }

        Ok(heartbeats)
    }

    async fn delete_heartbeats(&self, monitor_type: MonitorType, monitor_id: i64) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                &format!("DELETE FROM {} WHERE monitor_id = ?", monitor_type.heartbeat_table()),
                params![monitor_id],
            )
            .await?;
        Ok(deleted)
    }

    async fn insert_ssl_monitor(&self, monitor: &SslMonitor) -> Result<i64> {
        let conn = self.get_conn().await?;
        let info = monitor.info.as_ref().map(serde_json::to_string).transpose()?;
        conn.execute(
            "INSERT INTO ssl_monitors (user_id, name, url, active, frequency_minutes, notification_id, status, last_changed, info, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                monitor.user_id,
                monitor.name.clone(),
                monitor.url.clone(),
                if monitor.active { 1 } else { 0 },
                monitor.frequency_minutes as i64,
                monitor.notification_id,
                monitor.status.code(),
                monitor.last_changed.map(timestamp_to_i64),
                info,
                timestamp_to_i64(monitor.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_ssl_monitor(&self, id: i64) -> Result<Option<SslMonitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {SSL_MONITOR_COLUMNS} FROM ssl_monitors WHERE id = ?"), params![id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(SslMonitor::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_user_ssl_monitors(&self, user_id: i64, active_only: bool) -> Result<Vec<SslMonitor>> {
        let sql = if active_only {
            format!("SELECT {SSL_MONITOR_COLUMNS} FROM ssl_monitors WHERE user_id = ? AND active = 1 ORDER BY created_at DESC, id DESC")
        } else {
            format!("SELECT {SSL_MONITOR_COLUMNS} FROM ssl_monitors WHERE user_id = ? ORDER BY created_at DESC, id DESC")
        };
        self.query_ssl_monitors(&sql, params![user_id]).await
    }

    async fn get_active_ssl_monitors(&self) -> Result<Vec<SslMonitor>> {
        self.query_ssl_monitors(
            &format!("SELECT {SSL_MONITOR_COLUMNS} FROM ssl_monitors WHERE active = 1 ORDER BY created_at DESC, id DESC"),
            (),
        )
        .await
    }

    async fn update_ssl_monitor(&self, monitor: &SslMonitor) -> Result<()> {
        let Some(id) = monitor.id else {
            anyhow::bail!("Cannot update an SSL monitor that has not been saved");
        };

        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE ssl_monitors SET name = ?, url = ?, active = ?, frequency_minutes = ?, notification_id = ? WHERE id = ?",
            params![
                monitor.name.clone(),
                monitor.url.clone(),
                if monitor.active { 1 } else { 0 },
                monitor.frequency_minutes as i64,
                monitor.notification_id,
                id
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_ssl_monitor_active(&self, id: i64, user_id: i64, active: bool) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE ssl_monitors SET active = ? WHERE id = ? AND user_id = ?",
                params![if active { 1 } else { 0 }, id, user_id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn update_ssl_info(
        &self,
        id: i64,
        info: Option<&SslInfo>,
        status: MonitorStatus,
        last_changed: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        match info {
            Some(info) => {
                conn.execute(
                    "UPDATE ssl_monitors SET info = ?, status = ?, last_changed = ? WHERE id = ?",
                    params![
                        serde_json::to_string(info)?,
                        status.code(),
                        last_changed.map(timestamp_to_i64),
                        id
                    ],
                )
                .await?;
            }
            None => {
                conn.execute(
                    "UPDATE ssl_monitors SET status = ?, last_changed = ? WHERE id = ?",
                    params![status.code(), last_changed.map(timestamp_to_i64), id],
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn delete_ssl_monitor(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn.execute("DELETE FROM ssl_monitors WHERE id = ?", params![id]).await?;
        Ok(deleted > 0)
    }

    async fn insert_notification_group(&self, group: &NotificationGroup) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notifications (user_id, group_name, emails, created_at) VALUES (?, ?, ?, ?)",
            params![
                group.user_id,
                group.group_name.clone(),
                serde_json::to_string(&group.emails)?,
                timestamp_to_i64(group.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_notification_group(&self, id: i64) -> Result<Option<NotificationGroup>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, group_name, emails, created_at FROM notifications WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(NotificationGroup::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_user_notification_groups(&self, user_id: i64) -> Result<Vec<NotificationGroup>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, group_name, emails, created_at FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC",
                params![user_id],
            )
            .await?;

        let mut groups = Vec::new();
        while let Some(row) = rows.next().await? {
            groups.push(NotificationGroup::from_row(&row)?);
        }

        Ok(groups)
    }

    async fn update_notification_group(&self, group: &NotificationGroup) -> Result<()> {
        let Some(id) = group.id else {
            anyhow::bail!("Cannot update a notification group that has not been saved");
        };

        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE notifications SET group_name = ?, emails = ? WHERE id = ?",
            params![group.group_name.clone(), serde_json::to_string(&group.emails)?, id],
        )
        .await?;
        Ok(())
    }

    async fn delete_notification_group(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn.execute("DELETE FROM notifications WHERE id = ?", params![id]).await?;
        Ok(deleted > 0)
    }
}
