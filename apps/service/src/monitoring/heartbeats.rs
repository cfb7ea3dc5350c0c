use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use super::types::MonitorType;
use crate::database::Database;
use crate::database::models::Heartbeat;

/// Default look-back window for heartbeat queries
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Append-only heartbeat series, one per monitor type
///
/// All types share this contract so callers never care which table a
/// heartbeat lands in.
#[derive(Clone)]
pub struct HeartbeatStore {
    db: Arc<dyn Database>,
}

impl HeartbeatStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn record(&self, monitor_type: MonitorType, heartbeat: &Heartbeat) -> Result<i64> {
        self.db.insert_heartbeat(monitor_type, heartbeat).await
    }

    /// Heartbeats from the last `duration_hours`, newest first. Windows
    /// reaching past the representable range cover the whole series.
    pub async fn query(&self, monitor_type: MonitorType, monitor_id: i64, duration_hours: i64) -> Result<Vec<Heartbeat>> {
        let now = Utc::now();
        let since = window_start(now, duration_hours);
        self.db.get_heartbeats_between(monitor_type, monitor_id, since, now).await
    }

    pub async fn purge(&self, monitor_id: i64, monitor_type: MonitorType) -> Result<u64> {
        let removed = self.db.delete_heartbeats(monitor_type, monitor_id).await?;
        tracing::debug!(monitor_id, %monitor_type, removed, "Purged heartbeats");
        Ok(removed)
    }
}

fn window_start(now: DateTime<Utc>, duration_hours: i64) -> DateTime<Utc> {
    Duration::try_hours(duration_hours.max(0))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
