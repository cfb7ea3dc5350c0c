use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::database::Database;
use crate::database::models::{Heartbeat, Monitor, NotificationGroup};
use crate::monitoring::heartbeats::{DEFAULT_WINDOW_HOURS, HeartbeatStore};
use crate::monitoring::status::uptime_percentage;

/// Heartbeats attached to each overview entry
pub const RECENT_HEARTBEATS: usize = 16;

/// A monitor with its read-time extras. Never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorOverview {
    #[serde(flatten)]
    pub monitor: Monitor,
    pub uptime: u8,
    pub heartbeats: Vec<Heartbeat>,
    pub notifications: Option<NotificationGroup>,
}

/// Builds [`MonitorOverview`]s
#[derive(Clone)]
pub struct Projector {
    db: Arc<dyn Database>,
    heartbeats: HeartbeatStore,
}

impl Projector {
    pub fn new(db: Arc<dyn Database>, heartbeats: HeartbeatStore) -> Self {
        Self { db, heartbeats }
    }

    pub async fn overview(&self, monitor: Monitor) -> Result<MonitorOverview> {
        let notifications = match monitor.notification_id {
            Some(group_id) => self.db.get_notification_group(group_id).await?,
            None => None,
        };

        let mut heartbeats = match monitor.id {
            Some(id) => self.heartbeats.query(monitor.monitor_type, id, DEFAULT_WINDOW_HOURS).await?,
            None => Vec::new(),
        };
        let uptime = uptime_percentage(&heartbeats);
        heartbeats.truncate(RECENT_HEARTBEATS);

        Ok(MonitorOverview { monitor, uptime, heartbeats, notifications })
    }

    pub async fn user_active_monitors(&self, user_id: i64) -> Result<Vec<MonitorOverview>> {
        let monitors = self.db.get_user_monitors(user_id, true).await?;
        let mut overviews = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            overviews.push(self.overview(monitor).await?);
        }
        Ok(overviews)
    }
}
