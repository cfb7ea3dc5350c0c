use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, warn};

use super::certificate::CertificateProber;
use super::checker::{ProbeRequest, Prober};
use super::heartbeats::HeartbeatStore;
use super::status::{StateUpdate, StatusEngine, next_state};
use super::types::ProbeOutcome;
use crate::database::Database;
use crate::database::models::{Heartbeat, Monitor, SslInfo};
use crate::events::{EngineEvent, EventBus};
use crate::notifications::{DeliveryReport, NotificationDispatcher};

/// What one monitor tick did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub monitor_id: i64,
    pub heartbeat: Heartbeat,
    pub update: StateUpdate,
    pub delivery: Option<DeliveryReport>,
}

/// What one SSL tick did
#[derive(Debug, Clone)]
pub struct SslTickReport {
    pub monitor_id: i64,
    pub info: Option<SslInfo>,
    pub update: StateUpdate,
    pub message: String,
    pub delivery: Option<DeliveryReport>,
}

/// Probe dispatcher: runs one tick of a monitor or SSL watch end to end
pub struct MonitoringExecutor {
    db: Arc<dyn Database>,
    prober: Arc<dyn Prober>,
    certificates: Arc<dyn CertificateProber>,
    heartbeats: HeartbeatStore,
    status: StatusEngine,
    notifier: NotificationDispatcher,
    events: EventBus,
    default_timeout: Duration,
    ssl_warning_days: i64,
}

impl MonitoringExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn Database>,
        prober: Arc<dyn Prober>,
        certificates: Arc<dyn CertificateProber>,
        notifier: NotificationDispatcher,
        events: EventBus,
        default_timeout: Duration,
        ssl_warning_days: i64,
    ) -> Self {
        Self {
            heartbeats: HeartbeatStore::new(db.clone()),
            status: StatusEngine::new(db.clone()),
            db,
            prober,
            certificates,
            notifier,
            events,
            default_timeout,
            ssl_warning_days,
        }
    }

    /// Tick of a monitor job. The row is re-read so edits and deactivation
    /// are honoured; `None` means the tick was skipped.
    pub async fn run_monitor(&self, id: i64) -> Result<Option<TickReport>> {
        let Some(monitor) = self.db.get_monitor(id).await? else {
            debug!(monitor_id = id, "Monitor vanished, skipping tick");
            return Ok(None);
        };
        if !monitor.active {
            debug!(monitor_id = id, "Monitor inactive, skipping tick");
            return Ok(None);
        }

        self.dispatch(&monitor).await.map(Some)
    }

    /// Probe `monitor`, record the heartbeat, fold the outcome into its status
    /// and notify on a transition.
    pub async fn dispatch(&self, monitor: &Monitor) -> Result<TickReport> {
        let monitor_id = monitor.id.ok_or_else(|| anyhow::anyhow!("Cannot probe an unsaved monitor"))?;
        let monitor_type = monitor.monitor_type;

        let request = ProbeRequest::from_monitor(monitor, self.default_timeout);
        let result = self.prober.probe(&request).await;
        debug!(monitor_id, %monitor_type, outcome = ?result.outcome, code = result.code, "Probe finished");

        let mut heartbeat = Heartbeat::from_probe(monitor_id, &result);
        heartbeat.id = Some(self.heartbeats.record(monitor_type, &heartbeat).await?);

        let update = self
            .status
            .apply(monitor_id, monitor.status, monitor.last_changed, result.outcome, result.timestamp)
            .await?;

        self.events.publish(EngineEvent::Heartbeat {
            user_id: monitor.user_id,
            monitor_id,
            monitor_type,
            heartbeat: heartbeat.clone(),
        });

        let mut delivery = None;
        if let Some(transition) = update.transition {
            self.events.publish(EngineEvent::StatusChanged {
                user_id: monitor.user_id,
                monitor_id,
                name: monitor.name.clone(),
                transition,
            });

            match self.notifier.monitor_transition(monitor, &result, &transition).await {
                Ok(report) => delivery = Some(report),
                Err(e) => warn!(monitor_id, "Could not notify about status change: {:#}", e),
            }
        }

        Ok(TickReport { monitor_id, heartbeat, update, delivery })
    }

    /// Tick of an SSL watch job
    pub async fn run_ssl(&self, id: i64) -> Result<Option<SslTickReport>> {
        let Some(mut monitor) = self.db.get_ssl_monitor(id).await? else {
            debug!(monitor_id = id, "SSL watch vanished, skipping tick");
            return Ok(None);
        };
        if !monitor.active {
            return Ok(None);
        }

        let now = Utc::now();
        let (outcome, info, message) = match self.certificates.fetch(&monitor.url).await {
            Ok(certificate) => {
                let info = certificate.snapshot(now);
                let (outcome, message) = self.classify(&info);
                (outcome, Some(info), message)
            }
            Err(e) => (ProbeOutcome::Failure, None, format!("{e:#}")),
        };

        let update = next_state(monitor.status, monitor.last_changed, outcome, now);
        self.db.update_ssl_info(id, info.as_ref(), update.status, update.last_changed).await?;

        // A failed fetch leaves the previous snapshot in place
        if info.is_some() {
            monitor.info = info.clone();
        }
        monitor.status = update.status;
        monitor.last_changed = update.last_changed;

        self.events.publish(EngineEvent::SslChecked {
            user_id: monitor.user_id,
            monitor_id: id,
            status: update.status,
            info: monitor.info.clone(),
        });

        let mut delivery = None;
        if let Some(transition) = update.transition {
            match self.notifier.ssl_transition(&monitor, &message, &transition).await {
                Ok(report) => delivery = Some(report),
                Err(e) => warn!(monitor_id = id, "Could not notify about certificate change: {:#}", e),
            }
        }

        Ok(Some(SslTickReport { monitor_id: id, info, update, message, delivery }))
    }

    fn classify(&self, info: &SslInfo) -> (ProbeOutcome, String) {
        if info.days_remaining < 0 {
            (ProbeOutcome::Failure, format!("Certificate expired {} days ago", -info.days_remaining))
        } else if info.days_remaining <= self.ssl_warning_days {
            (ProbeOutcome::Failure, format!("Certificate expires in {} days", info.days_remaining))
        } else {
            (ProbeOutcome::Success, format!("Certificate valid for {} days", info.days_remaining))
        }
    }

    pub fn heartbeats(&self) -> &HeartbeatStore {
        &self.heartbeats
    }
}
