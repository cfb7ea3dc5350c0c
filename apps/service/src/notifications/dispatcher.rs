use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::transport::{EmailLocals, EmailTransport};
use crate::database::Database;
use crate::database::models::{Monitor, SslMonitor};
use crate::monitoring::status::Transition;
use crate::monitoring::types::ProbeResult;

pub const ERROR_STATUS: &str = "errorStatus";
pub const SUCCESS_STATUS: &str = "successStatus";
pub const SSL_EXPIRY: &str = "sslExpiry";
pub const SSL_RECOVERED: &str = "sslRecovered";

/// Values shared by every outgoing message
#[derive(Debug, Clone, Default)]
pub struct Branding {
    pub client_url: String,
    pub app_name: String,
    pub app_icon: String,
}

impl Branding {
    fn locals(&self) -> EmailLocals {
        EmailLocals::from([
            ("appLink".to_string(), self.client_url.clone()),
            ("appName".to_string(), self.app_name.clone()),
            ("appIcon".to_string(), self.app_icon.clone()),
        ])
    }
}

/// Resolves notification groups to addresses
#[derive(Clone)]
pub struct NotificationDirectory {
    db: Arc<dyn Database>,
}

impl NotificationDirectory {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Addresses of a group; empty for no group or a group that no longer exists
    pub async fn addresses(&self, group_id: Option<i64>) -> Result<Vec<String>> {
        let Some(group_id) = group_id else {
            return Ok(Vec::new());
        };

        match self.db.get_notification_group(group_id).await? {
            Some(group) => Ok(group.emails.into_iter().filter(|e| !e.trim().is_empty()).collect()),
            None => {
                debug!(group_id, "Notification group no longer exists");
                Ok(Vec::new())
            }
        }
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<String>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Sends templated messages to every address of a group, one at a time
#[derive(Clone)]
pub struct NotificationDispatcher {
    directory: NotificationDirectory,
    transport: Arc<dyn EmailTransport>,
    branding: Branding,
}

impl NotificationDispatcher {
    pub fn new(directory: NotificationDirectory, transport: Arc<dyn EmailTransport>, branding: Branding) -> Self {
        Self { directory, transport, branding }
    }

    /// Deliver `template` to the group. Failed sends are logged and skipped.
    pub async fn notify(&self, group_id: Option<i64>, template: &str, locals: &EmailLocals) -> Result<DeliveryReport> {
        let addresses = self.directory.addresses(group_id).await?;
        if addresses.is_empty() {
            debug!(?group_id, template, "No recipients for notification");
            return Ok(DeliveryReport::default());
        }

        let mut report = DeliveryReport::default();
        for address in addresses {
            match self.transport.send(template, &address, locals).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(to = %address, template, "Email delivery failed: {}", e);
                    report.failed.push(address);
                }
            }
        }

        info!(template, delivered = report.delivered, failed = report.failed.len(), "Notification sent");
        Ok(report)
    }

    /// Alert the monitor's group about an UP/DOWN edge
    pub async fn monitor_transition(
        &self,
        monitor: &Monitor,
        result: &ProbeResult,
        transition: &Transition,
    ) -> Result<DeliveryReport> {
        let template = if transition.is_recovery() { SUCCESS_STATUS } else { ERROR_STATUS };

        let mut locals = self.branding.locals();
        locals.extend([
            ("monitorName".to_string(), monitor.name.clone()),
            ("monitorType".to_string(), monitor.monitor_type.to_string()),
            ("target".to_string(), monitor.url.clone()),
            ("statusCode".to_string(), result.code.to_string()),
            ("message".to_string(), result.message.clone()),
            ("responseTime".to_string(), result.response_time_ms.to_string()),
            ("timestamp".to_string(), transition.at.to_rfc3339()),
        ]);

        self.notify(monitor.notification_id, template, &locals).await
    }

    /// Alert the watch's group about an expiry edge
    pub async fn ssl_transition(
        &self,
        monitor: &SslMonitor,
        message: &str,
        transition: &Transition,
    ) -> Result<DeliveryReport> {
        let template = if transition.is_recovery() { SSL_RECOVERED } else { SSL_EXPIRY };

        let mut locals = self.branding.locals();
        locals.extend([
            ("monitorName".to_string(), monitor.name.clone()),
            ("monitorType".to_string(), "ssl".to_string()),
            ("target".to_string(), monitor.url.clone()),
            ("message".to_string(), message.to_string()),
            ("timestamp".to_string(), transition.at.to_rfc3339()),
        ]);
        if let Some(info) = &monitor.info {
            locals.insert("daysRemaining".to_string(), info.days_remaining.to_string());
            locals.insert("validTo".to_string(), info.valid_to.to_rfc3339());
        }

        self.notify(monitor.notification_id, template, &locals).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connect;
    use crate::database::models::NotificationGroup;
    use crate::notifications::transport::RecordingTransport;
    use tempfile::TempDir;

    async fn setup(transport: Arc<RecordingTransport>) -> (NotificationDispatcher, Arc<dyn Database>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = connect(dir.path().join("notify.db")).await.unwrap();
        let dispatcher = NotificationDispatcher::new(
            NotificationDirectory::new(db.clone()),
            transport,
            Branding { client_url: "https://status.local".into(), app_name: "Heartwatch".into(), app_icon: String::new() },
        );
        (dispatcher, db, dir)
    }

    #[tokio::test]
    async fn failed_address_does_not_stop_the_rest() {
        let transport = Arc::new(RecordingTransport::failing_for(&["b@example.com"]));
        let (dispatcher, db, _dir) = setup(transport.clone()).await;
        let group = NotificationGroup::new(
            1,
            "ops".into(),
            vec!["a@example.com".into(), "b@example.com".into(), "c@example.com".into()],
        );
        let group_id = db.insert_notification_group(&group).await.unwrap();

        let report = dispatcher.notify(Some(group_id), ERROR_STATUS, &EmailLocals::new()).await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec!["b@example.com".to_string()]);
        assert_eq!(report.attempted(), 3);
        let to: Vec<_> = transport.sent().into_iter().map(|m| m.address).collect();
        assert_eq!(to, vec!["a@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn missing_group_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let (dispatcher, _db, _dir) = setup(transport.clone()).await;

        assert_eq!(dispatcher.notify(None, ERROR_STATUS, &EmailLocals::new()).await.unwrap().attempted(), 0);
        assert_eq!(dispatcher.notify(Some(404), ERROR_STATUS, &EmailLocals::new()).await.unwrap().attempted(), 0);
        assert!(transport.sent().is_empty());
    }
}
