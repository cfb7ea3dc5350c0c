/// Orchestrator module - the engine callers talk to
///
/// The engine owns the scheduler and wires the executor, heartbeat store,
/// notification dispatcher and event bus together. Every public operation
/// returns an [`EngineResult`].
///
/// Monitor operations live here; SSL watches, notification groups and the
/// read-time projection have their own submodules.
pub mod groups;
pub mod projection;
pub mod ssl;


use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::models::{Heartbeat, Monitor, MonitorInput};
use crate::database::{self, Database};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::monitoring::certificate::{CertificateProber, TlsCertificateProber};
use crate::monitoring::checker::{NetworkProber, Prober};
use crate::monitoring::heartbeats::DEFAULT_WINDOW_HOURS;
use crate::monitoring::scheduler::{JobAction, JobKey, MAX_FREQUENCY_MINUTES, PendingJob, Scheduler, job_action};
use crate::monitoring::types::MonitorType;
use crate::monitoring::MonitoringExecutor;
use crate::notifications::{
    Branding, EmailTransport, LogTransport, NotificationDirectory, NotificationDispatcher, WebhookTransport,
};

pub use projection::{MonitorOverview, Projector};

/// Minutes between two auto-refresh publications
pub const AUTO_REFRESH_MINUTES: u64 = 10;

/// Tunables the engine reads from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub timezone: String,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub default_timeout: Duration,
    pub ssl_warning_days: i64,
    pub branding: Branding,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            jitter_min_ms: 300,
            jitter_max_ms: 1000,
            default_timeout: Duration::from_secs(10),
            ssl_warning_days: 30,
            branding: Branding::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timezone: config.timezone(),
            jitter_min_ms: config.scheduler.jitter_min_ms,
            jitter_max_ms: config.scheduler.jitter_max_ms,
            default_timeout: Duration::from_secs(config.probes.default_timeout_seconds.max(1)),
            ssl_warning_days: config.probes.ssl_warning_days,
            branding: Branding {
                client_url: config.notifications.client_url.clone(),
                app_name: config.notifications.app_name.clone(),
                app_icon: config.notifications.app_icon.clone(),
            },
        }
    }
}

/// External collaborators the engine drives
#[derive(Clone)]
pub struct Collaborators {
    pub prober: Arc<dyn Prober>,
    pub certificates: Arc<dyn CertificateProber>,
    pub transport: Arc<dyn EmailTransport>,
}

impl Collaborators {
    /// Real network probers and the transport selected by configuration
    pub fn network(config: &Config) -> Self {
        let transport: Arc<dyn EmailTransport> = match &config.notifications.webhook_url {
            Some(url) if !url.trim().is_empty() => Arc::new(WebhookTransport::new(url.trim())),
            _ => Arc::new(LogTransport),
        };

        Self {
            prober: Arc::new(NetworkProber::new()),
            certificates: Arc::new(TlsCertificateProber::new(Duration::from_secs(
                config.probes.default_timeout_seconds.max(1),
            ))),
            transport,
        }
    }
}

struct EngineInner {
    db: Arc<dyn Database>,
    scheduler: Scheduler,
    executor: Arc<MonitoringExecutor>,
    projector: Projector,
    events: EventBus,
    settings: EngineSettings,
}

/// Monitor scheduling and health-state engine. Cloning shares the engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(db: Arc<dyn Database>, collaborators: Collaborators, events: EventBus, settings: EngineSettings) -> Self {
        let notifier = NotificationDispatcher::new(
            NotificationDirectory::new(db.clone()),
            collaborators.transport,
            settings.branding.clone(),
        );
        let executor = Arc::new(MonitoringExecutor::new(
            db.clone(),
            collaborators.prober,
            collaborators.certificates,
            notifier,
            events.clone(),
            settings.default_timeout,
            settings.ssl_warning_days,
        ));

        Self {
            inner: Arc::new(EngineInner {
                projector: Projector::new(db.clone(), executor.heartbeats().clone()),
                scheduler: Scheduler::new(settings.jitter_min_ms, settings.jitter_max_ms),
                db,
                executor,
                events,
                settings,
            }),
        }
    }

    /// Open the configured database and build an engine with network collaborators
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = database::connect(&config.database.path)
            .await
            .context("Failed to initialize database")?;

        Ok(Self::new(db, Collaborators::network(config), EventBus::default(), EngineSettings::from_config(config)))
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn executor(&self) -> &MonitoringExecutor {
        &self.inner.executor
    }

    fn db(&self) -> &dyn Database {
        self.inner.db.as_ref()
    }

    fn timezone(&self) -> &str {
        &self.inner.settings.timezone
    }

    fn monitor_action(&self, id: i64) -> JobAction {
        let executor = self.inner.executor.clone();
        job_action(move || {
            let executor = executor.clone();
            async move { executor.run_monitor(id).await.map(|_| ()) }
        })
    }

    /// Start the recurring job of a freshly created (or re-activated) monitor
    pub fn start_created_monitor(&self, monitor: &Monitor) -> EngineResult<()> {
        let id = monitor.id.ok_or_else(|| EngineError::InvalidInput("monitor has not been saved".into()))?;
        self.inner.scheduler.start(
            JobKey::monitor(&monitor.name, id),
            self.timezone(),
            monitor.frequency_minutes,
            self.monitor_action(id),
        )
    }

    /// Start the job of a stored monitor if it is active, then pause the
    /// resume jitter. An already running job is left alone.
    pub async fn resume_monitor(&self, monitor_id: i64) -> EngineResult<()> {
        let monitor = self.db().get_monitor(monitor_id).await?.ok_or(EngineError::not_found("monitor", monitor_id))?;
        if !monitor.active {
            return Ok(());
        }

        let resumed = self
            .inner
            .scheduler
            .resume(
                JobKey::monitor(&monitor.name, monitor_id),
                self.timezone(),
                monitor.frequency_minutes,
                self.monitor_action(monitor_id),
            )
            .await;
        match resumed {
            Err(EngineError::JobExists(key)) => {
                warn!(job = %key, "Monitor job already running");
                Ok(())
            }
            other => other,
        }
    }

    /// Stop the job of monitor `(name, monitor_id)`. Returns whether one was running.
    pub fn stop_single_background_job(&self, name: &str, monitor_id: i64) -> bool {
        self.inner.scheduler.stop(&JobKey::monitor(name, monitor_id))
    }

    /// Heartbeats of the last `duration_hours` hours, newest first. An unknown
    /// type yields an empty list.
    pub async fn get_heartbeats(
        &self,
        monitor_type: &str,
        monitor_id: i64,
        duration_hours: Option<i64>,
    ) -> EngineResult<Vec<Heartbeat>> {
        let monitor_type: MonitorType = match monitor_type.parse() {
            Ok(t) => t,
            Err(e) => {
                warn!(monitor_id, "Heartbeat query skipped: {}", e);
                return Ok(Vec::new());
            }
        };

        Ok(self
            .inner
            .executor
            .heartbeats()
            .query(monitor_type, monitor_id, duration_hours.unwrap_or(DEFAULT_WINDOW_HOURS))
            .await?)
    }

    async fn check_group(&self, user_id: i64, notification_id: Option<i64>) -> EngineResult<()> {
        let Some(group_id) = notification_id else {
            return Ok(());
        };
        match self.db().get_notification_group(group_id).await? {
            Some(group) if group.user_id == user_id => Ok(()),
            _ => Err(EngineError::InvalidInput(format!("notification group {group_id} does not exist"))),
        }
    }

    /// Zero is raised to one minute when the input is applied
    fn check_frequency(frequency_minutes: u64) -> EngineResult<()> {
        if frequency_minutes > MAX_FREQUENCY_MINUTES {
            return Err(EngineError::InvalidInput(format!(
                "frequency must be at most {MAX_FREQUENCY_MINUTES} minutes"
            )));
        }
        Ok(())
    }

    fn validate_monitor(input: &MonitorInput) -> EngineResult<()> {
        if input.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("monitor name is required".into()));
        }
        if input.url.trim().is_empty() {
            return Err(EngineError::InvalidInput("monitor target is required".into()));
        }
        Self::check_frequency(input.frequency_minutes)?;
        if input.monitor_type == MonitorType::Tcp && input.port.unwrap_or_default() == 0 {
            return Err(EngineError::InvalidInput("tcp monitors need a port".into()));
        }
        Ok(())
    }

    /// Store a monitor and, if active, start its job
    pub async fn create_monitor(&self, user_id: i64, input: MonitorInput) -> EngineResult<Monitor> {
        Self::validate_monitor(&input)?;
        self.check_group(user_id, input.notification_id).await?;

        let mut monitor = Monitor::from_input(user_id, input);
        monitor.id = Some(self.db().insert_monitor(&monitor).await?);
        info!(monitor_id = monitor.id, user_id, monitor_type = %monitor.monitor_type, "Created monitor");

        if monitor.active {
            self.start_created_monitor(&monitor)?;
        }
        Ok(monitor)
    }

    pub async fn get_user_monitors(&self, user_id: i64, active_only: bool) -> EngineResult<Vec<Monitor>> {
        Ok(self.db().get_user_monitors(user_id, active_only).await?)
    }

    /// Monitor `id` if it belongs to `user_id`
    pub async fn get_monitor(&self, user_id: i64, id: i64) -> EngineResult<Monitor> {
        match self.db().get_monitor(id).await? {
            Some(monitor) if monitor.user_id == user_id => Ok(monitor),
            _ => Err(EngineError::not_found("monitor", id)),
        }
    }

    /// Activate or pause a monitor. Returns the user's monitors afterwards.
    pub async fn toggle_monitor(&self, user_id: i64, id: i64, active: bool) -> EngineResult<Vec<Monitor>> {
        let monitor = self.get_monitor(user_id, id).await?;
        self.db().set_monitor_active(id, user_id, active).await?;

        if active {
            self.resume_monitor(id).await?;
        } else {
            self.stop_single_background_job(&monitor.name, id);
        }

        self.get_user_monitors(user_id, false).await
    }

    /// Replace a monitor's editable fields. Its job is restarted so a new
    /// name or frequency takes effect.
    pub async fn update_monitor(&self, user_id: i64, id: i64, input: MonitorInput) -> EngineResult<Monitor> {
        Self::validate_monitor(&input)?;
        self.check_group(user_id, input.notification_id).await?;

        let previous = self.get_monitor(user_id, id).await?;
        self.stop_single_background_job(&previous.name, id);

        let mut monitor = previous.clone();
        monitor.apply_input(input);
        if let Err(e) = self.db().update_monitor(&monitor).await {
            if previous.active {
                if let Err(restart) = self.start_created_monitor(&previous) {
                    warn!(monitor_id = id, "Could not restart job after failed update: {}", restart);
                }
            }
            return Err(e.into());
        }

        if monitor.active {
            self.start_created_monitor(&monitor)?;
        }
        Ok(monitor)
    }

    /// Stop the job, purge the heartbeats and remove the monitor
    pub async fn delete_monitor(&self, user_id: i64, id: i64) -> EngineResult<Vec<Monitor>> {
        let monitor = self.get_monitor(user_id, id).await?;
        self.stop_single_background_job(&monitor.name, id);

        self.inner.executor.heartbeats().purge(id, monitor.monitor_type).await?;
        self.db().delete_monitor(id).await?;
        info!(monitor_id = id, user_id, "Deleted monitor");

        self.get_user_monitors(user_id, false).await
    }

    /// Per monitor: notification group, 24h uptime and the latest 16 heartbeats
    pub async fn get_user_active_monitors(&self, user_id: i64) -> EngineResult<Vec<MonitorOverview>> {
        Ok(self.inner.projector.user_active_monitors(user_id).await?)
    }

    /// Start jobs for every active monitor, jittered
    pub async fn start_monitors(&self) -> EngineResult<usize> {
        let pending = self
            .db()
            .get_active_monitors()
            .await?
            .into_iter()
            .filter_map(|monitor| {
                let id = monitor.id?;
                Some(PendingJob {
                    key: JobKey::monitor(&monitor.name, id),
                    frequency_minutes: monitor.frequency_minutes,
                    action: self.monitor_action(id),
                })
            })
            .collect();

        let started = self.inner.scheduler.resume_all(self.timezone(), pending).await;
        info!("Resumed {} monitor jobs", started);
        Ok(started)
    }

    /// Resume every active monitor and SSL watch
    pub async fn resume_all(&self) -> EngineResult<usize> {
        let monitors = self.start_monitors().await?;
        let watches = self.start_ssl_monitors().await?;
        Ok(monitors + watches)
    }

    /// Publish the user's monitor overview every ten minutes
    pub fn enable_auto_refresh(&self, user_id: i64, username: &str) -> EngineResult<()> {
        let projector = self.inner.projector.clone();
        let events = self.inner.events.clone();

        let action = job_action(move || {
            let projector = projector.clone();
            let events = events.clone();
            async move {
                let monitors = projector.user_active_monitors(user_id).await?;
                events.publish(EngineEvent::MonitorsUpdated { user_id, monitors });
                Ok(())
            }
        });

        match self.inner.scheduler.start(JobKey::refresh(username, user_id), self.timezone(), AUTO_REFRESH_MINUTES, action) {
            Err(EngineError::JobExists(_)) => Ok(()),
            other => other,
        }
    }

    pub fn disable_auto_refresh(&self, user_id: i64, username: &str) -> bool {
        self.inner.scheduler.stop(&JobKey::refresh(username, user_id))
    }

    /// Stop every job
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }
}
