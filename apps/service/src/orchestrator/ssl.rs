use tracing::{info, warn};

use super::Engine;
use crate::database::models::{SslMonitor, SslMonitorInput};
use crate::error::{EngineError, EngineResult};
use crate::monitoring::scheduler::{JobAction, JobKey, PendingJob, job_action};

impl Engine {
    fn ssl_action(&self, id: i64) -> JobAction {
        let executor = self.inner.executor.clone();
        job_action(move || {
            let executor = executor.clone();
            async move { executor.run_ssl(id).await.map(|_| ()) }
        })
    }

    fn start_ssl_job(&self, monitor: &SslMonitor) -> EngineResult<()> {
        let id = monitor.id.ok_or_else(|| EngineError::InvalidInput("SSL watch has not been saved".into()))?;
        self.inner.scheduler.start(
            JobKey::ssl(&monitor.name, id),
            self.timezone(),
            monitor.frequency_minutes,
            self.ssl_action(id),
        )
    }

    pub fn stop_ssl_job(&self, name: &str, monitor_id: i64) -> bool {
        self.inner.scheduler.stop(&JobKey::ssl(name, monitor_id))
    }

    fn validate_ssl(input: &SslMonitorInput) -> EngineResult<()> {
        if input.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("SSL watch name is required".into()));
        }
        if input.url.trim().is_empty() {
            return Err(EngineError::InvalidInput("SSL watch target is required".into()));
        }
        Self::check_frequency(input.frequency_minutes)
    }

    pub async fn create_ssl_monitor(&self, user_id: i64, input: SslMonitorInput) -> EngineResult<SslMonitor> {
        Self::validate_ssl(&input)?;
        self.check_group(user_id, input.notification_id).await?;

        let mut monitor = SslMonitor::from_input(user_id, input);
        monitor.id = Some(self.db().insert_ssl_monitor(&monitor).await?);
        info!(monitor_id = monitor.id, user_id, "Created SSL watch");

        if monitor.active {
            self.start_ssl_job(&monitor)?;
        }
        Ok(monitor)
    }

    pub async fn get_user_ssl_monitors(&self, user_id: i64, active_only: bool) -> EngineResult<Vec<SslMonitor>> {
        Ok(self.db().get_user_ssl_monitors(user_id, active_only).await?)
    }

    pub async fn get_ssl_monitor(&self, user_id: i64, id: i64) -> EngineResult<SslMonitor> {
        match self.db().get_ssl_monitor(id).await? {
            Some(monitor) if monitor.user_id == user_id => Ok(monitor),
            _ => Err(EngineError::not_found("SSL watch", id)),
        }
    }

    /// Start the job of a stored SSL watch if it is active, then pause the
    /// resume jitter
    pub async fn resume_ssl_monitor(&self, monitor_id: i64) -> EngineResult<()> {
        let monitor =
            self.db().get_ssl_monitor(monitor_id).await?.ok_or(EngineError::not_found("SSL watch", monitor_id))?;
        if !monitor.active {
            return Ok(());
        }

        let resumed = self
            .inner
            .scheduler
            .resume(
                JobKey::ssl(&monitor.name, monitor_id),
                self.timezone(),
                monitor.frequency_minutes,
                self.ssl_action(monitor_id),
            )
            .await;
        match resumed {
            Err(EngineError::JobExists(key)) => {
                warn!(job = %key, "SSL job already running");
                Ok(())
            }
            other => other,
        }
    }

    /// Pausing keeps the last certificate snapshot
    pub async fn toggle_ssl_monitor(&self, user_id: i64, id: i64, active: bool) -> EngineResult<Vec<SslMonitor>> {
        let monitor = self.get_ssl_monitor(user_id, id).await?;
        self.db().set_ssl_monitor_active(id, user_id, active).await?;

        if active {
            self.resume_ssl_monitor(id).await?;
        } else {
            self.stop_ssl_job(&monitor.name, id);
        }

        self.get_user_ssl_monitors(user_id, false).await
    }

    pub async fn update_ssl_monitor(&self, user_id: i64, id: i64, input: SslMonitorInput) -> EngineResult<SslMonitor> {
        Self::validate_ssl(&input)?;
        self.check_group(user_id, input.notification_id).await?;

        let previous = self.get_ssl_monitor(user_id, id).await?;
        self.stop_ssl_job(&previous.name, id);

        let mut monitor = previous.clone();
        monitor.apply_input(input);
        if let Err(e) = self.db().update_ssl_monitor(&monitor).await {
            if previous.active {
                if let Err(restart) = self.start_ssl_job(&previous) {
                    warn!(monitor_id = id, "Could not restart SSL job after failed update: {}", restart);
                }
            }
            return Err(e.into());
        }

        if monitor.active {
            self.start_ssl_job(&monitor)?;
        }
        Ok(monitor)
    }

    pub async fn delete_ssl_monitor(&self, user_id: i64, id: i64) -> EngineResult<Vec<SslMonitor>> {
        let monitor = self.get_ssl_monitor(user_id, id).await?;
        self.stop_ssl_job(&monitor.name, id);
        self.db().delete_ssl_monitor(id).await?;
        info!(monitor_id = id, user_id, "Deleted SSL watch");

        self.get_user_ssl_monitors(user_id, false).await
    }

    /// Start jobs for every active SSL watch, jittered
    pub async fn start_ssl_monitors(&self) -> EngineResult<usize> {
        let pending = self
            .db()
            .get_active_ssl_monitors()
            .await?
            .into_iter()
            .filter_map(|monitor| {
                let id = monitor.id?;
                Some(PendingJob {
                    key: JobKey::ssl(&monitor.name, id),
                    frequency_minutes: monitor.frequency_minutes,
                    action: self.ssl_action(id),
                })
            })
            .collect();

        let started = self.inner.scheduler.resume_all(self.timezone(), pending).await;
        info!("Resumed {} SSL jobs", started);
        Ok(started)
    }
}
