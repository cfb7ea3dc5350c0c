use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, EngineResult};

/// Lower bound of the per-tick watchdog
const MIN_WATCHDOG: Duration = Duration::from_secs(30);

/// Longest accepted job period, one year
pub const MAX_FREQUENCY_MINUTES: u64 = 60 * 24 * 365;

/// Key namespace, so a monitor and an SSL watch sharing a name and id never collide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Monitor,
    Ssl,
    Refresh,
}

/// Stable identity of a recurring job: lowercased name plus owning id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub kind: JobKind,
    pub name: String,
    pub id: i64,
}

impl JobKey {
    pub fn new(kind: JobKind, name: &str, id: i64) -> Self {
        Self { kind, name: name.trim().to_lowercase(), id }
    }

    pub fn monitor(name: &str, id: i64) -> Self {
        Self::new(JobKind::Monitor, name, id)
    }

    pub fn ssl(name: &str, id: i64) -> Self {
        Self::new(JobKind::Ssl, name, id)
    }

    pub fn refresh(name: &str, id: i64) -> Self {
        Self::new(JobKind::Refresh, name, id)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.id)
    }
}

/// Work performed on every tick of a job
pub type JobAction = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`JobAction`]
pub fn job_action<F, Fut>(f: F) -> JobAction
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// A job waiting to be started by [`Scheduler::resume_all`]
pub struct PendingJob {
    pub key: JobKey,
    pub frequency_minutes: u64,
    pub action: JobAction,
}

/// A running job. Dropping the shutdown sender also ends the task.
struct JobHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns every recurring job of the process
pub struct Scheduler {
    jobs: Mutex<HashMap<JobKey, JobHandle>>,
    jitter_ms: (u64, u64),
}

impl Scheduler {
    pub fn new(jitter_min_ms: u64, jitter_max_ms: u64) -> Self {
        let low = jitter_min_ms.min(jitter_max_ms);
        let high = jitter_min_ms.max(jitter_max_ms);
        Self { jobs: Mutex::new(HashMap::new()), jitter_ms: (low, high) }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobKey, JobHandle>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a recurring job. The first tick runs immediately.
    pub fn start(&self, key: JobKey, timezone: &str, frequency_minutes: u64, action: JobAction) -> EngineResult<()> {
        if !(1..=MAX_FREQUENCY_MINUTES).contains(&frequency_minutes) {
            return Err(EngineError::InvalidInput(format!(
                "job {key} needs a frequency between 1 and {MAX_FREQUENCY_MINUTES} minutes"
            )));
        }
        let period = frequency_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| EngineError::InvalidInput(format!("job {key} frequency is out of range")))?;

        let mut jobs = self.jobs();
        if let Some(existing) = jobs.get(&key) {
            if !existing.task.is_finished() {
                return Err(EngineError::JobExists(key));
            }
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_job(key.clone(), period, action, shutdown_rx));

        info!(job = %key, timezone, every_minutes = frequency_minutes, "Started job");
        jobs.insert(key, JobHandle { shutdown, task });
        Ok(())
    }

    /// Cancel and discard a job. Returns false when no job had that key.
    pub fn stop(&self, key: &JobKey) -> bool {
        let Some(handle) = self.jobs().remove(key) else {
            return false;
        };

        // The task may already be gone; either way it will not tick again
        let _ = handle.shutdown.send(());
        info!(job = %key, "Stopped job");
        true
    }

    pub fn is_running(&self, key: &JobKey) -> bool {
        self.jobs().contains_key(key)
    }

    pub fn job_count(&self) -> usize {
        self.jobs().len()
    }

    pub fn keys(&self) -> Vec<JobKey> {
        self.jobs().keys().cloned().collect()
    }

    fn jitter(&self) -> Duration {
        let (low, high) = self.jitter_ms;
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Start one job on behalf of a resume, then pause a random jitter so a
    /// run of resumes does not fire its first ticks together.
    pub async fn resume(&self, key: JobKey, timezone: &str, frequency_minutes: u64, action: JobAction) -> EngineResult<()> {
        self.start(key, timezone, frequency_minutes, action)?;
        tokio::time::sleep(self.jitter()).await;
        Ok(())
    }

    /// Start every pending job, pausing a random jitter between successive
    /// starts. Keys that are already running are skipped. Returns how many
    /// jobs were started.
    pub async fn resume_all(&self, timezone: &str, pending: Vec<PendingJob>) -> usize {
        let mut started = 0;

        for (index, job) in pending.into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.jitter()).await;
            }

            match self.start(job.key, timezone, job.frequency_minutes, job.action) {
                Ok(()) => started += 1,
                Err(e) => warn!("Skipping job during resume: {}", e),
            }
        }

        started
    }

    /// Stop every job
    pub fn shutdown(&self) {
        let jobs: Vec<_> = self.jobs().drain().collect();
        let count = jobs.len();
        for (_, handle) in jobs {
            let _ = handle.shutdown.send(());
        }
        info!("Scheduler stopped {} jobs", count);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, handle) in self.jobs().drain() {
            handle.task.abort();
        }
    }
}

async fn run_job(key: JobKey, period: Duration, action: JobAction, mut shutdown: oneshot::Receiver<()>) {
    let watchdog = period.max(MIN_WATCHDOG);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let tick = AssertUnwindSafe(timeout(watchdog, action())).catch_unwind();
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            outcome = tick => match outcome {
                Ok(Ok(Ok(()))) => debug!(job = %key, "Job tick completed"),
                Ok(Ok(Err(e))) => error!(job = %key, "Job tick failed: {:#}", e),
                Ok(Err(_)) => warn!(job = %key, "Job tick abandoned after {:?}", watchdog),
                Err(_) => error!(job = %key, "Job tick panicked"),
            }
        }
    }

    debug!(job = %key, "Job task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const MINUTE: Duration = Duration::from_secs(60);

    fn counting(counter: Arc<AtomicUsize>) -> JobAction {
        job_action(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[test]
    fn keys_are_lowercased_and_namespaced() {
        let key = JobKey::monitor("  Landing Page ", 7);
        assert_eq!(key.to_string(), "landing page-7");
        assert_ne!(JobKey::monitor("api", 1), JobKey::ssl("api", 1));
        assert_eq!(JobKey::monitor("API", 1), JobKey::monitor("api", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn job_ticks_immediately_then_every_period_until_stopped() {
        let scheduler = Scheduler::new(300, 1000);
        let ticks = Arc::new(AtomicUsize::new(0));
        let key = JobKey::monitor("api", 1);

        scheduler.start(key.clone(), "UTC", 5, counting(ticks.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(MINUTE * 10).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(scheduler.stop(&key));
        assert!(!scheduler.is_running(&key));
        tokio::time::sleep(MINUTE * 30).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(!scheduler.stop(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_keys_are_rejected() {
        let scheduler = Scheduler::new(300, 1000);
        let ticks = Arc::new(AtomicUsize::new(0));

        scheduler.start(JobKey::monitor("api", 1), "UTC", 1, counting(ticks.clone())).unwrap();
        let err = scheduler.start(JobKey::monitor("API", 1), "UTC", 1, counting(ticks.clone())).unwrap_err();
        assert!(matches!(err, EngineError::JobExists(_)));
        assert_eq!(scheduler.job_count(), 1);

        // Same name and id in another namespace is a different job
        scheduler.start(JobKey::ssl("api", 1), "UTC", 1, counting(ticks)).unwrap();
        assert_eq!(scheduler.job_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_frequencies_are_invalid() {
        let scheduler = Scheduler::new(300, 1000);
        for minutes in [0, MAX_FREQUENCY_MINUTES + 1, u64::MAX / 60 + 1, u64::MAX] {
            let err = scheduler.start(JobKey::monitor("api", 1), "UTC", minutes, counting(Arc::default())).unwrap_err();
            assert!(matches!(err, EngineError::InvalidInput(_)), "{minutes} minutes");
        }
        assert_eq!(scheduler.job_count(), 0);

        scheduler.start(JobKey::monitor("api", 1), "UTC", MAX_FREQUENCY_MINUTES, counting(Arc::default())).unwrap();
        assert_eq!(scheduler.job_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_ticks_do_not_stop_the_job() {
        let scheduler = Scheduler::new(300, 1000);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let action = job_action(move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("tick blew up");
                }
                Ok(())
            }
        });

        let key = JobKey::monitor("explodes", 4);
        scheduler.start(key.clone(), "UTC", 1, action).unwrap();
        tokio::time::sleep(MINUTE * 3 + Duration::from_secs(1)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(scheduler.is_running(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_pauses_after_each_start() {
        let scheduler = Scheduler::new(300, 1000);

        let began = Instant::now();
        scheduler.resume(JobKey::monitor("api", 1), "UTC", 5, counting(Arc::default())).await.unwrap();
        let waited = began.elapsed();
        assert!(waited >= Duration::from_millis(300) && waited <= Duration::from_millis(1000), "waited {waited:?}");
        assert!(scheduler.is_running(&JobKey::monitor("api", 1)));

        // A rejected start returns at once
        let began = Instant::now();
        let err = scheduler.resume(JobKey::monitor("api", 1), "UTC", 5, counting(Arc::default())).await.unwrap_err();
        assert!(matches!(err, EngineError::JobExists(_)));
        assert_eq!(began.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_ticks_do_not_stop_the_job() {
        let scheduler = Scheduler::new(300, 1000);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let action = job_action(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("database is locked")
            }
        });

        scheduler.start(JobKey::monitor("flaky", 2), "UTC", 1, action).unwrap();
        tokio::time::sleep(MINUTE * 3 + Duration::from_secs(1)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_tick_is_abandoned_by_the_watchdog() {
        let scheduler = Scheduler::new(300, 1000);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let action = job_action(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                futures::future::pending::<()>().await;
                Ok(())
            }
        });

        scheduler.start(JobKey::monitor("hangs", 3), "UTC", 1, action).unwrap();
        tokio::time::sleep(MINUTE * 2 + Duration::from_secs(30)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert!(scheduler.is_running(&JobKey::monitor("hangs", 3)));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_spaces_out_starts() {
        let scheduler = Scheduler::new(300, 1000);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let pending = (0..50)
            .map(|id| {
                let starts = starts.clone();
                let fired = Arc::new(AtomicUsize::new(0));
                PendingJob {
                    key: JobKey::monitor(&format!("monitor {id}"), id),
                    frequency_minutes: 5,
                    action: job_action(move || {
                        let starts = starts.clone();
                        let fired = fired.clone();
                        async move {
                            if fired.fetch_add(1, Ordering::SeqCst) == 0 {
                                starts.lock().unwrap().push(Instant::now());
                            }
                            Ok(())
                        }
                    }),
                }
            })
            .collect();

        assert_eq!(scheduler.resume_all("UTC", pending).await, 50);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 50);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(300) && gap <= Duration::from_millis(1000), "gap {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resume_skips_running_keys() {
        let scheduler = Scheduler::new(300, 1000);
        scheduler.start(JobKey::monitor("api", 1), "UTC", 1, counting(Arc::default())).unwrap();

        let pending = vec![
            PendingJob { key: JobKey::monitor("api", 1), frequency_minutes: 1, action: counting(Arc::default()) },
            PendingJob { key: JobKey::monitor("web", 2), frequency_minutes: 1, action: counting(Arc::default()) },
        ];
        assert_eq!(scheduler.resume_all("UTC", pending).await, 1);
        assert_eq!(scheduler.job_count(), 2);

        scheduler.shutdown();
        assert_eq!(scheduler.job_count(), 0);
    }
}
