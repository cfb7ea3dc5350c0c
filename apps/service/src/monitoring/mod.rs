pub mod certificate;
pub mod checker;
/// Monitoring engine module - probes targets and maintains health state
///
/// This module is responsible for:
/// - Running HTTP/TCP/MongoDB/Redis probes and reading TLS certificates
/// - Scheduling recurring jobs
/// - Recording heartbeats and folding them into UP/DOWN state
pub mod executor;
pub mod heartbeats;
pub mod scheduler;
pub mod status;
pub mod types;

pub use certificate::{CertificateProber, TlsCertificateProber};
pub use checker::{NetworkProber, ProbeRequest, Prober};
pub use executor::MonitoringExecutor;
pub use heartbeats::HeartbeatStore;
pub use scheduler::{JobKey, JobKind, Scheduler};
pub use status::uptime_percentage;
pub use types::{MonitorStatus, MonitorType, ProbeOutcome, ProbeResult};
