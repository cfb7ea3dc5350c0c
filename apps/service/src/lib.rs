//! Monitor scheduling and health-state engine.
//!
//! Monitors are polled on recurring jobs, every probe lands in a per-type
//! heartbeat table, and UP/DOWN edges fan out email notifications.

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod monitoring;
pub mod notifications;
pub mod orchestrator;
pub mod pool;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventBus};
pub use orchestrator::{Collaborators, Engine, EngineSettings, MonitorOverview};
