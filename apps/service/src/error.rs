use thiserror::Error;

use crate::monitoring::scheduler::JobKey;
use crate::monitoring::types::UnknownMonitorType;

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store failed; the message keeps the full cause chain
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("job {0} already exists")]
    JobExists(JobKey),

    #[error("unknown monitor type: {0}")]
    UnknownMonitorType(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        EngineError::NotFound { kind, id }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Persistence(format!("{e:#}"))
    }
}

impl From<UnknownMonitorType> for EngineError {
    fn from(e: UnknownMonitorType) -> Self {
        EngineError::UnknownMonitorType(e.0)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
