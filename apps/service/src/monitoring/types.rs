use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol a monitor is probed with. Each variant owns its own heartbeat table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Tcp,
    Mongodb,
    Redis,
}

impl MonitorType {
    pub const ALL: [MonitorType; 4] =
        [MonitorType::Http, MonitorType::Tcp, MonitorType::Mongodb, MonitorType::Redis];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Tcp => "tcp",
            MonitorType::Mongodb => "mongodb",
            MonitorType::Redis => "redis",
        }
    }

    /// Table holding this type's heartbeats.
    pub fn heartbeat_table(&self) -> &'static str {
        match self {
            MonitorType::Http => "http_heartbeats",
            MonitorType::Tcp => "tcp_heartbeats",
            MonitorType::Mongodb => "mongodb_heartbeats",
            MonitorType::Redis => "redis_heartbeats",
        }
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown monitor type: {0}")]
pub struct UnknownMonitorType(pub String);

impl FromStr for MonitorType {
    type Err = UnknownMonitorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(MonitorType::Http),
            "tcp" => Ok(MonitorType::Tcp),
            "mongodb" => Ok(MonitorType::Mongodb),
            "redis" => Ok(MonitorType::Redis),
            _ => Err(UnknownMonitorType(s.to_string())),
        }
    }
}

/// Stored health state. Serialized as its numeric code (0 = up, 1 = down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum MonitorStatus {
    #[default]
    Up,
    Down,
}

impl MonitorStatus {
    pub fn code(&self) -> i64 {
        match self {
            MonitorStatus::Up => 0,
            MonitorStatus::Down => 1,
        }
    }

    /// Any non-zero code is treated as down.
    pub fn from_code(code: i64) -> Self {
        if code == 0 { MonitorStatus::Up } else { MonitorStatus::Down }
    }
}

impl From<MonitorStatus> for i64 {
    fn from(status: MonitorStatus) -> Self {
        status.code()
    }
}

impl From<i64> for MonitorStatus {
    fn from(code: i64) -> Self {
        MonitorStatus::from_code(code)
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
        }
    }
}

/// Semantic result of one probe, independent of the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success,
    Failure,
}

impl ProbeOutcome {
    /// Status a monitor moves to after this outcome.
    pub fn status(&self) -> MonitorStatus {
        match self {
            ProbeOutcome::Success => MonitorStatus::Up,
            ProbeOutcome::Failure => MonitorStatus::Down,
        }
    }
}

/// What a prober hands back for a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,

    /// Protocol status code (HTTP status, 0 when the protocol has none)
    pub code: i64,

    /// Short human readable description of the outcome
    pub message: String,

    pub response_time_ms: u64,

    /// Completion time of the probe
    pub timestamp: DateTime<Utc>,

    /// Protocol-specific extras (response headers, server reply, ...)
    pub diagnostics: Option<serde_json::Value>,
}

impl ProbeResult {
    pub fn success(code: i64, message: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            outcome: ProbeOutcome::Success,
            code,
            message: message.into(),
            response_time_ms,
            timestamp: Utc::now(),
            diagnostics: None,
        }
    }

    pub fn failure(code: i64, message: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            outcome: ProbeOutcome::Failure,
            code,
            message: message.into(),
            response_time_ms,
            timestamp: Utc::now(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: serde_json::Value) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ProbeOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_type_round_trips_through_strings() {
        for ty in MonitorType::ALL {
            assert_eq!(ty.as_str().parse::<MonitorType>().unwrap(), ty);
        }
        assert_eq!("MongoDB".parse::<MonitorType>().unwrap(), MonitorType::Mongodb);
        assert_eq!("icmp".parse::<MonitorType>(), Err(UnknownMonitorType("icmp".into())));
    }

    #[test]
    fn every_type_has_its_own_table() {
        let mut tables: Vec<_> = MonitorType::ALL.iter().map(|t| t.heartbeat_table()).collect();
        tables.dedup();
        assert_eq!(tables.len(), 4);
    }

    #[test]
    fn status_serializes_as_code() {
        assert_eq!(serde_json::to_string(&MonitorStatus::Down).unwrap(), "1");
        let up: MonitorStatus = serde_json::from_str("0").unwrap();
        assert_eq!(up, MonitorStatus::Up);
        assert_eq!(MonitorStatus::from_code(7), MonitorStatus::Down);
    }

    #[test]
    fn outcome_maps_to_candidate_status() {
        assert_eq!(ProbeOutcome::Success.status(), MonitorStatus::Up);
        assert_eq!(ProbeOutcome::Failure.status(), MonitorStatus::Down);
    }
}
