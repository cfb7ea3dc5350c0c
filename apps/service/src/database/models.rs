use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use libsql::Row;
use serde::{Deserialize, Serialize};

use crate::monitoring::types::{MonitorStatus, MonitorType, ProbeResult};

/// Convert a timestamp to Unix milliseconds for storage
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert stored Unix milliseconds back to a timestamp
pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Monitor model - a target polled on a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: Option<i64>,
    pub user_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    pub url: String,
    pub port: Option<u16>,
    pub timeout_seconds: Option<u64>,
    pub method: String,
    /// JSON object of request headers
    pub headers: Option<String>,
    pub body: Option<String>,
    /// `none`, `basic` or `token`
    pub http_auth_method: String,
    pub basic_auth_user: Option<String>,
    pub basic_auth_pass: Option<String>,
    pub bearer_token: Option<String>,
    pub redirects: u32,
    pub frequency_minutes: u64,
    pub active: bool,
    pub status: MonitorStatus,
    pub last_changed: Option<DateTime<Utc>>,
    pub notification_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const MONITOR_COLUMNS: &str = "id, user_id, name, monitor_type, url, port, timeout_seconds, method, headers, body, http_auth_method, basic_auth_user, basic_auth_pass, bearer_token, redirects, frequency_minutes, active, status, last_changed, notification_id, created_at";

impl Monitor {
    /// Build a new, unsaved monitor from caller input
    pub fn from_input(user_id: i64, input: MonitorInput) -> Self {
        let mut monitor = Self {
            id: None,
            user_id,
            name: String::new(),
            monitor_type: input.monitor_type,
            url: String::new(),
            port: None,
            timeout_seconds: None,
            method: "GET".to_string(),
            headers: None,
            body: None,
            http_auth_method: "none".to_string(),
            basic_auth_user: None,
            basic_auth_pass: None,
            bearer_token: None,
            redirects: 0,
            frequency_minutes: 1,
            active: true,
            status: MonitorStatus::Up,
            last_changed: None,
            notification_id: None,
            created_at: Utc::now(),
        };
        monitor.apply_input(input);
        monitor
    }

    /// Overwrite the editable fields. Status, ownership and timestamps are untouched.
    pub fn apply_input(&mut self, input: MonitorInput) {
        self.name = input.name;
        self.monitor_type = input.monitor_type;
        self.url = input.url;
        self.port = input.port;
        self.timeout_seconds = input.timeout_seconds;
        self.method = input.method.unwrap_or_else(|| "GET".to_string());
        self.headers = input.headers;
        self.body = input.body;
        self.http_auth_method = input.http_auth_method.unwrap_or_else(|| "none".to_string());
        self.basic_auth_user = input.basic_auth_user;
        self.basic_auth_pass = input.basic_auth_pass;
        self.bearer_token = input.bearer_token;
        self.redirects = input.redirects.unwrap_or(0);
        self.frequency_minutes = input.frequency_minutes.max(1);
        self.active = input.active;
        self.notification_id = input.notification_id;
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let monitor_type: String = row.get(3)?;
        Ok(Self {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            name: row.get(2)?,
            monitor_type: monitor_type.parse()?,
            url: row.get(4)?,
            port: row.get::<Option<i64>>(5)?.map(|v| v as u16),
            timeout_seconds: row.get::<Option<i64>>(6)?.map(|v| v as u64),
            method: row.get(7)?,
            headers: row.get(8)?,
            body: row.get(9)?,
            http_auth_method: row.get(10)?,
            basic_auth_user: row.get(11)?,
            basic_auth_pass: row.get(12)?,
            bearer_token: row.get(13)?,
            redirects: row.get::<i64>(14)? as u32,
            frequency_minutes: row.get::<i64>(15)? as u64,
            active: row.get::<i64>(16)? != 0,
            status: MonitorStatus::from_code(row.get(17)?),
            last_changed: row.get::<Option<i64>>(18)?.map(i64_to_timestamp),
            notification_id: row.get(19)?,
            created_at: i64_to_timestamp(row.get(20)?),
        })
    }

    /// Headers stored as a JSON object, decoded leniently
    pub fn header_map(&self) -> HashMap<String, String> {
        self.headers
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Editable monitor fields as submitted by a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorInput {
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    pub url: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub http_auth_method: Option<String>,
    #[serde(default)]
    pub basic_auth_user: Option<String>,
    #[serde(default)]
    pub basic_auth_pass: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub redirects: Option<u32>,
    pub frequency_minutes: u64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub notification_id: Option<i64>,
}

fn default_true() -> bool {
    true
}

/// One probe outcome for a monitor, immutable once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub id: Option<i64>,
    pub monitor_id: i64,
    pub status: MonitorStatus,
    pub code: i64,
    pub message: String,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Protocol-specific payload, stored as JSON text
    pub diagnostics: Option<String>,
}

impl Heartbeat {
    pub fn from_probe(monitor_id: i64, result: &ProbeResult) -> Self {
        Self {
            id: None,
            monitor_id,
            status: result.outcome.status(),
            code: result.code,
            message: result.message.clone(),
            response_time_ms: result.response_time_ms,
            timestamp: result.timestamp,
            diagnostics: result.diagnostics.as_ref().map(|d| d.to_string()),
        }
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            monitor_id: row.get(1)?,
            status: MonitorStatus::from_code(row.get(2)?),
            code: row.get(3)?,
            message: row.get(4)?,
            response_time_ms: row.get::<i64>(5)? as u64,
            timestamp: i64_to_timestamp(row.get(6)?),
            diagnostics: row.get(7)?,
        })
    }
}

/// Latest certificate snapshot of an SSL watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslInfo {
    pub issuer: String,
    pub subject: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Negative once the certificate has expired
    pub days_remaining: i64,
}

/// SSL watch model - tracks certificate expiry of a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslMonitor {
    pub id: Option<i64>,
    pub user_id: i64,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub frequency_minutes: u64,
    pub notification_id: Option<i64>,
    pub status: MonitorStatus,
    pub last_changed: Option<DateTime<Utc>>,
    pub info: Option<SslInfo>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const SSL_MONITOR_COLUMNS: &str =
    "id, user_id, name, url, active, frequency_minutes, notification_id, status, last_changed, info, created_at";

impl SslMonitor {
    pub fn from_input(user_id: i64, input: SslMonitorInput) -> Self {
        Self {
            id: None,
            user_id,
            name: input.name,
            url: input.url,
            active: input.active,
            frequency_minutes: input.frequency_minutes.max(1),
            notification_id: input.notification_id,
            status: MonitorStatus::Up,
            last_changed: None,
            info: None,
            created_at: Utc::now(),
        }
    }

    pub fn apply_input(&mut self, input: SslMonitorInput) {
        self.name = input.name;
        self.url = input.url;
        self.active = input.active;
        self.frequency_minutes = input.frequency_minutes.max(1);
        self.notification_id = input.notification_id;
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let info: Option<String> = row.get(9)?;
        let info = match info.as_deref() {
            Some(raw) if !raw.is_empty() => {
                Some(serde_json::from_str(raw).context("Corrupt SSL info snapshot")?)
            }
            _ => None,
        };

        Ok(Self {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            name: row.get(2)?,
            url: row.get(3)?,
            active: row.get::<i64>(4)? != 0,
            frequency_minutes: row.get::<i64>(5)? as u64,
            notification_id: row.get(6)?,
            status: MonitorStatus::from_code(row.get(7)?),
            last_changed: row.get::<Option<i64>>(8)?.map(i64_to_timestamp),
            info,
            created_at: i64_to_timestamp(row.get(10)?),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslMonitorInput {
    pub name: String,
    pub url: String,
    pub frequency_minutes: u64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub notification_id: Option<i64>,
}

/// Named list of email addresses alerted on status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationGroup {
    pub id: Option<i64>,
    pub user_id: i64,
    pub group_name: String,
    pub emails: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationGroup {
    pub fn new(user_id: i64, group_name: String, emails: Vec<String>) -> Self {
        Self { id: None, user_id, group_name, emails, created_at: Utc::now() }
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let emails: String = row.get(3)?;
        Ok(Self {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            group_name: row.get(2)?,
            emails: serde_json::from_str(&emails).context("Corrupt notification email list")?,
            created_at: i64_to_timestamp(row.get(4)?),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationGroupInput {
    pub group_name: String,
    pub emails: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ProbeResult;

    fn http_input() -> MonitorInput {
        serde_json::from_value(serde_json::json!({
            "name": "Landing",
            "type": "http",
            "url": "https://example.com",
            "frequencyMinutes": 0,
            "headers": "{\"x-probe\": \"1\"}"
        }))
        .unwrap()
    }

    #[test]
    fn millis_round_trip_keeps_precision() {
        let now = Utc::now();
        let back = i64_to_timestamp(timestamp_to_i64(now));
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn input_defaults_are_applied() {
        let monitor = Monitor::from_input(3, http_input());
        assert_eq!(monitor.user_id, 3);
        assert_eq!(monitor.method, "GET");
        assert_eq!(monitor.http_auth_method, "none");
        assert!(monitor.active);
        // zero would never tick
        assert_eq!(monitor.frequency_minutes, 1);
        assert_eq!(monitor.status, MonitorStatus::Up);
        assert_eq!(monitor.header_map().get("x-probe").map(String::as_str), Some("1"));
    }

    #[test]
    fn malformed_headers_decode_to_empty_map() {
        let mut monitor = Monitor::from_input(1, http_input());
        monitor.headers = Some("not json".into());
        assert!(monitor.header_map().is_empty());
    }

    #[test]
    fn heartbeat_takes_status_from_outcome() {
        let result = ProbeResult::failure(503, "Service Unavailable", 42)
            .with_diagnostics(serde_json::json!({ "server": "nginx" }));
        let heartbeat = Heartbeat::from_probe(7, &result);
        assert_eq!(heartbeat.monitor_id, 7);
        assert_eq!(heartbeat.status, MonitorStatus::Down);
        assert_eq!(heartbeat.code, 503);
        assert_eq!(heartbeat.timestamp, result.timestamp);
        assert!(heartbeat.diagnostics.unwrap().contains("nginx"));
    }
}
