use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{MonitorStatus, ProbeOutcome};
use crate::database::Database;
use crate::database::models::Heartbeat;

/// An UP/DOWN edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: MonitorStatus,
    pub to: MonitorStatus,
    pub at: DateTime<Utc>,
}

impl Transition {
    pub fn is_recovery(&self) -> bool {
        self.to == MonitorStatus::Up
    }
}

/// Status and change time to persist after one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateUpdate {
    pub status: MonitorStatus,
    pub last_changed: Option<DateTime<Utc>>,
    pub transition: Option<Transition>,
}

/// Fold one probe outcome into the stored state.
///
/// `last_changed` only moves when the outcome disagrees with the stored
/// status: a success while down, or a failure while up.
pub fn next_state(
    stored: MonitorStatus,
    last_changed: Option<DateTime<Utc>>,
    outcome: ProbeOutcome,
    at: DateTime<Utc>,
) -> StateUpdate {
    let status = outcome.status();
    if status == stored {
        return StateUpdate { status, last_changed, transition: None };
    }

    StateUpdate { status, last_changed: Some(at), transition: Some(Transition { from: stored, to: status, at }) }
}

/// Share of non-down heartbeats, rounded to a whole percent. Empty is 0.
pub fn uptime_percentage(heartbeats: &[Heartbeat]) -> u8 {
    let total = heartbeats.len();
    if total == 0 {
        return 0;
    }

    let down = heartbeats.iter().filter(|h| h.status == MonitorStatus::Down).count();
    (((total - down) as f64 / total as f64) * 100.0).round() as u8
}

/// Applies probe outcomes to stored monitor state
#[derive(Clone)]
pub struct StatusEngine {
    db: Arc<dyn Database>,
}

impl StatusEngine {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Compute and persist the new state of monitor `id`. Status and change
    /// time are written in one statement.
    pub async fn apply(
        &self,
        id: i64,
        stored: MonitorStatus,
        last_changed: Option<DateTime<Utc>>,
        outcome: ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<StateUpdate> {
        let update = next_state(stored, last_changed, outcome, at);
        self.db.update_monitor_status(id, update.status, update.last_changed).await?;

        if let Some(transition) = update.transition {
            tracing::info!(monitor_id = id, from = %transition.from, to = %transition.to, "Monitor status changed");
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ProbeResult;
    use chrono::Duration;

    fn beats(pattern: &[bool]) -> Vec<Heartbeat> {
        pattern
            .iter()
            .map(|ok| {
                let result = if *ok { ProbeResult::success(200, "OK", 1) } else { ProbeResult::failure(500, "Error", 1) };
                Heartbeat::from_probe(1, &result)
            })
            .collect()
    }

    #[test]
    fn empty_window_is_zero_percent() {
        assert_eq!(uptime_percentage(&[]), 0);
    }

    #[test]
    fn uptime_rounds_to_whole_percent() {
        assert_eq!(uptime_percentage(&beats(&[true, true, true])), 100);
        assert_eq!(uptime_percentage(&beats(&[false, false])), 0);
        assert_eq!(uptime_percentage(&beats(&[true, true, false])), 67);
        assert_eq!(uptime_percentage(&beats(&[true, false, false])), 33);
        assert_eq!(uptime_percentage(&beats(&[true, false])), 50);
    }

    #[test]
    fn same_status_keeps_last_changed() {
        let earlier = Utc::now() - Duration::hours(3);
        let now = Utc::now();

        let update = next_state(MonitorStatus::Up, Some(earlier), ProbeOutcome::Success, now);
        assert_eq!(update.status, MonitorStatus::Up);
        assert_eq!(update.last_changed, Some(earlier));
        assert!(update.transition.is_none());

        let update = next_state(MonitorStatus::Down, None, ProbeOutcome::Failure, now);
        assert_eq!(update.last_changed, None);
        assert!(update.transition.is_none());
    }

    #[test]
    fn edges_refresh_last_changed() {
        let earlier = Utc::now() - Duration::hours(3);
        let now = Utc::now();

        let down = next_state(MonitorStatus::Up, Some(earlier), ProbeOutcome::Failure, now);
        assert_eq!(down.status, MonitorStatus::Down);
        assert_eq!(down.last_changed, Some(now));
        let transition = down.transition.unwrap();
        assert!(!transition.is_recovery());

        let up = next_state(MonitorStatus::Down, Some(now), ProbeOutcome::Success, now + Duration::minutes(5));
        assert_eq!(up.last_changed, Some(now + Duration::minutes(5)));
        assert!(up.transition.unwrap().is_recovery());
    }
}
