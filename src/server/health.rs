//! `GET /ping` health status

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::handler::ActivityTracker;

/// Liveness as reported to the orchestration runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingStatus {
    /// Idle and ready for work
    Healthy,
    /// Ready, but background activity is in progress
    HealthyBusy,
}

impl PingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PingStatus::Healthy => "Healthy",
            PingStatus::HealthyBusy => "HealthyBusy",
        }
    }
}

/// Body of a `/ping` response, computed fresh on every call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: PingStatus,
    /// RFC 3339 UTC timestamp of this evaluation
    pub time_of_last_update: String,
}

impl HealthStatus {
    pub fn current(activity: &ActivityTracker) -> Self {
        let status = if activity.is_busy() {
            PingStatus::HealthyBusy
        } else {
            PingStatus::Healthy
        };
        Self {
            status,
            time_of_last_update: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_idle_tracker_is_healthy() {
        let health = HealthStatus::current(&ActivityTracker::new());
        assert_eq!(health.status, PingStatus::Healthy);
        assert!(chrono::DateTime::parse_from_rfc3339(&health.time_of_last_update).is_ok());
    }

    #[test]
    fn test_active_tracker_is_busy() {
        let tracker = ActivityTracker::new();
        let _guard = tracker.begin("reindex");
        assert_eq!(HealthStatus::current(&tracker).status, PingStatus::HealthyBusy);
    }

    #[test]
    fn test_wire_shape() {
        let health = HealthStatus {
            status: PingStatus::HealthyBusy,
            time_of_last_update: "2026-01-01T00:00:00.000Z".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&health).unwrap(),
            json!({"status": "HealthyBusy", "time_of_last_update": "2026-01-01T00:00:00.000Z"})
        );
    }
}
