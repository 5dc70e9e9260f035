//! Health report types, modeled after the scheduler's own status taxonomy
//! rather than a generic "up/down" pair, so a degraded dependency is
//! distinguishable from a healthy or failed one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn to_http_status(self) -> u16 {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Degraded,
    Down,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            status: ComponentStatus::Up,
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Down,
            response_time_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Minimal body for `GET /health` (§6): `{status, timestamp}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

/// Richer body for `GET /health/detail`, broken down per dependency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn overall_status(components: &HashMap<String, ComponentHealth>) -> HealthStatus {
        if components.values().any(|c| c.status == ComponentStatus::Down) {
            HealthStatus::Unhealthy
        } else if components.values().any(|c| c.status == ComponentStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            status: self.status,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_status_is_unhealthy_if_any_component_is_down() {
        let mut components = HashMap::new();
        components.insert("database".to_string(), ComponentHealth::healthy(5));
        components.insert("queue".to_string(), ComponentHealth::unhealthy("refused"));
        assert_eq!(
            HealthReport::overall_status(&components),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn overall_status_is_healthy_when_all_components_are_up() {
        let mut components = HashMap::new();
        components.insert("database".to_string(), ComponentHealth::healthy(5));
        components.insert("queue".to_string(), ComponentHealth::healthy(3));
        assert_eq!(
            HealthReport::overall_status(&components),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn http_status_codes_match_health_status() {
        assert_eq!(HealthStatus::Healthy.to_http_status(), 200);
        assert_eq!(HealthStatus::Unhealthy.to_http_status(), 503);
    }
}
