use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse health level reported by an agent's `checkHealth`, ordered from
/// least to most severe so a registry can pick the worst of several checks
/// with a simple `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthLevel {
    Unknown,
    Healthy,
    Warning,
    Degraded,
    Unhealthy,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealthStatus {
    pub is_healthy: bool,
    pub message: String,
    pub level: HealthLevel,
    pub checked_at: DateTime<Utc>,
}

impl AgentHealthStatus {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            is_healthy: true,
            message: message.into(),
            level: HealthLevel::Healthy,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(level: HealthLevel, message: impl Into<String>) -> Self {
        Self {
            is_healthy: false,
            message: message.into(),
            level,
            checked_at: Utc::now(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            is_healthy: false,
            message: "no health check has run yet".to_string(),
            level: HealthLevel::Unknown,
            checked_at: Utc::now(),
        }
    }
}
