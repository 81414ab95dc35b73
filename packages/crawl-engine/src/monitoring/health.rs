use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::HealthStatus;

/// What a health check body reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub details: Map<String, Value>,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self::with_status(HealthStatus::Healthy)
    }

    pub fn with_status(status: HealthStatus) -> Self {
        Self {
            status,
            message: None,
            details: Map::new(),
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Latest health check for a named service. Overwritten on every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub service: String,
    pub status: HealthStatus,
    pub response_ms: u64,
    pub message: Option<String>,
    pub details: Map<String, Value>,
    pub checked_at: DateTime<Utc>,
}
