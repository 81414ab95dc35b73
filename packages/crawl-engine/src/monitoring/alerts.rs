use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AlertId, HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    /// Contribution of an unacknowledged alert to overall system health.
    pub fn health_impact(&self) -> HealthStatus {
        match self {
            AlertSeverity::Info => HealthStatus::Healthy,
            AlertSeverity::Warning | AlertSeverity::Error => HealthStatus::Warning,
            AlertSeverity::Critical => HealthStatus::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub severity: AlertSeverity,
    /// Component that raised the alert, e.g. `orchestrator` or `health:storage`.
    pub source: String,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        source: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::new(),
            severity,
            source: source.into(),
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
        }
    }

    pub fn acknowledge(&mut self, at: DateTime<Utc>) {
        if !self.acknowledged {
            self.acknowledged = true;
            self.acknowledged_at = Some(at);
        }
    }
}
