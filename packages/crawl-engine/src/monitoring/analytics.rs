use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::alerts::AlertSeverity;
use super::errors::ErrorKind;
use super::health::HealthCheck;
use super::performance::OperationStats;
use crate::types::{HealthStatus, Timeframe};

/// Snapshot answering "is the system healthy right now?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub overall: HealthStatus,
    pub services: Vec<HealthCheck>,
    pub unacknowledged_alerts: BTreeMap<AlertSeverity, usize>,
    pub errors_last_hour: u64,
    pub active_sessions: usize,
    pub checked_at: DateTime<Utc>,
}

impl SystemStatus {
    pub fn unacknowledged_total(&self) -> usize {
        self.unacknowledged_alerts.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub kind: ErrorKind,
    pub operation: String,
    pub url: Option<String>,
    pub count: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalytics {
    pub total_occurrences: u64,
    pub distinct: usize,
    pub by_kind: BTreeMap<ErrorKind, u64>,
    pub top: Vec<ErrorSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalytics {
    pub sessions: usize,
    pub requests: u64,
    pub failures: u64,
    pub duplicates_skipped: u64,
    pub bytes_processed: u64,
    pub error_rate: f64,
}

/// Aggregates over a reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub timeframe: Timeframe,
    pub since: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub errors: ErrorAnalytics,
    pub performance: Vec<OperationStats>,
    pub alerts: BTreeMap<AlertSeverity, usize>,
    pub sessions: SessionAnalytics,
}
