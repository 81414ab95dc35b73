use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::errors::ErrorKind;
use crate::types::SessionId;

/// Stage of the URL funnel a count belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    Discovered,
    Filtered,
    Queued,
    Fetched,
    Extracted,
    Persisted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFunnel {
    pub discovered: u64,
    pub filtered: u64,
    pub queued: u64,
    pub fetched: u64,
    pub extracted: u64,
    pub persisted: u64,
}

impl UrlFunnel {
    pub fn add(&mut self, stage: FunnelStage, count: u64) {
        let slot = match stage {
            FunnelStage::Discovered => &mut self.discovered,
            FunnelStage::Filtered => &mut self.filtered,
            FunnelStage::Queued => &mut self.queued,
            FunnelStage::Fetched => &mut self.fetched,
            FunnelStage::Extracted => &mut self.extracted,
            FunnelStage::Persisted => &mut self.persisted,
        };
        *slot += count;
    }
}

/// Counters for one bounded crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub id: SessionId,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub duplicates_skipped: u64,
    pub bytes_processed: u64,
    pub funnel: UrlFunnel,
    pub peak_memory_bytes: u64,
    pub error_breakdown: BTreeMap<ErrorKind, u64>,
}

impl SessionMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            requests: 0,
            successes: 0,
            failures: 0,
            duplicates_skipped: 0,
            bytes_processed: 0,
            funnel: UrlFunnel::default(),
            peak_memory_bytes: 0,
            error_breakdown: BTreeMap::new(),
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.failures as f64 / self.requests as f64
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub(crate) fn observe_memory(&mut self, bytes: u64) {
        self.peak_memory_bytes = self.peak_memory_bytes.max(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_handles_empty_sessions() {
        let mut session = SessionMetrics::new("crawl");
        assert_eq!(session.error_rate(), 0.0);
        session.requests = 4;
        session.failures = 1;
        assert_eq!(session.error_rate(), 0.25);
    }

    #[test]
    fn funnel_accumulates_per_stage() {
        let mut funnel = UrlFunnel::default();
        funnel.add(FunnelStage::Discovered, 10);
        funnel.add(FunnelStage::Discovered, 5);
        funnel.add(FunnelStage::Persisted, 2);
        assert_eq!(funnel.discovered, 15);
        assert_eq!(funnel.persisted, 2);
        assert_eq!(funnel.queued, 0);
    }
}
