use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContentAnalysis, UrlCategory};

/// Attempts after which an item is parked as failed.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Pending,
    Analyzing,
    Processing,
    Completed,
    Failed,
    Skipped,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheduling {
    pub next_scheduled: DateTime<Utc>,
    /// Interval applied after the next completion, in seconds.
    pub interval_secs: i64,
    /// Interval learned from content changes, in seconds.
    pub base_interval_secs: i64,
    pub adaptive: bool,
}

/// A URL in the crawl queue. Items are never removed; they cycle between
/// pending and completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub url: String,
    pub domain: String,
    pub discovered_at: DateTime<Utc>,
    pub attempts: u32,
    pub static_priority: f64,
    /// 1.0..=20.0; equals the static priority until the first analysis.
    pub dynamic_priority: f64,
    pub category: UrlCategory,
    pub parent_url: Option<String>,
    pub depth: u32,
    pub scheduling: Scheduling,
    pub status: QueueStatus,
    pub last_crawled: Option<DateTime<Utc>>,
    pub last_content_hash: Option<String>,
    pub last_analysis: Option<ContentAnalysis>,
    /// Main-content selector from the target's rules.
    pub selector: Option<String>,
    pub skip_reason: Option<String>,
}

impl QueueItem {
    /// Ready to be claimed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending
            && self.attempts < MAX_ATTEMPTS
            && self.scheduling.next_scheduled <= now
    }

    /// Completed or deferred items whose next run has arrived.
    pub fn should_promote(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, QueueStatus::Completed | QueueStatus::Deferred)
            && self.scheduling.next_scheduled <= now
    }
}

/// Counts over the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub analyzing: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub deferred: usize,
    /// Pending items claimable now.
    pub due: usize,
    pub average_priority: f64,
    /// Crawl attempts finished inside the outcome window.
    pub recent_attempts: usize,
    pub recent_failures: usize,
}

impl QueueStats {
    pub fn from_items<'a>(items: impl Iterator<Item = &'a QueueItem>, now: DateTime<Utc>) -> Self {
        let mut stats = QueueStats::default();
        let mut priority_sum = 0.0;
        for item in items {
            stats.total += 1;
            priority_sum += item.dynamic_priority;
            if item.is_due(now) {
                stats.due += 1;
            }
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Analyzing => stats.analyzing += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Completed => stats.completed += 1,
                QueueStatus::Failed => stats.failed += 1,
                QueueStatus::Skipped => stats.skipped += 1,
                QueueStatus::Deferred => stats.deferred += 1,
            }
        }
        if stats.total > 0 {
            stats.average_priority = priority_sum / stats.total as f64;
        }
        stats
    }

    /// Share of recent attempts that failed, 0.0 when nothing ran.
    pub fn recent_failure_share(&self) -> f64 {
        if self.recent_attempts == 0 {
            0.0
        } else {
            self.recent_failures as f64 / self.recent_attempts as f64
        }
    }
}
