use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use typed_builder::TypedBuilder;

use super::execution::ExecutionStatus;
use crate::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CrawlCycle,
    Discovery,
    Extraction,
    Deduplication,
    HealthCheck,
    Cleanup,
    Report,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::CrawlCycle => "crawl_cycle",
            TaskKind::Discovery => "discovery",
            TaskKind::Extraction => "extraction",
            TaskKind::Deduplication => "deduplication",
            TaskKind::HealthCheck => "health_check",
            TaskKind::Cleanup => "cleanup",
            TaskKind::Report => "report",
        }
    }
}

/// Execution policy of a task. Can be overridden per manual run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct TaskConfiguration {
    /// Per-attempt limit; the attempt's cancellation token fires when exceeded.
    #[builder(default = Duration::from_secs(30 * 60))]
    pub max_duration: Duration,
    /// Retries after the first attempt.
    #[builder(default = 2)]
    pub retry_attempts: u32,
    #[builder(default = Duration::from_secs(60))]
    pub retry_delay: Duration,
    #[builder(default = true)]
    pub alert_on_failure: bool,
    #[builder(default = false)]
    pub alert_on_success: bool,
    #[builder(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Default for TaskConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A task registered with the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ScheduledTask {
    #[builder(default)]
    pub id: TaskId,
    #[builder(setter(into))]
    pub name: String,
    pub kind: TaskKind,
    /// Cron expression with a seconds field, e.g. `0 */5 * * * *`.
    #[builder(setter(into))]
    pub schedule: String,
    /// Higher fires first when several tasks are due together.
    #[builder(default = 5)]
    pub priority: u8,
    #[builder(default)]
    pub dependencies: Vec<TaskId>,
    #[builder(default)]
    pub configuration: TaskConfiguration,
    #[builder(default = true)]
    pub enabled: bool,

    #[builder(default, setter(skip))]
    pub run_count: u64,
    #[builder(default, setter(skip))]
    pub success_count: u64,
    #[builder(default, setter(skip))]
    pub failure_count: u64,
    #[builder(default, setter(skip))]
    pub last_run: Option<DateTime<Utc>>,
    #[builder(default, setter(skip))]
    pub next_run: Option<DateTime<Utc>>,
    #[builder(default, setter(skip))]
    pub last_status: Option<ExecutionStatus>,
}

impl ScheduledTask {
    /// Dependants may run once this task succeeds more often than it fails.
    pub fn unblocks_dependants(&self) -> bool {
        self.success_count > self.failure_count
    }

    pub fn success_rate(&self) -> Option<f64> {
        (self.run_count > 0).then(|| self.success_count as f64 / self.run_count as f64)
    }

    pub(crate) fn record_run(&mut self, status: ExecutionStatus, started_at: DateTime<Utc>) {
        self.run_count += 1;
        if status == ExecutionStatus::Completed {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_run = Some(started_at);
        self.last_status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let task = ScheduledTask::builder()
            .name("crawl-cycle")
            .kind(TaskKind::CrawlCycle)
            .schedule("0 * * * * *")
            .build();
        assert_eq!(task.priority, 5);
        assert!(task.enabled);
        assert_eq!(task.configuration.retry_attempts, 2);
        assert_eq!(task.configuration.max_duration, Duration::from_secs(1800));
        assert!(task.configuration.alert_on_failure);
        assert_eq!(task.success_rate(), None);
    }

    #[test]
    fn run_counters_stay_consistent() {
        let mut task = ScheduledTask::builder()
            .name("bulk-dedup")
            .kind(TaskKind::Deduplication)
            .schedule("0 0 * * * *")
            .build();
        let now = Utc::now();
        task.record_run(ExecutionStatus::Completed, now);
        task.record_run(ExecutionStatus::Timeout, now);
        assert_eq!(task.run_count, task.success_count + task.failure_count);
        assert!(!task.unblocks_dependants());
        task.record_run(ExecutionStatus::Completed, now);
        assert!(task.unblocks_dependants());
        assert_eq!(task.last_status, Some(ExecutionStatus::Completed));
    }
}
