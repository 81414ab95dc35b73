use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use tokio_util::sync::CancellationToken;

use crate::error::TaskResult;
use crate::types::{ExecutionId, RunId, TaskId};

/// Body of a scheduled task.
///
/// Handlers should poll [`TaskContext::cancel`] at their await points and
/// return [`TaskError::Cancelled`](crate::error::TaskError::Cancelled) once it
/// fires; the orchestrator fires it on timeout and shutdown.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> TaskResult<TaskOutcome>;
}

/// Per-attempt context handed to a [`TaskHandler`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub task_name: String,
    pub execution_id: ExecutionId,
    pub run_id: RunId,
    pub attempt: u32,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn parameter_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(|v| v.as_u64())
    }

    pub fn parameter_bool(&self, key: &str) -> Option<bool> {
        self.parameters.get(key).and_then(|v| v.as_bool())
    }
}

/// Changes a task made to the corpus and the crawl queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChangeCounters {
    pub pages_fetched: u64,
    pub urls_discovered: u64,
    pub urls_queued: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub duplicates_merged: u64,
}

impl DataChangeCounters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for DataChangeCounters {
    fn add_assign(&mut self, other: Self) {
        self.pages_fetched += other.pages_fetched;
        self.urls_discovered += other.urls_discovered;
        self.urls_queued += other.urls_queued;
        self.records_created += other.records_created;
        self.records_updated += other.records_updated;
        self.duplicates_merged += other.duplicates_merged;
    }
}

/// Result of a successful attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutcome {
    pub data_changes: DataChangeCounters,
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl TaskOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_changes(mut self, changes: DataChangeCounters) -> Self {
        self.data_changes = changes;
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }
}
