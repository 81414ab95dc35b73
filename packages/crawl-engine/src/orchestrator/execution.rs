use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::handler::DataChangeCounters;
use crate::types::{ExecutionId, RunId, TaskId};

/// State of one attempt.
///
/// `pending → running → {completed | failed | timeout | cancelled}`; a failed
/// or timed-out run with retry budget left continues as a new `retrying` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Retrying,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Retrying => "retrying",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::Timeout
        )
    }

    /// Failed and timed-out attempts may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionStatus::Failed | ExecutionStatus::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTrigger {
    Schedule,
    Manual,
}

/// One attempt of a task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub task_name: String,
    /// Shared by all attempts of the same run.
    pub run_id: RunId,
    pub attempt: u32,
    pub trigger: TaskTrigger,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub data_changes: DataChangeCounters,
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl TaskExecution {
    pub(crate) fn new(
        task_id: TaskId,
        task_name: &str,
        run_id: RunId,
        attempt: u32,
        trigger: TaskTrigger,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            task_id,
            task_name: task_name.to_string(),
            run_id,
            attempt,
            trigger,
            status,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            data_changes: DataChangeCounters::default(),
            metrics: serde_json::Map::new(),
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        Some((self.finished_at? - self.started_at?).num_milliseconds())
    }
}
