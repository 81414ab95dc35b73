use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::execution::{ExecutionStatus, TaskExecution};
use super::handler::DataChangeCounters;
use super::task::{ScheduledTask, TaskKind};
use crate::monitoring::SystemStatus;
use crate::types::{HealthStatus, TaskId, Timeframe};

/// Success rate below which a task is flagged.
pub const LOW_SUCCESS_RATE: f64 = 0.8;
/// Runs needed before the success rate is judged.
pub const MIN_RUNS_FOR_RATE: u64 = 3;
/// Share of `max_duration` at which a task counts as slow.
pub const SLOW_TASK_RATIO: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub name: String,
    pub kind: TaskKind,
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: Option<f64>,
    pub attempts_in_window: usize,
    pub failures_in_window: usize,
    pub timeouts_in_window: usize,
    pub average_duration_ms: Option<f64>,
    pub max_duration_ms: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_status: Option<ExecutionStatus>,
}

impl TaskReport {
    pub(crate) fn new(task: &ScheduledTask, window: &[&TaskExecution]) -> Self {
        let count = |status: ExecutionStatus| window.iter().filter(|e| e.status == status).count();
        let durations: Vec<i64> = window.iter().filter_map(|e| e.duration_ms()).collect();
        let average_duration_ms = (!durations.is_empty())
            .then(|| durations.iter().sum::<i64>() as f64 / durations.len() as f64);

        Self {
            task_id: task.id,
            name: task.name.clone(),
            kind: task.kind,
            run_count: task.run_count,
            success_count: task.success_count,
            failure_count: task.failure_count,
            success_rate: task.success_rate(),
            attempts_in_window: window.len(),
            failures_in_window: count(ExecutionStatus::Failed),
            timeouts_in_window: count(ExecutionStatus::Timeout),
            average_duration_ms,
            max_duration_ms: task.configuration.max_duration.as_millis() as u64,
            last_run: task.last_run,
            next_run: task.next_run,
            last_status: task.last_status,
        }
    }
}

/// Summary of orchestrator activity over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationReport {
    pub timeframe: Timeframe,
    pub since: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub is_running: bool,
    pub maintenance_mode: bool,
    pub queue_depth: usize,
    pub tasks: Vec<TaskReport>,
    /// Sum over completed attempts in the window.
    pub data_changes: DataChangeCounters,
    pub system_health: SystemStatus,
    pub recommendations: Vec<String>,
}

fn status_label(status: HealthStatus) -> String {
    format!("{:?}", status).to_lowercase()
}

pub(crate) fn recommendations(
    tasks: &[TaskReport],
    health: &SystemStatus,
    maintenance_mode: bool,
    queue_depth: usize,
) -> Vec<String> {
    let mut out = Vec::new();

    if maintenance_mode {
        out.push("Maintenance mode is active; dispatch resumes once system health recovers.".to_string());
    }
    if health.overall != HealthStatus::Healthy {
        out.push(format!(
            "System health is {}; review {} unacknowledged alert(s).",
            status_label(health.overall),
            health.unacknowledged_total()
        ));
    }

    for task in tasks {
        if let Some(rate) = task.success_rate {
            if task.run_count >= MIN_RUNS_FOR_RATE && rate < LOW_SUCCESS_RATE {
                out.push(format!(
                    "Task '{}' succeeds in only {:.0}% of runs; check its handler and upstream services.",
                    task.name,
                    rate * 100.0
                ));
            }
        }
        if task.timeouts_in_window > 0 {
            out.push(format!(
                "Task '{}' timed out {} time(s); raise its max duration or reduce its workload.",
                task.name, task.timeouts_in_window
            ));
        } else if let Some(avg) = task.average_duration_ms {
            if avg > task.max_duration_ms as f64 * SLOW_TASK_RATIO {
                out.push(format!(
                    "Task '{}' averages {:.0} ms against a {} ms limit; it is close to timing out.",
                    task.name, avg, task.max_duration_ms
                ));
            }
        }
    }

    if queue_depth > 0 {
        out.push(format!(
            "{} run(s) are waiting for a worker slot; stagger schedules or raise the concurrency limit.",
            queue_depth
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn healthy() -> SystemStatus {
        SystemStatus {
            overall: HealthStatus::Healthy,
            services: Vec::new(),
            unacknowledged_alerts: BTreeMap::new(),
            errors_last_hour: 0,
            active_sessions: 0,
            checked_at: Utc::now(),
        }
    }

    fn report(name: &str, runs: u64, successes: u64) -> TaskReport {
        TaskReport {
            task_id: TaskId::new(),
            name: name.to_string(),
            kind: TaskKind::CrawlCycle,
            run_count: runs,
            success_count: successes,
            failure_count: runs - successes,
            success_rate: (runs > 0).then(|| successes as f64 / runs as f64),
            attempts_in_window: runs as usize,
            failures_in_window: (runs - successes) as usize,
            timeouts_in_window: 0,
            average_duration_ms: Some(100.0),
            max_duration_ms: 60_000,
            last_run: None,
            next_run: None,
            last_status: None,
        }
    }

    #[test]
    fn quiet_system_has_no_recommendations() {
        assert!(recommendations(&[report("crawl", 10, 10)], &healthy(), false, 0).is_empty());
    }

    #[test]
    fn flags_unreliable_and_slow_tasks() {
        let mut slow = report("bulk-dedup", 4, 4);
        slow.average_duration_ms = Some(55_000.0);
        let mut health = healthy();
        health.overall = HealthStatus::Warning;

        let recs = recommendations(&[report("crawl", 5, 2), slow], &health, true, 2);
        assert_eq!(recs.len(), 5);
        assert!(recs[0].contains("Maintenance mode"));
        assert!(recs[1].contains("warning"));
        assert!(recs[2].contains("'crawl'") && recs[2].contains("40%"));
        assert!(recs[3].contains("'bulk-dedup'"));
        assert!(recs[4].starts_with("2 run(s)"));
    }

    #[test]
    fn few_runs_are_not_judged() {
        assert!(recommendations(&[report("crawl", 2, 0)], &healthy(), false, 0).is_empty());
    }
}
