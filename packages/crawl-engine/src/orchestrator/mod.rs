//! Task orchestrator: cron-scheduled, dependency-gated, retried background
//! tasks under a global concurrency cap.
//!
//! # Architecture
//!
//! ```text
//! cron loop (min-heap of next fire times)
//!     │
//!     └─► dispatch ─► dependency gate ─► FIFO wait queue
//!                                            │ (drained every 5s and on completion)
//!                                            ▼
//!                                  semaphore permit (cap 5)
//!                                            │
//!                                            ▼
//!                           attempt ─(failed/timeout)─► retry after delay
//!                                            │
//!                                            └─► counters, alerts, history
//!
//! maintenance loop (60s): system status critical/down ─► suppress dispatch
//!                           (health checks still run)
//! ```

pub mod execution;
pub mod handler;
pub mod report;
pub mod schedule;
pub mod task;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use execution::{ExecutionStatus, TaskExecution, TaskTrigger};
pub use handler::{DataChangeCounters, TaskContext, TaskHandler, TaskOutcome};
pub use report::{OrchestrationReport, TaskReport};
pub use schedule::{next_fire, parse_schedule};
pub use task::{ScheduledTask, TaskConfiguration, TaskKind};

use crate::error::{OrchestratorError, OrchestratorResult, TaskError};
use crate::monitoring::{AlertSeverity, ErrorKind, MonitoringService};
use crate::types::{RunId, TaskId, Timeframe};
use schedule::CronHeap;

/// Hard cap on simultaneous executions.
pub const MAX_CONCURRENT_TASKS: usize = 5;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrency: usize,
    /// How often the wait queue is drained besides on completion.
    pub queue_drain_interval: Duration,
    pub maintenance_check_interval: Duration,
    /// Cron loop wake-up when no task is scheduled.
    pub idle_poll_interval: Duration,
    /// Execution rows kept in memory.
    pub execution_history: usize,
    /// How long `stop` waits for running executions.
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: MAX_CONCURRENT_TASKS,
            queue_drain_interval: Duration::from_secs(5),
            maintenance_check_interval: Duration::from_secs(60),
            idle_poll_interval: Duration::from_secs(60),
            execution_history: 1_000,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_queue_drain_interval(mut self, interval: Duration) -> Self {
        self.queue_drain_interval = interval;
        self
    }

    pub fn with_maintenance_check_interval(mut self, interval: Duration) -> Self {
        self.maintenance_check_interval = interval;
        self
    }

    pub fn with_execution_history(mut self, rows: usize) -> Self {
        self.execution_history = rows.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub maintenance_mode: bool,
    pub queue_depth: usize,
    pub running_count: usize,
    pub task_count: usize,
    /// Newest first.
    pub recent_executions: Vec<TaskExecution>,
}

const RECENT_EXECUTIONS: usize = 20;

struct TaskEntry {
    task: ScheduledTask,
    schedule: cron::Schedule,
    handler: Arc<dyn TaskHandler>,
}

struct QueuedRun {
    task_id: TaskId,
    kind: TaskKind,
    configuration: Option<TaskConfiguration>,
    trigger: TaskTrigger,
}

struct Lifecycle {
    shutdown: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

enum AttemptEnd {
    Finished(Result<TaskOutcome, TaskError>),
    TimedOut,
}

/// Registry and executor of scheduled tasks.
pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    monitoring: Arc<MonitoringService>,
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,
    heap: Mutex<CronHeap>,
    wait_queue: Mutex<VecDeque<QueuedRun>>,
    executions: RwLock<VecDeque<TaskExecution>>,
    slots: Arc<Semaphore>,
    maintenance: AtomicBool,
    wake: Notify,
    lifecycle: Mutex<Option<Lifecycle>>,
}

impl TaskOrchestrator {
    pub fn new(config: OrchestratorConfig, monitoring: Arc<MonitoringService>) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config,
            monitoring,
            tasks: RwLock::new(HashMap::new()),
            heap: Mutex::new(CronHeap::default()),
            wait_queue: Mutex::new(VecDeque::new()),
            executions: RwLock::new(VecDeque::new()),
            slots,
            maintenance: AtomicBool::new(false),
            wake: Notify::new(),
            lifecycle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a task and its handler. Dependencies must already be registered.
    pub async fn add_task(
        &self,
        mut task: ScheduledTask,
        handler: Arc<dyn TaskHandler>,
    ) -> OrchestratorResult<TaskId> {
        let schedule = parse_schedule(&task.schedule)?;
        let mut tasks = self.tasks.write().await;
        if let Some(missing) = task
            .dependencies
            .iter()
            .find(|dep| **dep == task.id || !tasks.contains_key(dep))
        {
            return Err(OrchestratorError::UnknownDependency {
                task: task.name.clone(),
                dependency: *missing,
            });
        }

        task.next_run = next_fire(&schedule, Utc::now());
        let id = task.id;
        if let Some(at) = task.next_run {
            self.heap.lock().await.push(at, id);
        }
        info!(
            task_id = %id,
            task = %task.name,
            kind = task.kind.as_str(),
            schedule = %task.schedule,
            dependencies = task.dependencies.len(),
            next_run = ?task.next_run,
            "Task registered"
        );
        tasks.insert(
            id,
            TaskEntry {
                task,
                schedule,
                handler,
            },
        );
        drop(tasks);
        self.wake.notify_one();
        Ok(id)
    }

    pub async fn set_enabled(&self, task_id: TaskId, enabled: bool) -> OrchestratorResult<()> {
        let mut tasks = self.tasks.write().await;
        let entry = tasks
            .get_mut(&task_id)
            .ok_or(OrchestratorError::TaskNotFound(task_id))?;
        entry.task.enabled = enabled;
        Ok(())
    }

    pub async fn task(&self, task_id: TaskId) -> Option<ScheduledTask> {
        self.tasks.read().await.get(&task_id).map(|e| e.task.clone())
    }

    pub async fn tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<_> = self
            .tasks
            .read()
            .await
            .values()
            .map(|e| e.task.clone())
            .collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    /// Execution rows, oldest first, optionally for one task.
    pub async fn executions(&self, task_id: Option<TaskId>) -> Vec<TaskExecution> {
        self.executions
            .read()
            .await
            .iter()
            .filter(|e| task_id.map_or(true, |id| e.task_id == id))
            .cloned()
            .collect()
    }

    async fn check_dependencies(&self, task_id: TaskId) -> OrchestratorResult<()> {
        let tasks = self.tasks.read().await;
        let entry = tasks
            .get(&task_id)
            .ok_or(OrchestratorError::TaskNotFound(task_id))?;
        let satisfied = entry.task.dependencies.iter().all(|dep| {
            tasks
                .get(dep)
                .is_some_and(|d| d.task.unblocks_dependants())
        });
        if satisfied {
            Ok(())
        } else {
            Err(OrchestratorError::DependenciesNotMet(task_id))
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the cron, queue-drain and maintenance loops.
    pub async fn start(self: &Arc<Self>) -> OrchestratorResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(OrchestratorError::AlreadyRunning);
        }

        let (task_count, scheduled) = {
            let now = Utc::now();
            let mut tasks = self.tasks.write().await;
            let mut heap = self.heap.lock().await;
            heap.clear();
            for entry in tasks.values_mut() {
                entry.task.next_run = next_fire(&entry.schedule, now);
                if let Some(at) = entry.task.next_run {
                    heap.push(at, entry.task.id);
                }
            }
            (tasks.len(), heap.len())
        };

        let shutdown = CancellationToken::new();
        let loops = vec![
            tokio::spawn(Arc::clone(self).run_cron_loop(shutdown.clone())),
            tokio::spawn(Arc::clone(self).run_drain_loop(shutdown.clone())),
            tokio::spawn(Arc::clone(self).run_maintenance_loop(shutdown.clone())),
        ];
        *lifecycle = Some(Lifecycle { shutdown, loops });

        info!(
            tasks = task_count,
            scheduled,
            max_concurrency = self.config.max_concurrency,
            "Task orchestrator started"
        );
        Ok(())
    }

    /// Stop the loops, cancel running executions and drop queued runs.
    pub async fn stop(&self) -> OrchestratorResult<()> {
        let lifecycle = self
            .lifecycle
            .lock()
            .await
            .take()
            .ok_or(OrchestratorError::NotRunning)?;
        lifecycle.shutdown.cancel();
        for result in join_all(lifecycle.loops).await {
            if let Err(e) = result {
                error!(error = %e, "Orchestrator loop ended abnormally");
            }
        }

        let running = self.running_count();
        if running > 0 {
            info!(count = running, "Waiting for running executions to finish");
            let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
            while self.running_count() > 0 && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        let dropped = self.wait_queue.lock().await.drain(..).count();
        info!(dropped_queued_runs = dropped, "Task orchestrator stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }

    pub fn is_maintenance_mode(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    fn running_count(&self) -> usize {
        self.config.max_concurrency - self.slots.available_permits()
    }

    /// Token that attempts derive from; cancelled by [`stop`](Self::stop).
    async fn run_token(&self) -> CancellationToken {
        self.lifecycle
            .lock()
            .await
            .as_ref()
            .map(|l| l.shutdown.child_token())
            .unwrap_or_default()
    }

    async fn run_cron_loop(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            self.fire_due().await;

            let wait = match self.heap.lock().await.next_deadline() {
                Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
                None => self.config.idle_poll_interval,
            };
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!("Cron loop stopped");
    }

    async fn fire_due(self: &Arc<Self>) {
        let now = Utc::now();
        let due = self.heap.lock().await.pop_due(now);
        if due.is_empty() {
            return;
        }

        let mut ready = Vec::new();
        let mut rescheduled = Vec::new();
        {
            let mut tasks = self.tasks.write().await;
            for (at, task_id) in due {
                let Some(entry) = tasks.get_mut(&task_id) else {
                    continue;
                };
                if entry.task.next_run != Some(at) {
                    continue;
                }
                entry.task.next_run = next_fire(&entry.schedule, now);
                if let Some(next) = entry.task.next_run {
                    rescheduled.push((next, task_id));
                }
                if entry.task.enabled {
                    ready.push((entry.task.priority, task_id));
                }
            }
        }
        {
            let mut heap = self.heap.lock().await;
            for (at, task_id) in rescheduled {
                heap.push(at, task_id);
            }
        }

        ready.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, task_id) in ready {
            if let Err(e) = self.dispatch(task_id).await {
                debug!(task_id = %task_id, error = %e, "Scheduled run skipped");
            }
        }
    }

    async fn run_drain_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.queue_drain_interval);
        interval.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.drain_wait_queue().await,
            }
        }
    }

    async fn run_maintenance_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.maintenance_check_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.check_maintenance().await;
                }
            }
        }
    }

    /// Enter maintenance mode when system health is critical or down, leave
    /// it otherwise. Returns the new mode.
    pub async fn check_maintenance(self: &Arc<Self>) -> bool {
        let status = self.monitoring.get_system_status().await;
        let enter = status.overall.is_critical();
        let was = self.maintenance.swap(enter, Ordering::SeqCst);
        if enter && !was {
            warn!(status = ?status.overall, "Entering maintenance mode; dispatch suppressed");
        } else if !enter && was {
            info!(status = ?status.overall, "Leaving maintenance mode");
            self.drain_wait_queue().await;
        }
        enter
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Queue a run of `task_id` behind any waiting runs and start it when a
    /// slot is free.
    pub async fn dispatch(self: &Arc<Self>, task_id: TaskId) -> OrchestratorResult<()> {
        let kind = self.ensure_dispatchable(task_id).await?;
        let depth = {
            let mut queue = self.wait_queue.lock().await;
            queue.push_back(QueuedRun {
                task_id,
                kind,
                configuration: None,
                trigger: TaskTrigger::Schedule,
            });
            queue.len()
        };
        debug!(task_id = %task_id, queue_depth = depth, "Task run queued");
        self.drain_wait_queue().await;
        Ok(())
    }

    /// Health checks keep running in maintenance mode.
    async fn ensure_dispatchable(&self, task_id: TaskId) -> OrchestratorResult<TaskKind> {
        let kind = {
            let tasks = self.tasks.read().await;
            let entry = tasks
                .get(&task_id)
                .ok_or(OrchestratorError::TaskNotFound(task_id))?;
            if !entry.task.enabled {
                return Err(OrchestratorError::TaskDisabled(task_id));
            }
            entry.task.kind
        };
        if kind != TaskKind::HealthCheck && self.is_maintenance_mode() {
            return Err(OrchestratorError::MaintenanceMode);
        }
        self.check_dependencies(task_id).await?;
        Ok(kind)
    }

    async fn drain_wait_queue(self: &Arc<Self>) {
        let maintenance = self.is_maintenance_mode();
        let mut queue = self.wait_queue.lock().await;
        while let Some(pos) = queue
            .iter()
            .position(|run| !maintenance || run.kind == TaskKind::HealthCheck)
        {
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                break;
            };
            let Some(run) = queue.remove(pos) else {
                break;
            };
            self.spawn_run(run, permit);
        }
    }

    fn spawn_run(self: &Arc<Self>, run: QueuedRun, permit: OwnedSemaphorePermit) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this
                .run_with_retries(run.task_id, run.configuration, run.trigger)
                .await
            {
                warn!(task_id = %run.task_id, error = %e, "Queued run could not start");
            }
            drop(permit);
            this.drain_wait_queue().await;
        });
    }

    /// Run a task now, waiting for a free slot, and return its final attempt.
    ///
    /// `configuration` replaces the task's own policy for this run only.
    pub async fn execute_task(
        self: &Arc<Self>,
        task_id: TaskId,
        configuration: Option<TaskConfiguration>,
    ) -> OrchestratorResult<TaskExecution> {
        self.ensure_dispatchable(task_id).await?;
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| OrchestratorError::NotRunning)?;
        let execution = self
            .run_with_retries(task_id, configuration, TaskTrigger::Manual)
            .await;
        drop(permit);
        self.drain_wait_queue().await;
        execution
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    async fn run_with_retries(
        &self,
        task_id: TaskId,
        configuration: Option<TaskConfiguration>,
        trigger: TaskTrigger,
    ) -> OrchestratorResult<TaskExecution> {
        let (task, handler) = {
            let tasks = self.tasks.read().await;
            let entry = tasks
                .get(&task_id)
                .ok_or(OrchestratorError::TaskNotFound(task_id))?;
            (entry.task.clone(), Arc::clone(&entry.handler))
        };
        let config = configuration.unwrap_or_else(|| task.configuration.clone());
        let run_id = RunId::new();
        let parent = self.run_token().await;
        let max_attempts = config.retry_attempts + 1;

        let mut pending =
            TaskExecution::new(task.id, &task.name, run_id, 1, trigger, ExecutionStatus::Pending);
        self.record_execution(&pending).await;

        let last = loop {
            let execution = self
                .run_attempt(&task, &handler, &config, pending, &parent)
                .await;
            if !execution.status.is_retryable() || execution.attempt >= max_attempts {
                break execution;
            }

            let next_attempt = execution.attempt + 1;
            info!(
                task_id = %task.id,
                task = %task.name,
                attempt = next_attempt,
                delay_secs = config.retry_delay.as_secs(),
                error = ?execution.error,
                "Retrying task"
            );
            pending = TaskExecution::new(
                task.id,
                &task.name,
                run_id,
                next_attempt,
                trigger,
                ExecutionStatus::Retrying,
            );
            self.record_execution(&pending).await;

            let cancelled = tokio::select! {
                _ = parent.cancelled() => true,
                _ = tokio::time::sleep(config.retry_delay) => false,
            };
            if cancelled {
                pending.status = ExecutionStatus::Cancelled;
                pending.error = Some("cancelled before retry".to_string());
                pending.finished_at = Some(Utc::now());
                self.record_execution(&pending).await;
                break pending;
            }
        };

        self.finish_run(&task, &config, &last).await;
        Ok(last)
    }

    async fn run_attempt(
        &self,
        task: &ScheduledTask,
        handler: &Arc<dyn TaskHandler>,
        config: &TaskConfiguration,
        mut execution: TaskExecution,
        parent: &CancellationToken,
    ) -> TaskExecution {
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());
        self.record_execution(&execution).await;
        debug!(
            task_id = %task.id,
            task = %task.name,
            execution_id = %execution.execution_id,
            attempt = execution.attempt,
            "Task attempt started"
        );

        let cancel = parent.child_token();
        let ctx = TaskContext {
            task_id: task.id,
            task_name: task.name.clone(),
            execution_id: execution.execution_id,
            run_id: execution.run_id,
            attempt: execution.attempt,
            parameters: config.parameters.clone(),
            cancel: cancel.clone(),
        };
        let timing = self.monitoring.start_timing(format!("task:{}", task.name));

        let end = tokio::select! {
            outcome = handler.run(ctx) => AttemptEnd::Finished(outcome),
            _ = cancel.cancelled() => AttemptEnd::Finished(Err(TaskError::Cancelled)),
            _ = tokio::time::sleep(config.max_duration) => AttemptEnd::TimedOut,
        };
        // Release anything the handler spawned from its context.
        cancel.cancel();

        match end {
            AttemptEnd::Finished(Ok(outcome)) => {
                execution.status = ExecutionStatus::Completed;
                execution.data_changes = outcome.data_changes;
                execution.metrics = outcome.metrics;
            }
            AttemptEnd::Finished(Err(TaskError::Cancelled)) => {
                execution.status = ExecutionStatus::Cancelled;
                execution.error = Some(TaskError::Cancelled.to_string());
            }
            AttemptEnd::Finished(Err(e)) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(e.to_string());
            }
            AttemptEnd::TimedOut => {
                execution.status = ExecutionStatus::Timeout;
                execution.error = Some(format!(
                    "exceeded max duration of {}s",
                    config.max_duration.as_secs()
                ));
            }
        }
        execution.finished_at = Some(Utc::now());

        let success = execution.status == ExecutionStatus::Completed;
        self.monitoring.end_timing(timing, success).await;
        if !success {
            let kind = if execution.status == ExecutionStatus::Timeout {
                ErrorKind::Timeout
            } else {
                ErrorKind::Task
            };
            let message = execution.error.clone().unwrap_or_default();
            warn!(
                task_id = %task.id,
                task = %task.name,
                attempt = execution.attempt,
                status = ?execution.status,
                error = %message,
                "Task attempt failed"
            );
            self.monitoring
                .record_error(kind, &format!("task:{}", task.name), None, message)
                .await;
        }

        self.record_execution(&execution).await;
        execution
    }

    async fn finish_run(
        &self,
        task: &ScheduledTask,
        config: &TaskConfiguration,
        last: &TaskExecution,
    ) {
        let started_at = last.started_at.unwrap_or(last.created_at);
        if let Some(entry) = self.tasks.write().await.get_mut(&task.id) {
            entry.task.record_run(last.status, started_at);
        }

        let success = last.status == ExecutionStatus::Completed;
        if success {
            info!(
                task_id = %task.id,
                task = %task.name,
                attempts = last.attempt,
                duration_ms = ?last.duration_ms(),
                "Task completed"
            );
            if config.alert_on_success {
                self.monitoring
                    .create_alert(
                        AlertSeverity::Info,
                        "orchestrator",
                        format!("Task {} completed", task.name),
                        format!("completed after {} attempt(s)", last.attempt),
                    )
                    .await;
            }
        } else if config.alert_on_failure {
            self.monitoring
                .create_alert(
                    AlertSeverity::Error,
                    "orchestrator",
                    format!("Task {} failed", task.name),
                    format!(
                        "{} after {} attempt(s): {}",
                        last.status.as_str(),
                        last.attempt,
                        last.error.as_deref().unwrap_or("unknown error")
                    ),
                )
                .await;
        }
    }

    async fn record_execution(&self, execution: &TaskExecution) {
        let mut history = self.executions.write().await;
        if let Some(existing) = history
            .iter_mut()
            .rev()
            .find(|e| e.execution_id == execution.execution_id)
        {
            *existing = execution.clone();
            return;
        }
        history.push_back(execution.clone());
        while history.len() > self.config.execution_history {
            history.pop_front();
        }
    }

    // ------------------------------------------------------------------
    // Status and reporting
    // ------------------------------------------------------------------

    pub async fn get_status(&self) -> OrchestratorStatus {
        let recent_executions = self
            .executions
            .read()
            .await
            .iter()
            .rev()
            .take(RECENT_EXECUTIONS)
            .cloned()
            .collect();
        OrchestratorStatus {
            is_running: self.is_running().await,
            maintenance_mode: self.is_maintenance_mode(),
            queue_depth: self.wait_queue.lock().await.len(),
            running_count: self.running_count(),
            task_count: self.tasks.read().await.len(),
            recent_executions,
        }
    }

    /// Per-task counters, data changes and system health for `timeframe`.
    pub async fn generate_report(&self, timeframe: Timeframe) -> OrchestrationReport {
        let generated_at = Utc::now();
        let since = timeframe.since(generated_at);

        let window: Vec<TaskExecution> = self
            .executions
            .read()
            .await
            .iter()
            .filter(|e| e.created_at >= since)
            .cloned()
            .collect();

        let mut data_changes = DataChangeCounters::default();
        for execution in window
            .iter()
            .filter(|e| e.status == ExecutionStatus::Completed)
        {
            data_changes += execution.data_changes;
        }

        let tasks: Vec<TaskReport> = self
            .tasks()
            .await
            .iter()
            .map(|task| {
                let rows: Vec<&TaskExecution> =
                    window.iter().filter(|e| e.task_id == task.id).collect();
                TaskReport::new(task, &rows)
            })
            .collect();

        let system_health = self.monitoring.get_system_status().await;
        let status = self.get_status().await;
        let recommendations = report::recommendations(
            &tasks,
            &system_health,
            status.maintenance_mode,
            status.queue_depth,
        );

        OrchestrationReport {
            timeframe,
            since,
            generated_at,
            is_running: status.is_running,
            maintenance_mode: status.maintenance_mode,
            queue_depth: status.queue_depth,
            tasks,
            data_changes,
            system_health,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::ServiceHealth;
    use crate::testing::ScriptedHandler;
    use crate::types::HealthStatus;

    fn orchestrator() -> (Arc<TaskOrchestrator>, Arc<MonitoringService>) {
        let monitoring = Arc::new(MonitoringService::default().with_memory_probe(|| 1024));
        let orchestrator = Arc::new(TaskOrchestrator::new(
            OrchestratorConfig::default(),
            Arc::clone(&monitoring),
        ));
        (orchestrator, monitoring)
    }

    fn task(name: &str) -> ScheduledTask {
        ScheduledTask::builder()
            .name(name)
            .kind(TaskKind::CrawlCycle)
            .schedule("0 0 3 * * *")
            .configuration(
                TaskConfiguration::builder()
                    .retry_attempts(0)
                    .retry_delay(Duration::from_secs(10))
                    .max_duration(Duration::from_secs(60))
                    .build(),
            )
            .build()
    }

    #[tokio::test]
    async fn add_task_validates_schedule_and_dependencies() {
        let (orchestrator, _) = orchestrator();
        let handler = Arc::new(ScriptedHandler::new());

        let mut bad = task("bad");
        bad.schedule = "whenever".into();
        assert!(matches!(
            orchestrator.add_task(bad, handler.clone()).await,
            Err(OrchestratorError::InvalidSchedule { .. })
        ));

        let mut orphan = task("orphan");
        orphan.dependencies = vec![TaskId::new()];
        assert!(matches!(
            orchestrator.add_task(orphan, handler.clone()).await,
            Err(OrchestratorError::UnknownDependency { .. })
        ));

        let id = orchestrator.add_task(task("ok"), handler).await.unwrap();
        assert!(orchestrator.task(id).await.unwrap().next_run.is_some());
    }

    #[tokio::test]
    async fn successful_run_updates_counters() {
        let (orchestrator, _) = orchestrator();
        let handler = Arc::new(ScriptedHandler::new().with_changes(DataChangeCounters {
            records_created: 3,
            ..Default::default()
        }));
        let id = orchestrator.add_task(task("crawl"), handler.clone()).await.unwrap();

        let execution = orchestrator.execute_task(id, None).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.trigger, TaskTrigger::Manual);
        assert_eq!(execution.data_changes.records_created, 3);

        let task = orchestrator.task(id).await.unwrap();
        assert_eq!((task.run_count, task.success_count, task.failure_count), (1, 1, 0));
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_are_retried() {
        let (orchestrator, _) = orchestrator();
        let handler = Arc::new(ScriptedHandler::new().then_fail("reset").then_fail("reset"));
        let mut retried = task("flaky");
        retried.configuration.retry_attempts = 2;
        let id = orchestrator.add_task(retried, handler.clone()).await.unwrap();

        let execution = orchestrator.execute_task(id, None).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.attempt, 3);

        let rows = orchestrator.executions(Some(id)).await;
        let statuses: Vec<_> = rows.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![ExecutionStatus::Failed, ExecutionStatus::Failed, ExecutionStatus::Completed]
        );
        assert!(rows.iter().all(|e| e.run_id == execution.run_id));

        let task = orchestrator.task(id).await.unwrap();
        assert_eq!((task.run_count, task.success_count, task.failure_count), (1, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_attempt_and_alerts() {
        let (orchestrator, monitoring) = orchestrator();
        let handler = Arc::new(ScriptedHandler::new().then_hang());
        let id = orchestrator.add_task(task("stuck"), handler.clone()).await.unwrap();

        let execution = orchestrator.execute_task(id, None).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Timeout);
        assert_eq!(handler.running(), 0);

        let task = orchestrator.task(id).await.unwrap();
        assert_eq!(task.failure_count, 1);
        let alerts = monitoring.alerts(false).await;
        assert!(alerts
            .iter()
            .any(|a| a.source == "orchestrator" && a.title == "Task stuck failed"));
    }

    #[tokio::test]
    async fn failing_dependency_blocks_dependants() {
        let (orchestrator, _) = orchestrator();
        let upstream = orchestrator
            .add_task(task("upstream"), Arc::new(ScriptedHandler::new().then_fail("boom")))
            .await
            .unwrap();
        let mut downstream = task("downstream");
        downstream.dependencies = vec![upstream];
        let downstream = orchestrator
            .add_task(downstream, Arc::new(ScriptedHandler::new()))
            .await
            .unwrap();

        assert!(matches!(
            orchestrator.execute_task(downstream, None).await,
            Err(OrchestratorError::DependenciesNotMet(_))
        ));
        orchestrator.execute_task(upstream, None).await.unwrap();
        assert!(matches!(
            orchestrator.execute_task(downstream, None).await,
            Err(OrchestratorError::DependenciesNotMet(_))
        ));
        orchestrator.execute_task(upstream, None).await.unwrap();
        assert!(matches!(
            orchestrator.execute_task(downstream, None).await,
            Err(OrchestratorError::DependenciesNotMet(_))
        ));
        orchestrator.execute_task(upstream, None).await.unwrap();
        let execution = orchestrator.execute_task(downstream, None).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_capped_with_fifo_queue() {
        let (orchestrator, _) = orchestrator();
        let handler = Arc::new(ScriptedHandler::new().with_delay(Duration::from_secs(2)));
        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(
                orchestrator
                    .add_task(task(&format!("task-{}", i)), handler.clone())
                    .await
                    .unwrap(),
            );
        }
        for id in &ids {
            orchestrator.dispatch(*id).await.unwrap();
        }

        let status = orchestrator.get_status().await;
        assert_eq!(status.running_count, 5);
        assert_eq!(status.queue_depth, 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let status = orchestrator.get_status().await;
        assert_eq!(status.running_count, 0);
        assert_eq!(status.queue_depth, 0);
        assert_eq!(handler.calls(), 8);
        assert_eq!(handler.max_concurrent(), 5);
    }

    #[tokio::test]
    async fn maintenance_mode_follows_system_health() {
        let (orchestrator, monitoring) = orchestrator();
        let id = orchestrator
            .add_task(task("crawl"), Arc::new(ScriptedHandler::new()))
            .await
            .unwrap();

        monitoring
            .set_health("storage", ServiceHealth::with_status(HealthStatus::Down), 5)
            .await;
        assert!(orchestrator.check_maintenance().await);
        assert!(matches!(
            orchestrator.execute_task(id, None).await,
            Err(OrchestratorError::MaintenanceMode)
        ));

        monitoring.set_health("storage", ServiceHealth::healthy(), 5).await;
        assert!(!orchestrator.check_maintenance().await);
        assert!(orchestrator.execute_task(id, None).await.is_ok());
    }

    #[tokio::test]
    async fn health_checks_run_during_maintenance() {
        let (orchestrator, monitoring) = orchestrator();
        let crawl = orchestrator
            .add_task(task("crawl"), Arc::new(ScriptedHandler::new()))
            .await
            .unwrap();
        let mut health_task = task("health");
        health_task.kind = TaskKind::HealthCheck;
        let health_handler = Arc::new(ScriptedHandler::new());
        let health = orchestrator
            .add_task(health_task, health_handler.clone())
            .await
            .unwrap();

        monitoring
            .set_health("storage", ServiceHealth::with_status(HealthStatus::Critical), 5)
            .await;
        assert!(orchestrator.check_maintenance().await);
        assert!(matches!(
            orchestrator.dispatch(crawl).await,
            Err(OrchestratorError::MaintenanceMode)
        ));

        let run = orchestrator.execute_task(health, None).await.unwrap();
        assert_eq!(run.status, ExecutionStatus::Completed);
        orchestrator.dispatch(health).await.unwrap();
        for _ in 0..50 {
            if health_handler.calls() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(health_handler.calls(), 2);
        assert_eq!(orchestrator.get_status().await.queue_depth, 0);
    }

    #[tokio::test]
    async fn start_and_stop_are_guarded() {
        let (orchestrator, _) = orchestrator();
        orchestrator.start().await.unwrap();
        assert!(matches!(
            orchestrator.start().await,
            Err(OrchestratorError::AlreadyRunning)
        ));
        assert!(orchestrator.get_status().await.is_running);
        orchestrator.stop().await.unwrap();
        assert!(matches!(
            orchestrator.stop().await,
            Err(OrchestratorError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn report_aggregates_runs() {
        let (orchestrator, _) = orchestrator();
        let flaky = orchestrator
            .add_task(
                task("flaky"),
                Arc::new(ScriptedHandler::new().then_fail("x").then_fail("y")),
            )
            .await
            .unwrap();
        let steady = orchestrator
            .add_task(
                task("steady"),
                Arc::new(ScriptedHandler::new().with_changes(DataChangeCounters {
                    urls_queued: 4,
                    ..Default::default()
                })),
            )
            .await
            .unwrap();
        for _ in 0..3 {
            orchestrator.execute_task(flaky, None).await.unwrap();
        }
        orchestrator.execute_task(steady, None).await.unwrap();

        let report = orchestrator.generate_report(Timeframe::Day).await;
        assert_eq!(report.tasks.len(), 2);
        let flaky_report = report.tasks.iter().find(|t| t.name == "flaky").unwrap();
        assert_eq!(flaky_report.failures_in_window, 2);
        assert_eq!(report.data_changes.urls_queued, 4);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("'flaky'") && r.contains("33%")));
    }
}
