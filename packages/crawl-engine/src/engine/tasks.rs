//! Orchestrator handlers that drive the crawl engine.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::CrawlEngine;
use crate::error::{OrchestratorResult, TaskError, TaskResult};
use crate::monitoring::MonitoringService;
use crate::orchestrator::{
    ScheduledTask, TaskConfiguration, TaskContext, TaskHandler, TaskKind, TaskOrchestrator,
    TaskOutcome,
};
use crate::types::{HealthStatus, TaskId};

pub const CRAWL_CYCLE: &str = "crawl-cycle";
pub const HEALTH_CHECK: &str = "health-check";
pub const MONITORING_CLEANUP: &str = "monitoring-cleanup";
pub const BULK_DEDUP: &str = "bulk-dedup";

/// Runs one crawl cycle. Reads `max_pages` from the task parameters.
pub struct CrawlCycleTask {
    engine: Arc<CrawlEngine>,
}

impl CrawlCycleTask {
    pub fn new(engine: Arc<CrawlEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for CrawlCycleTask {
    async fn run(&self, ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let max_pages = ctx
            .parameter_u64("max_pages")
            .map(|n| n as usize)
            .unwrap_or(self.engine.config().pages_per_cycle);
        let changes = self.engine.crawl_cycle(max_pages, &ctx.cancel).await?;
        let stats = self.engine.scheduler().stats(Utc::now()).await;
        Ok(TaskOutcome::new()
            .with_changes(changes)
            .with_metric("queue_total", stats.total as u64)
            .with_metric("queue_due", stats.due as u64)
            .with_metric("queue_failed", stats.failed as u64))
    }
}

/// Refreshes component health. Fails when storage is unreachable.
pub struct HealthCheckTask {
    engine: Arc<CrawlEngine>,
}

impl HealthCheckTask {
    pub fn new(engine: Arc<CrawlEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for HealthCheckTask {
    async fn run(&self, _ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let checks = self.engine.check_health().await;
        if let Some(storage) = checks
            .iter()
            .find(|c| c.service == "storage" && c.status == HealthStatus::Down)
        {
            return Err(TaskError::failed(format!(
                "storage unavailable: {}",
                storage.message.as_deref().unwrap_or("no response")
            )));
        }
        let worst = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or_default();
        Ok(TaskOutcome::new()
            .with_metric("services", checks.len() as u64)
            .with_metric("worst_status", format!("{:?}", worst).to_lowercase()))
    }
}

pub struct MonitoringCleanupTask {
    monitoring: Arc<MonitoringService>,
}

impl MonitoringCleanupTask {
    pub fn new(monitoring: Arc<MonitoringService>) -> Self {
        Self { monitoring }
    }
}

#[async_trait]
impl TaskHandler for MonitoringCleanupTask {
    async fn run(&self, _ctx: TaskContext) -> TaskResult<TaskOutcome> {
        let stats = self.monitoring.cleanup(Utc::now()).await;
        Ok(TaskOutcome::new()
            .with_metric("errors_removed", stats.errors_removed as u64)
            .with_metric("performance_removed", stats.performance_removed as u64)
            .with_metric("alerts_removed", stats.alerts_removed as u64)
            .with_metric("sessions_removed", stats.sessions_removed as u64))
    }
}

/// Re-checks recently updated records for duplicates.
pub struct BulkDedupTask {
    engine: Arc<CrawlEngine>,
}

impl BulkDedupTask {
    pub fn new(engine: Arc<CrawlEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for BulkDedupTask {
    async fn run(&self, ctx: TaskContext) -> TaskResult<TaskOutcome> {
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        let changes = self.engine.bulk_deduplicate().await?;
        Ok(TaskOutcome::new().with_changes(changes))
    }
}

/// Cron expressions of the standard tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSchedules {
    pub health_check: String,
    pub crawl_cycle: String,
    pub bulk_dedup: String,
    pub monitoring_cleanup: String,
}

impl Default for TaskSchedules {
    fn default() -> Self {
        Self {
            health_check: "0 */5 * * * *".to_string(),
            crawl_cycle: "0 * * * * *".to_string(),
            bulk_dedup: "0 0 * * * *".to_string(),
            monitoring_cleanup: "0 30 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardTaskIds {
    pub health_check: TaskId,
    pub crawl_cycle: TaskId,
    pub bulk_dedup: TaskId,
    pub monitoring_cleanup: TaskId,
}

/// Register the standard task set.
///
/// Crawling waits on a healthy health check, bulk dedup on a successful crawl.
pub async fn register_standard_tasks(
    orchestrator: &TaskOrchestrator,
    engine: Arc<CrawlEngine>,
    schedules: &TaskSchedules,
) -> OrchestratorResult<StandardTaskIds> {
    let health_check = orchestrator
        .add_task(
            ScheduledTask::builder()
                .name(HEALTH_CHECK)
                .kind(TaskKind::HealthCheck)
                .schedule(schedules.health_check.as_str())
                .priority(9)
                .configuration(
                    TaskConfiguration::builder()
                        .max_duration(std::time::Duration::from_secs(60))
                        .retry_attempts(1)
                        .retry_delay(std::time::Duration::from_secs(10))
                        .build(),
                )
                .build(),
            Arc::new(HealthCheckTask::new(Arc::clone(&engine))),
        )
        .await?;

    let mut crawl_parameters = serde_json::Map::new();
    crawl_parameters.insert(
        "max_pages".to_string(),
        (engine.config().pages_per_cycle as u64).into(),
    );
    let crawl_cycle = orchestrator
        .add_task(
            ScheduledTask::builder()
                .name(CRAWL_CYCLE)
                .kind(TaskKind::CrawlCycle)
                .schedule(schedules.crawl_cycle.as_str())
                .priority(7)
                .dependencies(vec![health_check])
                .configuration(
                    TaskConfiguration::builder()
                        .max_duration(std::time::Duration::from_secs(15 * 60))
                        .retry_attempts(0)
                        .parameters(crawl_parameters)
                        .build(),
                )
                .build(),
            Arc::new(CrawlCycleTask::new(Arc::clone(&engine))),
        )
        .await?;

    let bulk_dedup = orchestrator
        .add_task(
            ScheduledTask::builder()
                .name(BULK_DEDUP)
                .kind(TaskKind::Deduplication)
                .schedule(schedules.bulk_dedup.as_str())
                .priority(4)
                .dependencies(vec![crawl_cycle])
                .build(),
            Arc::new(BulkDedupTask::new(Arc::clone(&engine))),
        )
        .await?;

    let monitoring_cleanup = orchestrator
        .add_task(
            ScheduledTask::builder()
                .name(MONITORING_CLEANUP)
                .kind(TaskKind::Cleanup)
                .schedule(schedules.monitoring_cleanup.as_str())
                .priority(2)
                .configuration(TaskConfiguration::builder().alert_on_failure(false).build())
                .build(),
            Arc::new(MonitoringCleanupTask::new(Arc::clone(engine.monitoring()))),
        )
        .await?;

    info!(
        health_check = %health_check,
        crawl_cycle = %crawl_cycle,
        bulk_dedup = %bulk_dedup,
        monitoring_cleanup = %monitoring_cleanup,
        "Standard tasks registered"
    );
    Ok(StandardTaskIds {
        health_check,
        crawl_cycle,
        bulk_dedup,
        monitoring_cleanup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{DedupConfig, DeduplicationEngine};
    use crate::discovery::{DiscoveryConfig, UrlDiscovery};
    use crate::engine::PipelineConfig;
    use crate::error::OrchestratorError;
    use crate::extraction::ContentExtractor;
    use crate::orchestrator::{ExecutionStatus, OrchestratorConfig};
    use crate::scheduler::{CrawlScheduler, CrawlTarget, SchedulerConfig};
    use crate::stores::MemoryStorage;
    use crate::testing::MockFetcher;

    const APPLICATION: &str = "https://council.gov.uk/planning-applications/24-00123-ful";
    const PLANNING_PAGE: &str = r#"<html><head><title>24/00123/FUL</title></head><body>
        <h1>Planning application 24/00123/FUL</h1>
        <dl>
          <dt>Application number</dt><dd class="application-number">24/00123/FUL</dd>
          <dt>Site address</dt><dd class="address">12 High Street, Anytown AB1 2CD</dd>
        </dl></body></html>"#;

    async fn setup() -> (Arc<TaskOrchestrator>, Arc<CrawlEngine>, StandardTaskIds) {
        let storage = Arc::new(MemoryStorage::new());
        let monitoring = Arc::new(MonitoringService::default().with_memory_probe(|| 1024));
        let scheduler = Arc::new(CrawlScheduler::new(
            SchedulerConfig::default().with_default_rate_limit(600),
        ));
        scheduler
            .register_target(CrawlTarget::new("council.gov.uk", 5.0))
            .await
            .unwrap();
        let engine = Arc::new(CrawlEngine::new(
            PipelineConfig::default().with_pages_per_cycle(5),
            scheduler,
            UrlDiscovery::new(DiscoveryConfig::default()),
            ContentExtractor::default(),
            Arc::new(DeduplicationEngine::new(storage.clone(), DedupConfig::default())),
            storage,
            Arc::new(MockFetcher::new().with_page(APPLICATION, PLANNING_PAGE, "text/html")),
            Arc::clone(&monitoring),
        ));
        let orchestrator = Arc::new(TaskOrchestrator::new(OrchestratorConfig::default(), monitoring));
        let ids = register_standard_tasks(&orchestrator, Arc::clone(&engine), &TaskSchedules::default())
            .await
            .unwrap();
        (orchestrator, engine, ids)
    }

    #[tokio::test]
    async fn registers_the_dependency_chain() {
        let (orchestrator, _, ids) = setup().await;
        let tasks = orchestrator.tasks().await;
        assert_eq!(tasks.len(), 4);

        let crawl = orchestrator.task(ids.crawl_cycle).await.unwrap();
        assert_eq!(crawl.dependencies, vec![ids.health_check]);
        let bulk = orchestrator.task(ids.bulk_dedup).await.unwrap();
        assert_eq!(bulk.dependencies, vec![ids.crawl_cycle]);
        assert!(orchestrator
            .task(ids.monitoring_cleanup)
            .await
            .unwrap()
            .dependencies
            .is_empty());
    }

    #[tokio::test]
    async fn crawl_waits_for_health_check() {
        let (orchestrator, engine, ids) = setup().await;
        engine.seed(&[APPLICATION.to_string()]).await;

        let blocked = orchestrator.execute_task(ids.crawl_cycle, None).await;
        assert!(matches!(blocked, Err(OrchestratorError::DependenciesNotMet(_))));

        let health = orchestrator.execute_task(ids.health_check, None).await.unwrap();
        assert_eq!(health.status, ExecutionStatus::Completed);

        let crawl = orchestrator.execute_task(ids.crawl_cycle, None).await.unwrap();
        assert_eq!(crawl.status, ExecutionStatus::Completed);
        assert_eq!(crawl.data_changes.pages_fetched, 1);
        assert_eq!(crawl.data_changes.records_created, 1);
        assert_eq!(crawl.metrics.get("queue_total"), Some(&serde_json::json!(1)));

        let bulk = orchestrator.execute_task(ids.bulk_dedup, None).await.unwrap();
        assert_eq!(bulk.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn maintenance_mode_clears_once_fetches_recover() {
        let (orchestrator, engine, ids) = setup().await;
        let missing = "https://council.gov.uk/planning-applications/missing";
        engine.seed(&[APPLICATION.to_string(), missing.to_string()]).await;
        for _ in 0..3 {
            engine.scheduler().mark_completed(missing, false).await.unwrap();
        }

        orchestrator.execute_task(ids.health_check, None).await.unwrap();
        assert!(orchestrator.check_maintenance().await);
        assert!(matches!(
            orchestrator.execute_task(ids.crawl_cycle, None).await,
            Err(OrchestratorError::MaintenanceMode)
        ));

        for _ in 0..20 {
            engine.scheduler().mark_completed(APPLICATION, true).await.unwrap();
        }
        let health = orchestrator.execute_task(ids.health_check, None).await.unwrap();
        assert_eq!(health.status, ExecutionStatus::Completed);
        assert!(!orchestrator.check_maintenance().await);

        let crawl = orchestrator.execute_task(ids.crawl_cycle, None).await.unwrap();
        assert_eq!(crawl.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn cleanup_task_reports_removed_entries() {
        let (orchestrator, _, ids) = setup().await;
        let run = orchestrator
            .execute_task(ids.monitoring_cleanup, None)
            .await
            .unwrap();
        assert_eq!(run.status, ExecutionStatus::Completed);
        assert_eq!(run.metrics.get("sessions_removed"), Some(&serde_json::json!(0)));
    }
}
