//! Integration tests for task orchestration under monitoring.
//!
//! These exercise the orchestrator through its public surface:
//! 1. Register tasks with dependencies
//! 2. Run them manually and on the wait queue
//! 3. React to system health via maintenance mode
//! 4. Report on what ran

use std::sync::Arc;
use std::time::Duration;

use crawl_engine::monitoring::{AlertSeverity, ServiceHealth};
use crawl_engine::orchestrator::{
    ExecutionStatus, OrchestratorConfig, ScheduledTask, TaskConfiguration, TaskKind,
};
use crawl_engine::testing::ScriptedHandler;
use crawl_engine::types::{HealthStatus, Timeframe};
use crawl_engine::{MonitoringService, OrchestratorError, TaskOrchestrator};

fn task(name: &str, kind: TaskKind) -> ScheduledTask {
    ScheduledTask::builder()
        .name(name)
        .kind(kind)
        .schedule("0 0 3 * * *")
        .configuration(
            TaskConfiguration::builder()
                .retry_attempts(0)
                .retry_delay(Duration::from_millis(10))
                .build(),
        )
        .build()
}

fn setup() -> (Arc<TaskOrchestrator>, Arc<MonitoringService>) {
    let monitoring = Arc::new(MonitoringService::default().with_memory_probe(|| 1024));
    let orchestrator = Arc::new(TaskOrchestrator::new(
        OrchestratorConfig::default(),
        Arc::clone(&monitoring),
    ));
    (orchestrator, monitoring)
}

#[tokio::test]
async fn test_failed_dependency_blocks_then_recovers() {
    let (orchestrator, monitoring) = setup();
    let upstream_handler = Arc::new(ScriptedHandler::new().then_fail("feed unavailable"));
    let upstream = orchestrator
        .add_task(task("discover-feeds", TaskKind::Discovery), upstream_handler.clone())
        .await
        .unwrap();
    let mut downstream_task = task("extract-feeds", TaskKind::Extraction);
    downstream_task.dependencies = vec![upstream];
    let downstream_handler = Arc::new(ScriptedHandler::new());
    let downstream = orchestrator
        .add_task(downstream_task, downstream_handler.clone())
        .await
        .unwrap();

    let failed = orchestrator.execute_task(upstream, None).await.unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("feed unavailable"));

    let alerts = monitoring.alerts(false).await;
    assert!(alerts
        .iter()
        .any(|a| a.severity == AlertSeverity::Error && a.title.contains("discover-feeds")));

    assert!(matches!(
        orchestrator.execute_task(downstream, None).await,
        Err(OrchestratorError::DependenciesNotMet(_))
    ));
    assert_eq!(downstream_handler.calls(), 0);

    // Two successes outweigh the one failure
    orchestrator.execute_task(upstream, None).await.unwrap();
    assert!(orchestrator.execute_task(downstream, None).await.is_err());
    orchestrator.execute_task(upstream, None).await.unwrap();
    let run = orchestrator.execute_task(downstream, None).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
    assert_eq!(downstream_handler.calls(), 1);
}

#[tokio::test]
async fn test_critical_health_suspends_dispatch() {
    let (orchestrator, monitoring) = setup();
    let id = orchestrator
        .add_task(task("health-report", TaskKind::Report), Arc::new(ScriptedHandler::new()))
        .await
        .unwrap();

    monitoring
        .set_health(
            "storage",
            ServiceHealth::with_status(HealthStatus::Critical).message("disk full"),
            5,
        )
        .await;
    assert!(orchestrator.check_maintenance().await);
    assert!(matches!(
        orchestrator.dispatch(id).await,
        Err(OrchestratorError::MaintenanceMode)
    ));
    assert!(orchestrator.get_status().await.maintenance_mode);

    monitoring
        .set_health("storage", ServiceHealth::healthy(), 5)
        .await;
    for alert in monitoring.alerts(false).await {
        monitoring.acknowledge_alert(alert.id).await;
    }
    assert!(!orchestrator.check_maintenance().await);

    let run = orchestrator.execute_task(id, None).await.unwrap();
    assert_eq!(run.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_lifecycle_and_report() {
    let (orchestrator, _) = setup();
    let steady = orchestrator
        .add_task(task("steady", TaskKind::Cleanup), Arc::new(ScriptedHandler::new()))
        .await
        .unwrap();

    orchestrator.start().await.unwrap();
    assert!(orchestrator.is_running().await);
    assert!(matches!(
        orchestrator.start().await,
        Err(OrchestratorError::AlreadyRunning)
    ));

    orchestrator.execute_task(steady, None).await.unwrap();
    let status = orchestrator.get_status().await;
    assert_eq!(status.task_count, 1);
    assert_eq!(status.recent_executions.len(), 1);

    orchestrator.stop().await.unwrap();
    assert!(!orchestrator.is_running().await);
    assert!(matches!(
        orchestrator.stop().await,
        Err(OrchestratorError::NotRunning)
    ));

    let report = orchestrator.generate_report(Timeframe::Day).await;
    assert!(!report.is_running);
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].attempts_in_window, 1);
    assert_eq!(report.tasks[0].failures_in_window, 0);
}
