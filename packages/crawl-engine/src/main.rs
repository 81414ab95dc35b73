// Main entry point for the crawl engine

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawl_engine::engine::{register_standard_tasks, TaskSchedules};
use crawl_engine::{
    ContentExtractor, CrawlEngine, CrawlScheduler, DeduplicationEngine, EngineConfig, HttpFetcher,
    MemoryStorage, MonitoringService, Storage, TaskOrchestrator, UrlDiscovery,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crawl_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting crawl engine");

    // Load configuration
    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        targets = config.targets.len(),
        seeds = config.seed_urls.len(),
        max_concurrency = config.max_concurrency,
        "Configuration loaded"
    );
    if config.targets.is_empty() {
        tracing::warn!("No crawl targets configured; set CRAWL_ALLOWED_DOMAINS or CRAWL_TARGETS_FILE");
    }

    let monitoring = Arc::new(MonitoringService::new(config.monitoring_config()));
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let fetcher = HttpFetcher::new(config.fetch_timeout, &config.user_agent)
        .context("Failed to build HTTP client")?;

    let scheduler = Arc::new(CrawlScheduler::new(config.scheduler_config()));
    for target in &config.targets {
        scheduler
            .register_target(target.clone())
            .await
            .with_context(|| format!("Invalid crawl target {}", target.domain))?;
    }

    let engine = Arc::new(CrawlEngine::new(
        config.pipeline_config(),
        scheduler,
        UrlDiscovery::new(config.discovery_config()),
        ContentExtractor::default(),
        Arc::new(DeduplicationEngine::new(
            Arc::clone(&storage),
            config.dedup_config(),
        )),
        storage,
        Arc::new(fetcher),
        Arc::clone(&monitoring),
    ));
    engine.seed(&config.seed_urls).await;

    let orchestrator = Arc::new(TaskOrchestrator::new(
        config.orchestrator_config(),
        Arc::clone(&monitoring),
    ));
    let ids = register_standard_tasks(&orchestrator, Arc::clone(&engine), &TaskSchedules::default())
        .await
        .context("Failed to register tasks")?;

    // Prime the health gate so the first crawl cycle is not held back
    let health = orchestrator
        .execute_task(ids.health_check, None)
        .await
        .context("Initial health check failed to run")?;
    tracing::info!(status = health.status.as_str(), "Initial health check finished");

    orchestrator
        .start()
        .await
        .context("Failed to start orchestrator")?;
    tracing::info!("Orchestrator running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    orchestrator
        .stop()
        .await
        .context("Failed to stop orchestrator")?;

    let status = monitoring.get_system_status().await;
    tracing::info!(
        overall = ?status.overall,
        unacknowledged_alerts = status.unacknowledged_total(),
        errors_last_hour = status.errors_last_hour,
        "Crawl engine stopped"
    );
    Ok(())
}
