//! The crawl pipeline: wires discovery, scheduling, extraction, dedup and
//! persistence together.
//!
//! ```text
//! scheduler.get_next_url ─► rate limit ─► fetch ─► analyze (priority)
//!        ▲                                           │
//!        │                                           ▼
//!   add_discovered ◄── discover_urls ◄── dedup ◄── extract
//!                                          │
//!                                          └─► storage (create / merge / review / skip)
//! ```

pub mod tasks;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub use tasks::{register_standard_tasks, StandardTaskIds, TaskSchedules};

use crate::dedup::{BulkOptions, DedupAction, DeduplicationEngine, MergeStrategy};
use crate::discovery::UrlDiscovery;
use crate::error::{FetchError, SchedulerError, TaskError, TaskResult};
use crate::extraction::{ContentExtractor, IssueStage};
use crate::monitoring::{
    ErrorKind, FunnelStage, HealthCheck, MonitoringService, ServiceHealth,
};
use crate::orchestrator::DataChangeCounters;
use crate::scheduler::{CrawlScheduler, QueueItem};
use crate::traits::{FetchResponse, Fetcher, Storage};
use crate::types::{ContentAnalysis, CorpusRecord, HealthStatus, RecordFilter, SessionId};

/// Share of recently failed attempts at which the scheduler reports
/// warning / critical.
const QUEUE_FAILURE_WARNING: f64 = 0.2;
const QUEUE_FAILURE_CRITICAL: f64 = 0.5;
/// Fewer recent attempts than this say nothing about queue health.
const QUEUE_HEALTH_MIN_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pages fetched per crawl cycle.
    pub pages_per_cycle: usize,
    pub strict_dedup: bool,
    pub merge_strategy: MergeStrategy,
    pub bulk: BulkOptions,
    /// Records updated within this window are re-checked by bulk dedup.
    pub bulk_window: chrono::Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pages_per_cycle: 20,
            strict_dedup: false,
            merge_strategy: MergeStrategy::default(),
            bulk: BulkOptions::default().with_auto_resolve(true),
            bulk_window: chrono::Duration::days(1),
        }
    }
}

impl PipelineConfig {
    pub fn with_pages_per_cycle(mut self, pages: usize) -> Self {
        self.pages_per_cycle = pages.max(1);
        self
    }

    pub fn with_strict_dedup(mut self, strict: bool) -> Self {
        self.strict_dedup = strict;
        self
    }
}

/// What happened to one claimed URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub analysis: Option<ContentAnalysis>,
    pub entities: usize,
    pub duplicates_skipped: usize,
    pub queued_for_review: usize,
    pub changes: DataChangeCounters,
    pub error: Option<String>,
}

impl PageReport {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            status_code: None,
            analysis: None,
            entities: 0,
            duplicates_skipped: 0,
            queued_for_review: 0,
            changes: DataChangeCounters::default(),
            error: None,
        }
    }
}

fn error_kind(error: &FetchError) -> ErrorKind {
    match error {
        FetchError::Timeout { .. } => ErrorKind::Timeout,
        FetchError::Status { status: 429, .. } => ErrorKind::RateLimit,
        FetchError::InvalidUrl { .. } => ErrorKind::Parse,
        _ => ErrorKind::Network,
    }
}

fn issue_kind(stage: IssueStage) -> ErrorKind {
    match stage {
        IssueStage::Format => ErrorKind::Parse,
        IssueStage::Rules => ErrorKind::Extraction,
        IssueStage::Validation => ErrorKind::Validation,
    }
}

fn is_markup(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.contains("html") || ct.is_empty()
}

pub struct CrawlEngine {
    config: PipelineConfig,
    scheduler: Arc<CrawlScheduler>,
    discovery: UrlDiscovery,
    extractor: ContentExtractor,
    dedup: Arc<DeduplicationEngine>,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    monitoring: Arc<MonitoringService>,
}

impl CrawlEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        scheduler: Arc<CrawlScheduler>,
        discovery: UrlDiscovery,
        extractor: ContentExtractor,
        dedup: Arc<DeduplicationEngine>,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn Fetcher>,
        monitoring: Arc<MonitoringService>,
    ) -> Self {
        Self {
            config,
            scheduler,
            discovery,
            extractor,
            dedup,
            storage,
            fetcher,
            monitoring,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<CrawlScheduler> {
        &self.scheduler
    }

    pub fn dedup(&self) -> &Arc<DeduplicationEngine> {
        &self.dedup
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn monitoring(&self) -> &Arc<MonitoringService> {
        &self.monitoring
    }

    /// Queue seed URLs at depth 0. Returns how many were queued.
    pub async fn seed(&self, urls: &[String]) -> usize {
        let mut queued = 0;
        for url in urls {
            match self.scheduler.add_url_to_queue(url, None, None, 0).await {
                Ok(outcome) if outcome.is_queued() => queued += 1,
                Ok(outcome) => debug!(url = %url, outcome = ?outcome, "Seed not queued"),
                Err(e) => warn!(url = %url, error = %e, "Invalid seed URL"),
            }
        }
        info!(seeds = urls.len(), queued, "Seeded crawl queue");
        queued
    }

    /// Process up to `max_pages` due URLs in one monitored session.
    pub async fn crawl_cycle(
        &self,
        max_pages: usize,
        cancel: &CancellationToken,
    ) -> TaskResult<DataChangeCounters> {
        let session = self.monitoring.start_session("crawl-cycle").await;
        let mut changes = DataChangeCounters::default();
        let mut pages = 0;

        let result = async {
            while pages < max_pages {
                if cancel.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }
                match self.process_next(session, cancel).await? {
                    Some(report) => {
                        pages += 1;
                        changes += report.changes;
                    }
                    None => break,
                }
            }
            Ok(())
        }
        .await;

        self.monitoring.end_session(session).await;
        result?;
        if pages > 0 {
            info!(
                pages,
                records_created = changes.records_created,
                duplicates_merged = changes.duplicates_merged,
                urls_queued = changes.urls_queued,
                "Crawl cycle finished"
            );
        }
        Ok(changes)
    }

    /// Claim the next due URL and run it through the pipeline.
    ///
    /// Returns `None` when nothing is due.
    pub async fn process_next(
        &self,
        session: SessionId,
        cancel: &CancellationToken,
    ) -> TaskResult<Option<PageReport>> {
        let Some(item) = self.scheduler.get_next_url(Utc::now()).await else {
            return Ok(None);
        };
        let mut report = PageReport::new(&item.url);

        tokio::select! {
            _ = cancel.cancelled() => {
                self.scheduler.defer(&item.url, Utc::now()).await?;
                return Err(TaskError::Cancelled);
            }
            _ = self.scheduler.wait_for_rate_limit(&item.domain) => {}
        }

        let url = Url::parse(&item.url).map_err(|source| SchedulerError::InvalidUrl {
            url: item.url.clone(),
            source,
        })?;
        let timing = self.monitoring.start_timing("fetch");
        let fetched = self.fetcher.fetch(&url, cancel).await;
        let response_ms = timing.elapsed_ms();
        self.monitoring.end_timing(timing, fetched.is_ok()).await;

        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                self.scheduler.record_fetch(&item.domain, false, response_ms).await;
                self.monitoring.record_request(session, 0, false).await;
                if matches!(e, FetchError::Cancelled { .. }) {
                    self.scheduler.defer(&item.url, Utc::now()).await?;
                    return Err(TaskError::Cancelled);
                }
                let kind = error_kind(&e);
                self.monitoring
                    .record_error(kind, "fetch", Some(&item.url), e.to_string())
                    .await;
                self.monitoring.record_session_error(session, kind).await;
                self.scheduler.mark_completed(&item.url, false).await?;
                if let FetchError::Status { status, .. } = e {
                    report.status_code = Some(status);
                }
                report.error = Some(e.to_string());
                return Ok(Some(report));
            }
        };

        self.scheduler
            .record_fetch(&item.domain, true, response.response_ms.max(response_ms))
            .await;
        self.monitoring
            .record_request(session, response.byte_len(), true)
            .await;
        self.monitoring.record_funnel(session, FunnelStage::Fetched, 1).await;
        report.status_code = Some(response.status_code);
        report.changes.pages_fetched = 1;

        match self.process_response(&item, &response, session, &mut report).await {
            Ok(()) => {
                self.scheduler.mark_completed(&item.url, true).await?;
                report.success = true;
                Ok(Some(report))
            }
            Err(e) => {
                self.monitoring
                    .record_error(ErrorKind::Storage, "pipeline", Some(&item.url), e.to_string())
                    .await;
                self.scheduler.mark_completed(&item.url, false).await?;
                Err(e)
            }
        }
    }

    async fn process_response(
        &self,
        item: &QueueItem,
        response: &FetchResponse,
        session: SessionId,
        report: &mut PageReport,
    ) -> TaskResult<()> {
        let analysis = self
            .scheduler
            .analyze_and_update_priority(&item.url, &response.content, &response.content_type)
            .await?;
        report.analysis = Some(analysis);

        let extraction = self
            .extractor
            .extract(&item.url, &response.content, &response.content_type);
        for issue in &extraction.issues {
            debug!(url = %item.url, stage = ?issue.stage, message = %issue.message, "Extraction issue");
            let kind = issue_kind(issue.stage);
            self.monitoring
                .record_error(kind, "extraction", Some(&item.url), issue.message.clone())
                .await;
            self.monitoring.record_session_error(session, kind).await;
        }
        report.entities = extraction.entities.len();
        self.monitoring
            .record_funnel(session, FunnelStage::Extracted, extraction.entities.len() as u64)
            .await;

        for entity in &extraction.entities {
            let record = CorpusRecord::from_entity(entity);
            self.persist(record, session, report).await?;
        }

        if is_markup(&response.content_type) {
            match self
                .discovery
                .discover_urls(&response.content, &item.url, item.depth)
            {
                Ok(discovered) => {
                    let queued = self.scheduler.add_discovered(&discovered).await;
                    report.changes.urls_discovered = discovered.urls.len() as u64;
                    report.changes.urls_queued = queued as u64;
                    self.monitoring
                        .record_funnel(session, FunnelStage::Discovered, discovered.stats.candidates as u64)
                        .await;
                    self.monitoring
                        .record_funnel(
                            session,
                            FunnelStage::Filtered,
                            discovered.stats.candidates.saturating_sub(discovered.urls.len()) as u64,
                        )
                        .await;
                    self.monitoring
                        .record_funnel(session, FunnelStage::Queued, queued as u64)
                        .await;
                }
                Err(e) => {
                    warn!(url = %item.url, error = %e, "URL discovery failed");
                    self.monitoring
                        .record_error(ErrorKind::Parse, "discovery", Some(&item.url), e.to_string())
                        .await;
                    self.monitoring
                        .record_session_error(session, ErrorKind::Parse)
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Deduplicate a record against the corpus, then store it accordingly.
    async fn persist(
        &self,
        record: CorpusRecord,
        session: SessionId,
        report: &mut PageReport,
    ) -> TaskResult<()> {
        let detection = self
            .dedup
            .detect_duplicates(&record, self.config.strict_dedup)
            .await?;
        let action = detection.recommended_action();

        match (action, detection.primary_id) {
            (DedupAction::MarkDuplicate, Some(primary)) => {
                debug!(title = %record.title, primary = %primary, "Skipping exact duplicate");
                report.duplicates_skipped += 1;
                self.monitoring.record_duplicate_skipped(session).await;
                return Ok(());
            }
            (DedupAction::Merge, Some(primary)) => {
                let id = self.storage.upsert(record).await?;
                let strategy = detection
                    .primary_recommendation()
                    .and_then(|r| r.merge_strategy)
                    .unwrap_or(self.config.merge_strategy);
                let outcome = self.dedup.merge_duplicates(primary, &[id], strategy).await?;
                debug!(primary = %primary, merged_fields = ?outcome.merged_fields, "Merged into existing record");
                report.changes.records_updated += 1;
                report.changes.duplicates_merged += 1;
            }
            (DedupAction::NeedsReview, Some(_)) => {
                self.storage.upsert(record).await?;
                self.dedup.queue_for_review(&detection).await;
                report.queued_for_review += 1;
                report.changes.records_created += 1;
            }
            _ => {
                self.storage.upsert(record).await?;
                report.changes.records_created += 1;
            }
        }
        self.monitoring.record_funnel(session, FunnelStage::Persisted, 1).await;
        Ok(())
    }

    /// Re-check records updated within the bulk window.
    pub async fn bulk_deduplicate(&self) -> TaskResult<DataChangeCounters> {
        let now = Utc::now();
        let recent = self
            .storage
            .query(&RecordFilter::new().between(now - self.config.bulk_window, now))
            .await?;
        let ids: Vec<_> = recent.iter().map(|r| r.id).collect();
        let report = self.dedup.process_bulk(&ids, &self.config.bulk).await?;
        Ok(DataChangeCounters {
            duplicates_merged: report.auto_resolved as u64,
            records_updated: report.auto_resolved as u64,
            ..Default::default()
        })
    }

    /// Refresh storage, queue and per-target health in monitoring.
    pub async fn check_health(&self) -> Vec<HealthCheck> {
        let mut checks = Vec::new();

        let storage = Arc::clone(&self.storage);
        checks.push(
            self.monitoring
                .health_check("storage", async move {
                    storage
                        .count()
                        .await
                        .map(|n| ServiceHealth::healthy().detail("records", json!(n)))
                        .map_err(|e| e.to_string())
                })
                .await,
        );

        let stats = self.scheduler.stats(Utc::now()).await;
        let failed_share = if stats.recent_attempts < QUEUE_HEALTH_MIN_ATTEMPTS {
            0.0
        } else {
            stats.recent_failure_share()
        };
        let queue_status = if failed_share >= QUEUE_FAILURE_CRITICAL {
            HealthStatus::Critical
        } else if failed_share >= QUEUE_FAILURE_WARNING {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        checks.push(
            self.monitoring
                .set_health(
                    "scheduler",
                    ServiceHealth::with_status(queue_status)
                        .detail("total", json!(stats.total))
                        .detail("due", json!(stats.due))
                        .detail("failed", json!(stats.failed))
                        .detail("recent_attempts", json!(stats.recent_attempts))
                        .detail("recent_failures", json!(stats.recent_failures)),
                    0,
                )
                .await,
        );

        // One unreachable site degrades the system but never stops it.
        for target in self.scheduler.targets().await {
            let health = &target.health;
            let status = health.status.min(HealthStatus::Warning);
            checks.push(
                self.monitoring
                    .set_health(
                        &format!("target:{}", target.domain),
                        ServiceHealth::with_status(status)
                            .detail("error_rate", json!(health.error_rate))
                            .detail("avg_response_ms", json!(health.avg_response_ms)),
                        health.avg_response_ms as u64,
                    )
                    .await,
            );
        }
        checks
    }
}
