//! Error, performance, health, alert and session ledgers.
//!
//! Every other component reports into a shared [`MonitoringService`]; the
//! orchestrator reads [`MonitoringService::get_system_status`] to decide on
//! maintenance mode.
//!
//! ```text
//! record_error ──► error ledger ──(5x / 20x)──► alerts
//! end_timing   ──► perf ring buffer ──(slow / memory)──► alerts
//! health_check ──► health registry ──(critical / down)──► alerts
//!                                   └─(recovered)──► acknowledge
//! ```

pub mod alerts;
pub mod analytics;
pub mod errors;
pub mod export;
pub mod health;
pub mod performance;
pub mod sessions;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use alerts::{Alert, AlertSeverity};
pub use analytics::{Analytics, ErrorAnalytics, ErrorSummary, SessionAnalytics, SystemStatus};
pub use errors::{ErrorExample, ErrorKind, ErrorRecord};
pub use export::{ExportFormat, MonitoringSnapshot};
pub use health::{HealthCheck, ServiceHealth};
pub use performance::{current_memory_bytes, OperationStats, PerformanceRecord, TimingHandle};
pub use sessions::{FunnelStage, SessionMetrics, UrlFunnel};

use crate::types::{AlertId, HealthStatus, SessionId, Timeframe};

/// Occurrences of one error that raise a warning alert.
pub const ERROR_WARNING_THRESHOLD: u64 = 5;
/// Occurrences of one error that raise a critical alert.
pub const ERROR_CRITICAL_THRESHOLD: u64 = 20;
/// Recent examples kept per error record.
pub const MAX_ERROR_EXAMPLES: usize = 5;
/// Capacity of the performance ring buffer.
pub const PERFORMANCE_CAPACITY: usize = 10_000;

/// Thresholds and retention for the monitoring ledgers.
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub slow_operation_ms: u64,
    pub memory_warning_bytes: u64,
    pub memory_critical_bytes: u64,
    pub performance_capacity: usize,
    pub retention: Duration,
    pub health_check_timeout: std::time::Duration,
    pub cleanup_interval: std::time::Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            slow_operation_ms: 30_000,
            memory_warning_bytes: 1024 * 1024 * 1024,
            memory_critical_bytes: 2 * 1024 * 1024 * 1024,
            performance_capacity: PERFORMANCE_CAPACITY,
            retention: Duration::days(7),
            health_check_timeout: std::time::Duration::from_secs(10),
            cleanup_interval: std::time::Duration::from_secs(3600),
        }
    }
}

impl MonitoringConfig {
    pub fn with_slow_operation_ms(mut self, ms: u64) -> Self {
        self.slow_operation_ms = ms;
        self
    }

    pub fn with_memory_thresholds(mut self, warning: u64, critical: u64) -> Self {
        self.memory_warning_bytes = warning;
        self.memory_critical_bytes = critical;
        self
    }

    pub fn with_performance_capacity(mut self, capacity: usize) -> Self {
        self.performance_capacity = capacity.max(1);
        self
    }
}

/// Entries removed by one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub errors_removed: usize,
    pub performance_removed: usize,
    pub alerts_removed: usize,
    pub sessions_removed: usize,
}

/// Shared monitoring ledgers.
pub struct MonitoringService {
    config: MonitoringConfig,
    errors: RwLock<HashMap<String, ErrorRecord>>,
    performance: RwLock<VecDeque<PerformanceRecord>>,
    health: RwLock<HashMap<String, HealthCheck>>,
    alerts: RwLock<Vec<Alert>>,
    sessions: RwLock<HashMap<SessionId, SessionMetrics>>,
    memory_probe: fn() -> u64,
}

impl Default for MonitoringService {
    fn default() -> Self {
        Self::new(MonitoringConfig::default())
    }
}

impl MonitoringService {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            errors: RwLock::new(HashMap::new()),
            performance: RwLock::new(VecDeque::new()),
            health: RwLock::new(HashMap::new()),
            alerts: RwLock::new(Vec::new()),
            sessions: RwLock::new(HashMap::new()),
            memory_probe: current_memory_bytes,
        }
    }

    /// Replace the process memory probe (tests use a fixed value).
    pub fn with_memory_probe(mut self, probe: fn() -> u64) -> Self {
        self.memory_probe = probe;
        self
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Error ledger
    // ------------------------------------------------------------------

    /// Record one error occurrence and raise threshold alerts.
    ///
    /// Returns the updated occurrence count for the error's key.
    pub async fn record_error(
        &self,
        kind: ErrorKind,
        operation: &str,
        url: Option<&str>,
        message: impl Into<String>,
    ) -> u64 {
        let message = message.into();
        let now = Utc::now();

        let count = {
            let mut errors = self.errors.write().await;
            let key = errors::error_key(kind, operation, url);
            let record = errors
                .entry(key)
                .or_insert_with(|| ErrorRecord::new(kind, operation, url, now));
            record.record(message.clone(), now, MAX_ERROR_EXAMPLES);
            record.count
        };

        debug!(kind = kind.as_str(), operation, url = ?url, count, "error recorded");

        let severity = match count {
            ERROR_CRITICAL_THRESHOLD => Some(AlertSeverity::Critical),
            ERROR_WARNING_THRESHOLD => Some(AlertSeverity::Warning),
            _ => None,
        };
        if let Some(severity) = severity {
            self.create_alert(
                severity,
                format!("errors:{}", operation),
                format!("Repeated {} errors in {}", kind.as_str(), operation),
                format!(
                    "{} occurrences{}; latest: {}",
                    count,
                    url.map(|u| format!(" for {}", u)).unwrap_or_default(),
                    message
                ),
            )
            .await;
        }

        count
    }

    pub async fn error_records(&self) -> Vec<ErrorRecord> {
        let mut records: Vec<_> = self.errors.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.count.cmp(&a.count).then(b.last_seen.cmp(&a.last_seen)));
        records
    }

    // ------------------------------------------------------------------
    // Performance
    // ------------------------------------------------------------------

    pub fn start_timing(&self, operation: impl Into<String>) -> TimingHandle {
        TimingHandle::start(operation)
    }

    /// Finish a measurement, store it and raise threshold alerts.
    pub async fn end_timing(&self, handle: TimingHandle, success: bool) -> PerformanceRecord {
        let record = PerformanceRecord {
            operation: handle.operation.clone(),
            duration_ms: handle.elapsed_ms(),
            success,
            memory_bytes: (self.memory_probe)(),
            recorded_at: Utc::now(),
        };
        self.push_performance(record.clone()).await;
        record
    }

    /// Store an externally measured record and raise threshold alerts.
    pub async fn push_performance(&self, record: PerformanceRecord) {
        {
            let mut buffer = self.performance.write().await;
            buffer.push_back(record.clone());
            while buffer.len() > self.config.performance_capacity {
                buffer.pop_front();
            }
        }

        if record.duration_ms > self.config.slow_operation_ms {
            self.create_alert(
                AlertSeverity::Warning,
                format!("performance:{}", record.operation),
                format!("Slow operation: {}", record.operation),
                format!(
                    "took {} ms (threshold {} ms)",
                    record.duration_ms, self.config.slow_operation_ms
                ),
            )
            .await;
        }

        let memory_severity = if record.memory_bytes > self.config.memory_critical_bytes {
            Some(AlertSeverity::Critical)
        } else if record.memory_bytes > self.config.memory_warning_bytes {
            Some(AlertSeverity::Warning)
        } else {
            None
        };
        if let Some(severity) = memory_severity {
            self.create_alert(
                severity,
                "performance:memory",
                "High memory usage",
                format!(
                    "{} bytes resident after {}",
                    record.memory_bytes, record.operation
                ),
            )
            .await;
        }
    }

    pub async fn performance_records(&self) -> Vec<PerformanceRecord> {
        self.performance.read().await.iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Run a health check body with a timeout and store the result.
    ///
    /// Errors and timeouts count as `Down`. A critical or down result raises
    /// an alert; a healthy result acknowledges the service's open alerts.
    pub async fn health_check<F>(&self, service: &str, check: F) -> HealthCheck
    where
        F: Future<Output = Result<ServiceHealth, String>> + Send,
    {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.health_check_timeout, check).await;
        let response_ms = started.elapsed().as_millis() as u64;

        let health = match outcome {
            Ok(Ok(health)) => health,
            Ok(Err(message)) => ServiceHealth::with_status(HealthStatus::Down).message(message),
            Err(_) => ServiceHealth::with_status(HealthStatus::Down).message(format!(
                "health check timed out after {:?}",
                self.config.health_check_timeout
            )),
        };

        self.set_health(service, health, response_ms).await
    }

    /// Store a health result computed elsewhere.
    pub async fn set_health(&self, service: &str, health: ServiceHealth, response_ms: u64) -> HealthCheck {
        let check = HealthCheck {
            service: service.to_string(),
            status: health.status,
            response_ms,
            message: health.message,
            details: health.details,
            checked_at: Utc::now(),
        };

        let previous = self
            .health
            .write()
            .await
            .insert(service.to_string(), check.clone())
            .map(|c| c.status);

        let source = format!("health:{}", service);
        if check.status.is_critical() {
            if previous.map_or(true, |p| !p.is_critical()) {
                warn!(service, status = ?check.status, "service unhealthy");
            }
            self.create_alert(
                AlertSeverity::Critical,
                source,
                format!("Service {} is {:?}", service, check.status).to_lowercase(),
                check.message.clone().unwrap_or_default(),
            )
            .await;
        } else {
            // Critical alerts for the service clear once it is back above critical
            let resolved = self.acknowledge_source(&source).await;
            if resolved > 0 {
                info!(service, resolved, "service recovered");
            }
        }

        check
    }

    pub async fn health_checks(&self) -> Vec<HealthCheck> {
        let mut checks: Vec<_> = self.health.read().await.values().cloned().collect();
        checks.sort_by(|a, b| a.service.cmp(&b.service));
        checks
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    pub async fn create_alert(
        &self,
        severity: AlertSeverity,
        source: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Alert {
        let alert = Alert::new(severity, source, title, message);
        match severity {
            AlertSeverity::Critical | AlertSeverity::Error => {
                error!(source = %alert.source, title = %alert.title, message = %alert.message, "alert raised")
            }
            AlertSeverity::Warning => {
                warn!(source = %alert.source, title = %alert.title, message = %alert.message, "alert raised")
            }
            AlertSeverity::Info => {
                info!(source = %alert.source, title = %alert.title, "alert raised")
            }
        }
        self.alerts.write().await.push(alert.clone());
        alert
    }

    /// Acknowledge one alert. Returns false for unknown ids.
    pub async fn acknowledge_alert(&self, id: AlertId) -> bool {
        let now = Utc::now();
        let mut alerts = self.alerts.write().await;
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledge(now);
                true
            }
            None => false,
        }
    }

    async fn acknowledge_source(&self, source: &str) -> usize {
        let now = Utc::now();
        let mut alerts = self.alerts.write().await;
        let mut count = 0;
        for alert in alerts.iter_mut().filter(|a| a.source == source && !a.acknowledged) {
            alert.acknowledge(now);
            count += 1;
        }
        count
    }

    pub async fn alerts(&self, include_acknowledged: bool) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| include_acknowledged || !a.acknowledged)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub async fn start_session(&self, name: impl Into<String>) -> SessionId {
        let mut session = SessionMetrics::new(name);
        session.observe_memory((self.memory_probe)());
        let id = session.id;
        info!(session_id = %id, name = %session.name, "crawl session started");
        self.sessions.write().await.insert(id, session);
        id
    }

    pub async fn record_request(&self, session: SessionId, bytes: u64, success: bool) {
        let memory = (self.memory_probe)();
        if let Some(metrics) = self.sessions.write().await.get_mut(&session) {
            metrics.requests += 1;
            if success {
                metrics.successes += 1;
                metrics.bytes_processed += bytes;
            } else {
                metrics.failures += 1;
            }
            metrics.observe_memory(memory);
        }
    }

    pub async fn record_duplicate_skipped(&self, session: SessionId) {
        if let Some(metrics) = self.sessions.write().await.get_mut(&session) {
            metrics.duplicates_skipped += 1;
        }
    }

    pub async fn record_funnel(&self, session: SessionId, stage: FunnelStage, count: u64) {
        if let Some(metrics) = self.sessions.write().await.get_mut(&session) {
            metrics.funnel.add(stage, count);
        }
    }

    pub async fn record_session_error(&self, session: SessionId, kind: ErrorKind) {
        if let Some(metrics) = self.sessions.write().await.get_mut(&session) {
            *metrics.error_breakdown.entry(kind).or_insert(0) += 1;
        }
    }

    pub async fn end_session(&self, session: SessionId) -> Option<SessionMetrics> {
        let mut sessions = self.sessions.write().await;
        let metrics = sessions.get_mut(&session)?;
        if metrics.ended_at.is_none() {
            metrics.ended_at = Some(Utc::now());
            info!(
                session_id = %session,
                requests = metrics.requests,
                error_rate = metrics.error_rate(),
                "crawl session ended"
            );
        }
        Some(metrics.clone())
    }

    pub async fn session(&self, session: SessionId) -> Option<SessionMetrics> {
        self.sessions.read().await.get(&session).cloned()
    }

    // ------------------------------------------------------------------
    // Status, analytics, export
    // ------------------------------------------------------------------

    /// Worst of any unacknowledged alert severity and any service state.
    pub async fn get_system_status(&self) -> SystemStatus {
        let now = Utc::now();
        let services = self.health_checks().await;

        let mut unacknowledged_alerts = BTreeMap::new();
        let mut overall = HealthStatus::Healthy;
        for alert in self.alerts.read().await.iter().filter(|a| !a.acknowledged) {
            *unacknowledged_alerts.entry(alert.severity).or_insert(0) += 1;
            overall = overall.max(alert.severity.health_impact());
        }
        for check in &services {
            overall = overall.max(check.status);
        }

        let hour_ago = now - Duration::hours(1);
        let errors_last_hour = self
            .errors
            .read()
            .await
            .values()
            .flat_map(|r| r.examples.iter())
            .filter(|e| e.occurred_at >= hour_ago)
            .count() as u64;

        let active_sessions = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active())
            .count();

        SystemStatus {
            overall,
            services,
            unacknowledged_alerts,
            errors_last_hour,
            active_sessions,
            checked_at: now,
        }
    }

    pub async fn get_analytics(&self, timeframe: Timeframe) -> Analytics {
        let now = Utc::now();
        let since = timeframe.since(now);

        let errors = {
            let ledger = self.errors.read().await;
            let mut analytics = ErrorAnalytics::default();
            let mut recent: Vec<&ErrorRecord> =
                ledger.values().filter(|r| r.last_seen >= since).collect();
            for record in &recent {
                analytics.total_occurrences += record.count;
                *analytics.by_kind.entry(record.kind).or_insert(0) += record.count;
            }
            analytics.distinct = recent.len();
            recent.sort_by(|a, b| b.count.cmp(&a.count));
            analytics.top = recent
                .into_iter()
                .take(5)
                .map(|r| ErrorSummary {
                    kind: r.kind,
                    operation: r.operation.clone(),
                    url: r.url.clone(),
                    count: r.count,
                    last_seen: r.last_seen,
                })
                .collect();
            analytics
        };

        let performance = {
            let buffer = self.performance.read().await;
            let mut by_operation: BTreeMap<&str, Vec<&PerformanceRecord>> = BTreeMap::new();
            for record in buffer.iter().filter(|r| r.recorded_at >= since) {
                by_operation.entry(&record.operation).or_default().push(record);
            }
            by_operation
                .into_iter()
                .map(|(op, records)| OperationStats::from_records(op, records))
                .collect()
        };

        let mut alerts = BTreeMap::new();
        for alert in self.alerts.read().await.iter().filter(|a| a.created_at >= since) {
            *alerts.entry(alert.severity).or_insert(0) += 1;
        }

        let sessions = {
            let ledger = self.sessions.read().await;
            let mut analytics = SessionAnalytics::default();
            for session in ledger.values().filter(|s| s.started_at >= since) {
                analytics.sessions += 1;
                analytics.requests += session.requests;
                analytics.failures += session.failures;
                analytics.duplicates_skipped += session.duplicates_skipped;
                analytics.bytes_processed += session.bytes_processed;
            }
            if analytics.requests > 0 {
                analytics.error_rate = analytics.failures as f64 / analytics.requests as f64;
            }
            analytics
        };

        Analytics {
            timeframe,
            since,
            generated_at: now,
            errors,
            performance,
            alerts,
            sessions,
        }
    }

    pub async fn snapshot(&self) -> MonitoringSnapshot {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.started_at);
        MonitoringSnapshot {
            errors: self.error_records().await,
            performance: self.performance_records().await,
            alerts: self.alerts(true).await,
            health: self.health_checks().await,
            sessions,
        }
    }

    pub async fn export_data(&self, format: ExportFormat) -> Result<String, serde_json::Error> {
        let snapshot = self.snapshot().await;
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&snapshot),
            ExportFormat::Csv => Ok(snapshot.to_csv()),
        }
    }

    // ------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------

    /// Purge ledger entries older than the retention window.
    ///
    /// Unacknowledged alerts and active sessions are always kept.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> CleanupStats {
        let cutoff = now - self.config.retention;
        let mut stats = CleanupStats::default();

        {
            let mut errors = self.errors.write().await;
            let before = errors.len();
            errors.retain(|_, r| r.last_seen >= cutoff);
            stats.errors_removed = before - errors.len();
        }
        {
            let mut buffer = self.performance.write().await;
            let before = buffer.len();
            buffer.retain(|r| r.recorded_at >= cutoff);
            stats.performance_removed = before - buffer.len();
        }
        {
            let mut alerts = self.alerts.write().await;
            let before = alerts.len();
            alerts.retain(|a| !a.acknowledged || a.created_at >= cutoff);
            stats.alerts_removed = before - alerts.len();
        }
        {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, s| s.ended_at.map_or(true, |ended| ended >= cutoff));
            stats.sessions_removed = before - sessions.len();
        }

        debug!(?stats, "monitoring cleanup complete");
        stats
    }

    /// Run [`cleanup`](Self::cleanup) on the configured interval until cancelled.
    pub async fn run_cleanup_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.cleanup_interval);
        interval.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.cleanup(Utc::now()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> MonitoringService {
        MonitoringService::default().with_memory_probe(|| 1024)
    }

    #[tokio::test]
    async fn repeated_errors_escalate_alerts() {
        let monitoring = service();
        for _ in 0..4 {
            monitoring
                .record_error(ErrorKind::Network, "fetch", Some("https://a.test/"), "reset")
                .await;
        }
        assert!(monitoring.alerts(false).await.is_empty());

        monitoring
            .record_error(ErrorKind::Network, "fetch", Some("https://a.test/"), "reset")
            .await;
        let alerts = monitoring.alerts(false).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);

        for _ in 0..15 {
            monitoring
                .record_error(ErrorKind::Network, "fetch", Some("https://a.test/"), "reset")
                .await;
        }
        let alerts = monitoring.alerts(false).await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].severity, AlertSeverity::Critical);

        let status = monitoring.get_system_status().await;
        assert_eq!(status.overall, HealthStatus::Critical);
    }

    #[tokio::test]
    async fn distinct_urls_are_tracked_separately() {
        let monitoring = service();
        monitoring
            .record_error(ErrorKind::Parse, "extract", Some("https://a.test/1"), "bad")
            .await;
        let count = monitoring
            .record_error(ErrorKind::Parse, "extract", Some("https://a.test/2"), "bad")
            .await;
        assert_eq!(count, 1);
        assert_eq!(monitoring.error_records().await.len(), 2);
    }

    #[tokio::test]
    async fn performance_buffer_is_bounded() {
        let monitoring = MonitoringService::new(MonitoringConfig::default().with_performance_capacity(3))
            .with_memory_probe(|| 0);
        for _ in 0..5 {
            let handle = monitoring.start_timing("extract");
            monitoring.end_timing(handle, true).await;
        }
        assert_eq!(monitoring.performance_records().await.len(), 3);
    }

    #[tokio::test]
    async fn slow_operations_raise_alerts() {
        let monitoring = MonitoringService::new(MonitoringConfig::default().with_slow_operation_ms(10));
        monitoring
            .push_performance(PerformanceRecord {
                operation: "fetch".into(),
                duration_ms: 50,
                success: true,
                memory_bytes: 0,
                recorded_at: Utc::now(),
            })
            .await;
        let alerts = monitoring.alerts(false).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].source, "performance:fetch");
    }

    #[tokio::test]
    async fn memory_threshold_raises_alert() {
        let monitoring = MonitoringService::new(MonitoringConfig::default().with_memory_thresholds(100, 1000))
            .with_memory_probe(|| 5000);
        let handle = monitoring.start_timing("extract");
        monitoring.end_timing(handle, true).await;
        let alerts = monitoring.alerts(false).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn failing_health_check_marks_service_down() {
        let monitoring = service();
        let check = monitoring
            .health_check("storage", async { Err("connection refused".to_string()) })
            .await;
        assert_eq!(check.status, HealthStatus::Down);
        assert_eq!(monitoring.get_system_status().await.overall, HealthStatus::Down);
        assert_eq!(monitoring.alerts(false).await.len(), 1);
    }

    #[tokio::test]
    async fn recovery_acknowledges_service_alerts() {
        let monitoring = service();
        monitoring
            .health_check("storage", async {
                Ok(ServiceHealth::with_status(HealthStatus::Critical))
            })
            .await;
        assert_eq!(monitoring.get_system_status().await.overall, HealthStatus::Critical);

        monitoring
            .health_check("storage", async { Ok(ServiceHealth::healthy()) })
            .await;
        let status = monitoring.get_system_status().await;
        assert_eq!(status.overall, HealthStatus::Healthy);
        assert_eq!(status.unacknowledged_total(), 0);
    }

    #[tokio::test]
    async fn degraded_recovery_clears_critical_alerts() {
        let monitoring = service();
        monitoring
            .set_health("scheduler", ServiceHealth::with_status(HealthStatus::Critical), 0)
            .await;
        assert!(monitoring.get_system_status().await.overall.is_critical());

        monitoring
            .set_health("scheduler", ServiceHealth::with_status(HealthStatus::Warning), 0)
            .await;
        let status = monitoring.get_system_status().await;
        assert_eq!(status.overall, HealthStatus::Warning);
        assert_eq!(status.unacknowledged_total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_health_check_times_out() {
        let monitoring = service();
        let check = monitoring
            .health_check("fetcher", async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(ServiceHealth::healthy())
            })
            .await;
        assert_eq!(check.status, HealthStatus::Down);
        assert!(check.message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn acknowledged_alerts_do_not_affect_status() {
        let monitoring = service();
        let alert = monitoring
            .create_alert(AlertSeverity::Critical, "test", "boom", "")
            .await;
        assert_eq!(monitoring.get_system_status().await.overall, HealthStatus::Critical);
        assert!(monitoring.acknowledge_alert(alert.id).await);
        assert_eq!(monitoring.get_system_status().await.overall, HealthStatus::Healthy);
        assert!(!monitoring.acknowledge_alert(AlertId::new()).await);
    }

    #[tokio::test]
    async fn session_metrics_accumulate() {
        let monitoring = service();
        let session = monitoring.start_session("nightly").await;
        monitoring.record_request(session, 500, true).await;
        monitoring.record_request(session, 0, false).await;
        monitoring.record_duplicate_skipped(session).await;
        monitoring.record_funnel(session, FunnelStage::Discovered, 12).await;
        monitoring.record_session_error(session, ErrorKind::Network).await;

        let metrics = monitoring.end_session(session).await.unwrap();
        assert_eq!(metrics.requests, 2);
        assert_eq!(metrics.bytes_processed, 500);
        assert_eq!(metrics.duplicates_skipped, 1);
        assert_eq!(metrics.funnel.discovered, 12);
        assert_eq!(metrics.error_rate(), 0.5);
        assert_eq!(metrics.peak_memory_bytes, 1024);
        assert_eq!(metrics.error_breakdown.get(&ErrorKind::Network), Some(&1));
        assert!(!metrics.is_active());
    }

    #[tokio::test]
    async fn cleanup_keeps_unacknowledged_alerts() {
        let monitoring = service();
        let open = monitoring.create_alert(AlertSeverity::Warning, "a", "open", "").await;
        let closed = monitoring.create_alert(AlertSeverity::Warning, "b", "closed", "").await;
        monitoring.acknowledge_alert(closed.id).await;
        monitoring
            .record_error(ErrorKind::Task, "run", None, "failed")
            .await;

        let stats = monitoring.cleanup(Utc::now() + Duration::days(8)).await;
        assert_eq!(stats.alerts_removed, 1);
        assert_eq!(stats.errors_removed, 1);

        let remaining = monitoring.alerts(true).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, open.id);
    }

    #[tokio::test]
    async fn export_formats() {
        let monitoring = service();
        monitoring
            .record_error(ErrorKind::Parse, "extract", Some("https://a.test/x"), "bad, html")
            .await;
        let json = monitoring.export_data(ExportFormat::Json).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["errors"][0]["count"], 1);

        let csv = monitoring.export_data(ExportFormat::Csv).await.unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("record_type,timestamp,name,status,value,detail"));
        assert!(lines.next().unwrap().starts_with("error,"));
    }

    #[tokio::test]
    async fn analytics_group_by_operation() {
        let monitoring = service();
        for ok in [true, false, true] {
            let handle = monitoring.start_timing("fetch");
            monitoring.end_timing(handle, ok).await;
        }
        monitoring
            .record_error(ErrorKind::Network, "fetch", None, "x")
            .await;
        let analytics = monitoring.get_analytics(Timeframe::Hour).await;
        assert_eq!(analytics.performance.len(), 1);
        assert_eq!(analytics.performance[0].count, 3);
        assert_eq!(analytics.errors.total_occurrences, 1);
        assert_eq!(analytics.errors.by_kind.get(&ErrorKind::Network), Some(&1));
    }
}
