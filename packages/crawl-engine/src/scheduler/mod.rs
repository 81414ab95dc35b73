//! Crawl scheduler: per-domain targets, the adaptive priority queue and
//! re-crawl intervals.
//!
//! Queue items move through:
//!
//! ```text
//! pending ─► processing ─► analyzing ─► completed ─(due)─► pending
//!    ▲            │
//!    └─(retry)────┴─► failed (3 attempts)     deferred ─(due)─► pending
//! ```

pub mod priority;
pub mod queue;
pub mod rate_limit;
pub mod target;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, RwLock};
use url::Url;

pub use priority::{dynamic_priority, failure_interval, MAX_PRIORITY, MIN_PRIORITY};
pub use queue::{QueueItem, QueueStats, QueueStatus, Scheduling, MAX_ATTEMPTS};
pub use rate_limit::{DomainRateLimiter, DEFAULT_REQUESTS_PER_MINUTE};
pub use target::{CrawlFrequency, CrawlRule, CrawlTarget, TargetHealth};

use crate::discovery::DiscoveryResult;
use crate::error::{SchedulerError, SchedulerResult};
use crate::extraction::analyze_content;
use crate::types::{ContentAnalysis, HealthStatus, UrlCategory};
use target::CompiledRules;

/// Finished attempts older than this no longer count towards queue health.
pub const OUTCOME_WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Applied to targets without a rate-limit rule.
    pub default_requests_per_minute: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }
}

impl SchedulerConfig {
    pub fn with_default_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.default_requests_per_minute = requests_per_minute;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Queued { priority: f64 },
    Duplicate,
    Excluded { reason: String },
}

impl EnqueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued { .. })
    }
}

struct TargetEntry {
    target: CrawlTarget,
    rules: CompiledRules,
}

fn parse_url(url: &str) -> SchedulerResult<Url> {
    let mut parsed = Url::parse(url).map_err(|source| SchedulerError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    parsed.set_fragment(None);
    Ok(parsed)
}

/// Queue identity: the fragment is dropped and `www.` folds into the bare host.
fn queue_key(parsed: &Url) -> String {
    match parsed.host_str().and_then(|h| h.strip_prefix("www.")) {
        Some(bare) => {
            let mut key = parsed.clone();
            match key.set_host(Some(bare)) {
                Ok(()) => key.to_string(),
                Err(_) => parsed.to_string(),
            }
        }
        None => parsed.to_string(),
    }
}

fn key_for(url: &str) -> SchedulerResult<String> {
    Ok(queue_key(&parse_url(url)?))
}

fn normalize_host(host: &str) -> String {
    host.trim_start_matches("www.").to_lowercase()
}

/// Target domain for `host`: exact match, else the nearest parent domain.
fn resolve_domain(targets: &HashMap<String, TargetEntry>, host: &str) -> Option<String> {
    let mut candidate = normalize_host(host);
    loop {
        if targets.contains_key(&candidate) {
            return Some(candidate);
        }
        let (_, parent) = candidate.split_once('.')?;
        if !parent.contains('.') {
            return None;
        }
        candidate = parent.to_string();
    }
}

/// Decides what to fetch next.
pub struct CrawlScheduler {
    config: SchedulerConfig,
    targets: RwLock<HashMap<String, TargetEntry>>,
    queue: Mutex<HashMap<String, QueueItem>>,
    /// (finished_at, success) per attempt, oldest first.
    outcomes: Mutex<VecDeque<(DateTime<Utc>, bool)>>,
    rate_limiter: DomainRateLimiter,
}

impl Default for CrawlScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl CrawlScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let rate_limiter = DomainRateLimiter::new(config.default_requests_per_minute);
        Self {
            config,
            targets: RwLock::new(HashMap::new()),
            queue: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(VecDeque::new()),
            rate_limiter,
        }
    }

    /// Register or replace the target for its domain.
    pub async fn register_target(&self, target: CrawlTarget) -> SchedulerResult<()> {
        let rules = CompiledRules::compile(&target.rules)?;
        let requests_per_minute = target
            .rate_limit()
            .unwrap_or(self.config.default_requests_per_minute);
        self.rate_limiter
            .configure(&target.domain, requests_per_minute)
            .await;

        tracing::info!(
            domain = %target.domain,
            base_priority = target.base_priority,
            frequency = ?target.crawl_frequency,
            rules = target.rules.len(),
            requests_per_minute,
            "Registered crawl target"
        );
        self.targets
            .write()
            .await
            .insert(target.domain.clone(), TargetEntry { target, rules });
        Ok(())
    }

    pub async fn targets(&self) -> Vec<CrawlTarget> {
        self.targets
            .read()
            .await
            .values()
            .map(|e| e.target.clone())
            .collect()
    }

    /// Domain of the target responsible for `url`.
    pub async fn domain_for(&self, url: &str) -> SchedulerResult<String> {
        let parsed = parse_url(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SchedulerError::NoHost(url.to_string()))?;
        resolve_domain(&*self.targets.read().await, host)
            .ok_or_else(|| SchedulerError::UnknownDomain(host.to_string()))
    }

    /// Queue `url` unless it is already queued or excluded by its target's rules.
    pub async fn add_url_to_queue(
        &self,
        url: &str,
        category: Option<UrlCategory>,
        parent_url: Option<&str>,
        depth: u32,
    ) -> SchedulerResult<EnqueueOutcome> {
        let parsed = parse_url(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SchedulerError::NoHost(url.to_string()))?;
        let key = queue_key(&parsed);

        let targets = self.targets.read().await;
        let domain = resolve_domain(&targets, host)
            .ok_or_else(|| SchedulerError::UnknownDomain(host.to_string()))?;
        let Some(entry) = targets.get(&domain) else {
            return Err(SchedulerError::UnknownDomain(domain));
        };

        let path = parsed.path();
        if let Some(reason) = entry.rules.rejection(path) {
            tracing::debug!(url = %key, reason = %reason, "URL excluded by target rules");
            return Ok(EnqueueOutcome::Excluded { reason });
        }

        let mut queue = self.queue.lock().await;
        if queue.contains_key(&key) {
            return Ok(EnqueueOutcome::Duplicate);
        }

        let category = category.unwrap_or_else(|| UrlCategory::from_path(path));
        let static_priority = priority::clip_priority(
            entry.target.base_priority + category.priority() + entry.rules.boost(path),
        );
        let interval_secs = entry.target.crawl_frequency.interval_secs();
        let now = Utc::now();
        queue.insert(
            key.clone(),
            QueueItem {
                url: parsed.to_string(),
                domain,
                discovered_at: now,
                attempts: 0,
                static_priority,
                dynamic_priority: static_priority,
                category,
                parent_url: parent_url.map(str::to_string),
                depth,
                scheduling: Scheduling {
                    next_scheduled: now,
                    interval_secs,
                    base_interval_secs: interval_secs,
                    adaptive: true,
                },
                status: QueueStatus::Pending,
                last_crawled: None,
                last_content_hash: None,
                last_analysis: None,
                selector: entry.rules.selector(path).map(str::to_string),
                skip_reason: None,
            },
        );
        tracing::debug!(url = %key, priority = static_priority, depth, "Queued URL");
        Ok(EnqueueOutcome::Queued {
            priority: static_priority,
        })
    }

    /// Queue every URL a discovery pass kept. Returns how many were queued.
    pub async fn add_discovered(&self, result: &DiscoveryResult) -> usize {
        let mut queued = 0;
        for discovered in &result.urls {
            match self
                .add_url_to_queue(
                    &discovered.url,
                    Some(discovered.category),
                    Some(&result.base_url),
                    discovered.depth,
                )
                .await
            {
                Ok(outcome) if outcome.is_queued() => queued += 1,
                Ok(_) => {}
                Err(e) => tracing::debug!(url = %discovered.url, error = %e, "Discovered URL not queued"),
            }
        }
        queued
    }

    /// Claim the most urgent due item, marking it as processing.
    ///
    /// Due completed and deferred items are first returned to pending. Items
    /// of targets that are down are passed over.
    pub async fn get_next_url(&self, now: DateTime<Utc>) -> Option<QueueItem> {
        let targets = self.targets.read().await;
        let mut queue = self.queue.lock().await;

        for item in queue.values_mut().filter(|i| i.should_promote(now)) {
            item.status = QueueStatus::Pending;
        }

        let next = queue
            .values_mut()
            .filter(|i| i.is_due(now))
            .filter(|i| {
                targets
                    .get(&i.domain)
                    .map_or(true, |t| t.target.health.status != HealthStatus::Down)
            })
            .max_by(|a, b| {
                a.dynamic_priority
                    .total_cmp(&b.dynamic_priority)
                    .then_with(|| b.scheduling.next_scheduled.cmp(&a.scheduling.next_scheduled))
            })?;
        next.status = QueueStatus::Processing;
        Some(next.clone())
    }

    /// Analyze fetched content and recompute the item's priority and interval.
    pub async fn analyze_and_update_priority(
        &self,
        url: &str,
        content: &str,
        content_type: &str,
    ) -> SchedulerResult<ContentAnalysis> {
        let key = key_for(url)?;
        let analysis = analyze_content(&key, content, content_type);

        let mut queue = self.queue.lock().await;
        let item = queue
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::NotQueued(key.clone()))?;
        item.status = QueueStatus::Analyzing;

        let changed = item
            .last_content_hash
            .as_ref()
            .map(|previous| previous != &analysis.content_hash);
        item.dynamic_priority = dynamic_priority(item.static_priority, &analysis);
        if item.scheduling.adaptive {
            item.scheduling.base_interval_secs =
                priority::adapt_interval(item.scheduling.base_interval_secs, changed, &analysis);
            item.scheduling.interval_secs = item.scheduling.base_interval_secs;
        }
        item.last_content_hash = Some(analysis.content_hash.clone());
        item.last_analysis = Some(analysis.clone());

        tracing::debug!(
            url = %key,
            content_type = analysis.content_type.as_str(),
            priority = item.dynamic_priority,
            changed = ?changed,
            interval_secs = item.scheduling.interval_secs,
            "Updated priority from content analysis"
        );
        Ok(analysis)
    }

    pub async fn mark_completed(&self, url: &str, success: bool) -> SchedulerResult<QueueItem> {
        self.mark_completed_at(url, success, Utc::now()).await
    }

    /// Schedule the next crawl after an attempt finished at `now`.
    pub async fn mark_completed_at(
        &self,
        url: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> SchedulerResult<QueueItem> {
        let key = key_for(url)?;
        let mut queue = self.queue.lock().await;
        let item = queue
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::NotQueued(key.clone()))?;

        item.last_crawled = Some(now);
        if success {
            item.attempts = 0;
            item.status = QueueStatus::Completed;
            item.scheduling.interval_secs = item.scheduling.base_interval_secs;
        } else {
            item.attempts += 1;
            item.scheduling.interval_secs = failure_interval(item.attempts);
            item.status = if item.attempts >= MAX_ATTEMPTS {
                QueueStatus::Failed
            } else {
                QueueStatus::Pending
            };
        }
        item.scheduling.next_scheduled = now + Duration::seconds(item.scheduling.interval_secs);

        if item.status == QueueStatus::Failed {
            tracing::warn!(url = %key, attempts = item.attempts, "URL failed permanently");
        }
        let item = item.clone();
        drop(queue);

        let mut outcomes = self.outcomes.lock().await;
        outcomes.push_back((now, success));
        let horizon = now - Duration::minutes(OUTCOME_WINDOW_MINUTES);
        while outcomes.front().is_some_and(|(at, _)| *at < horizon) {
            outcomes.pop_front();
        }
        Ok(item)
    }

    /// Hold an item back until `until`.
    pub async fn defer(&self, url: &str, until: DateTime<Utc>) -> SchedulerResult<()> {
        let key = key_for(url)?;
        let mut queue = self.queue.lock().await;
        let item = queue
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::NotQueued(key.clone()))?;
        item.status = QueueStatus::Deferred;
        item.scheduling.next_scheduled = until;
        Ok(())
    }

    /// Park an item permanently.
    pub async fn skip(&self, url: &str, reason: impl Into<String>) -> SchedulerResult<()> {
        let key = key_for(url)?;
        let mut queue = self.queue.lock().await;
        let item = queue
            .get_mut(&key)
            .ok_or_else(|| SchedulerError::NotQueued(key.clone()))?;
        item.status = QueueStatus::Skipped;
        item.skip_reason = Some(reason.into());
        Ok(())
    }

    pub async fn get_item(&self, url: &str) -> Option<QueueItem> {
        let key = key_for(url).ok()?;
        self.queue.lock().await.get(&key).cloned()
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> QueueStats {
        let mut stats = QueueStats::from_items(self.queue.lock().await.values(), now);
        let horizon = now - Duration::minutes(OUTCOME_WINDOW_MINUTES);
        for (_, success) in self
            .outcomes
            .lock()
            .await
            .iter()
            .filter(|(at, _)| *at >= horizon)
        {
            stats.recent_attempts += 1;
            if !success {
                stats.recent_failures += 1;
            }
        }
        stats
    }

    /// Wait for the domain's token bucket before fetching.
    pub async fn wait_for_rate_limit(&self, domain: &str) {
        self.rate_limiter.until_ready(domain).await;
    }

    /// Feed a fetch outcome into the target's rolling health.
    pub async fn record_fetch(&self, domain: &str, success: bool, response_ms: u64) {
        if let Some(entry) = self.targets.write().await.get_mut(domain) {
            entry.target.health.record(success, response_ms, Utc::now());
        }
    }

    /// Force a target's health status, or clear the override with `None`.
    pub async fn set_target_health(
        &self,
        domain: &str,
        status: Option<HealthStatus>,
    ) -> SchedulerResult<()> {
        let mut targets = self.targets.write().await;
        let entry = targets
            .get_mut(domain)
            .ok_or_else(|| SchedulerError::UnknownDomain(domain.to_string()))?;
        entry.target.health.set_override(status);
        tracing::info!(domain, status = ?entry.target.health.status, "Target health updated");
        Ok(())
    }

    pub async fn target_health(&self, domain: &str) -> Option<TargetHealth> {
        self.targets
            .read()
            .await
            .get(domain)
            .map(|e| e.target.health.clone())
    }
}
