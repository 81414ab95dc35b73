use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::dedup::DedupConfig;
use crate::discovery::DiscoveryConfig;
use crate::engine::PipelineConfig;
use crate::error::ConfigError;
use crate::fetch::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::monitoring::MonitoringConfig;
use crate::orchestrator::{OrchestratorConfig, MAX_CONCURRENT_TASKS};
use crate::scheduler::{CrawlTarget, SchedulerConfig, DEFAULT_REQUESTS_PER_MINUTE};

/// Base priority of targets derived from `CRAWL_ALLOWED_DOMAINS`.
const DEFAULT_TARGET_PRIORITY: f64 = 5.0;

/// Engine configuration loaded from `CRAWL_*` environment variables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub allowed_domains: Vec<String>,
    pub external_domains: Vec<String>,
    pub seed_urls: Vec<String>,
    pub targets: Vec<CrawlTarget>,
    pub max_concurrency: usize,
    pub default_rate_limit: u32,
    pub max_depth: u32,
    pub pages_per_cycle: usize,
    pub strict_dedup: bool,
    pub auto_resolve_threshold: f64,
    pub slow_operation_ms: u64,
    pub fetch_timeout: Duration,
    pub user_agent: String,
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let allowed_domains = list(lookup("CRAWL_ALLOWED_DOMAINS"));
        let targets = match lookup("CRAWL_TARGETS_FILE") {
            Some(path) => load_targets(&path)?,
            None => allowed_domains
                .iter()
                .map(|d| CrawlTarget::new(d.as_str(), DEFAULT_TARGET_PRIORITY))
                .collect(),
        };
        let seed_urls = match list(lookup("CRAWL_SEED_URLS")) {
            seeds if seeds.is_empty() => targets
                .iter()
                .map(|t| format!("https://{}/", t.domain))
                .collect(),
            seeds => seeds,
        };

        let auto_resolve_threshold: f64 =
            parse(&lookup, "CRAWL_AUTO_RESOLVE_THRESHOLD", 0.9)?;
        if !(0.0..=1.0).contains(&auto_resolve_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "CRAWL_AUTO_RESOLVE_THRESHOLD".to_string(),
                value: auto_resolve_threshold.to_string(),
            });
        }

        Ok(Self {
            allowed_domains,
            external_domains: list(lookup("CRAWL_EXTERNAL_DOMAINS")),
            seed_urls,
            targets,
            max_concurrency: parse(&lookup, "CRAWL_MAX_CONCURRENCY", MAX_CONCURRENT_TASKS)?.max(1),
            default_rate_limit: parse(&lookup, "CRAWL_RATE_LIMIT", DEFAULT_REQUESTS_PER_MINUTE)?,
            max_depth: parse(&lookup, "CRAWL_MAX_DEPTH", 5)?,
            pages_per_cycle: parse(&lookup, "CRAWL_PAGES_PER_CYCLE", 20)?,
            strict_dedup: parse(&lookup, "CRAWL_STRICT_DEDUP", false)?,
            auto_resolve_threshold,
            slow_operation_ms: parse(&lookup, "CRAWL_SLOW_OPERATION_MS", 30_000)?,
            fetch_timeout: Duration::from_secs(parse(
                &lookup,
                "CRAWL_FETCH_TIMEOUT_SECS",
                DEFAULT_TIMEOUT.as_secs(),
            )?),
            user_agent: lookup("CRAWL_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        let mut allowed = self.allowed_domains.clone();
        for target in &self.targets {
            if !allowed.contains(&target.domain) {
                allowed.push(target.domain.clone());
            }
        }
        DiscoveryConfig::default()
            .with_allowed_domains(allowed)
            .with_external_domains(self.external_domains.clone())
            .with_max_depth(self.max_depth)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default().with_default_rate_limit(self.default_rate_limit)
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig::default().with_auto_resolve_threshold(self.auto_resolve_threshold)
    }

    pub fn monitoring_config(&self) -> MonitoringConfig {
        MonitoringConfig::default().with_slow_operation_ms(self.slow_operation_ms)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default().with_max_concurrency(self.max_concurrency)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_pages_per_cycle(self.pages_per_cycle)
            .with_strict_dedup(self.strict_dedup)
    }
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Read crawl targets from a JSON array.
pub fn load_targets(path: &str) -> Result<Vec<CrawlTarget>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    parse_targets(&raw)
}

pub fn parse_targets(json: &str) -> Result<Vec<CrawlTarget>, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{CrawlFrequency, CrawlRule};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.targets.is_empty());
        assert!(config.seed_urls.is_empty());
        assert_eq!(config.max_concurrency, MAX_CONCURRENT_TASKS);
        assert_eq!(config.default_rate_limit, DEFAULT_REQUESTS_PER_MINUTE);
        assert_eq!(config.fetch_timeout, DEFAULT_TIMEOUT);
        assert!(!config.strict_dedup);
    }

    #[test]
    fn domains_become_targets_and_seeds() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CRAWL_ALLOWED_DOMAINS", "council.gov.uk, www.county.gov.uk"),
            ("CRAWL_EXTERNAL_DOMAINS", "legislation.gov.uk"),
            ("CRAWL_MAX_CONCURRENCY", "3"),
            ("CRAWL_STRICT_DEDUP", "true"),
        ]))
        .unwrap();
        let domains: Vec<_> = config.targets.iter().map(|t| t.domain.as_str()).collect();
        assert_eq!(domains, vec!["council.gov.uk", "county.gov.uk"]);
        assert_eq!(
            config.seed_urls,
            vec!["https://council.gov.uk/", "https://county.gov.uk/"]
        );
        assert_eq!(config.external_domains, vec!["legislation.gov.uk"]);
        assert_eq!(config.orchestrator_config().max_concurrency, 3);
        assert!(config.pipeline_config().strict_dedup);
    }

    #[test]
    fn explicit_seeds_win() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CRAWL_ALLOWED_DOMAINS", "council.gov.uk"),
            ("CRAWL_SEED_URLS", "https://council.gov.uk/planning"),
        ]))
        .unwrap();
        assert_eq!(config.seed_urls, vec!["https://council.gov.uk/planning"]);
    }

    #[test]
    fn rejects_malformed_numbers() {
        let err = EngineConfig::from_lookup(lookup(&[("CRAWL_RATE_LIMIT", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CRAWL_RATE_LIMIT"));

        let err = EngineConfig::from_lookup(lookup(&[("CRAWL_AUTO_RESOLVE_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn targets_parse_from_json() {
        let targets = parse_targets(
            r#"[{
                "domain": "council.gov.uk",
                "base_priority": 8.0,
                "crawl_frequency": "hourly",
                "rules": [
                    {"type": "exclude_path", "pattern": "^/search"},
                    {"type": "rate_limit", "requests_per_minute": 10}
                ]
            }]"#,
        )
        .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].crawl_frequency, CrawlFrequency::Hourly);
        assert_eq!(targets[0].rate_limit(), Some(10));
        assert!(matches!(targets[0].rules[0], CrawlRule::ExcludePath { .. }));
    }

    #[test]
    fn missing_targets_file_is_an_io_error() {
        let err = EngineConfig::from_lookup(lookup(&[(
            "CRAWL_TARGETS_FILE",
            "/nonexistent/crawl-targets.json",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
