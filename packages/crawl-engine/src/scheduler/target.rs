//! Per-domain crawl targets, their rules and rolling health.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{SchedulerError, SchedulerResult};
use crate::types::HealthStatus;

/// Samples kept for the rolling health window.
pub const HEALTH_WINDOW: usize = 20;
pub const ERROR_RATE_CRITICAL: f64 = 0.5;
pub const ERROR_RATE_WARNING: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrawlFrequency {
    Realtime,
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl CrawlFrequency {
    pub fn interval_secs(&self) -> i64 {
        match self {
            CrawlFrequency::Realtime => 60,
            CrawlFrequency::Hourly => 3_600,
            CrawlFrequency::Daily => 86_400,
            CrawlFrequency::Weekly => 7 * 86_400,
            CrawlFrequency::Monthly => 30 * 86_400,
        }
    }
}

/// A rule attached to a crawl target. Patterns are regexes over the URL path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlRule {
    IncludePath { pattern: String },
    ExcludePath { pattern: String },
    PriorityBoost { pattern: String, boost: f64 },
    RateLimit { requests_per_minute: u32 },
    /// CSS selector for the main content of matching pages.
    Selector { pattern: String, selector: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlTarget {
    pub domain: String,
    pub base_priority: f64,
    #[serde(default)]
    pub crawl_frequency: CrawlFrequency,
    #[serde(default)]
    pub rules: Vec<CrawlRule>,
    #[serde(default)]
    pub health: TargetHealth,
}

impl CrawlTarget {
    pub fn new(domain: impl Into<String>, base_priority: f64) -> Self {
        Self {
            domain: domain.into().trim_start_matches("www.").to_lowercase(),
            base_priority,
            crawl_frequency: CrawlFrequency::default(),
            rules: Vec::new(),
            health: TargetHealth::default(),
        }
    }

    pub fn with_frequency(mut self, frequency: CrawlFrequency) -> Self {
        self.crawl_frequency = frequency;
        self
    }

    pub fn with_rule(mut self, rule: CrawlRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Requests per minute from the target's rate-limit rule, if any.
    pub fn rate_limit(&self) -> Option<u32> {
        self.rules.iter().find_map(|r| match r {
            CrawlRule::RateLimit { requests_per_minute } => Some(*requests_per_minute),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub success: bool,
    pub response_ms: u64,
    pub at: DateTime<Utc>,
}

/// Rolling health of a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetHealth {
    pub status: HealthStatus,
    pub avg_response_ms: f64,
    pub error_rate: f64,
    /// Status set from outside (monitoring) that wins over derived status.
    pub override_status: Option<HealthStatus>,
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    samples: VecDeque<HealthSample>,
}

impl TargetHealth {
    pub fn record(&mut self, success: bool, response_ms: u64, at: DateTime<Utc>) {
        self.samples.push_back(HealthSample {
            success,
            response_ms,
            at,
        });
        while self.samples.len() > HEALTH_WINDOW {
            self.samples.pop_front();
        }
        let n = self.samples.len() as f64;
        self.avg_response_ms = self.samples.iter().map(|s| s.response_ms as f64).sum::<f64>() / n;
        self.error_rate = self.samples.iter().filter(|s| !s.success).count() as f64 / n;
        self.last_checked = Some(at);
        self.refresh_status();
    }

    pub fn set_override(&mut self, status: Option<HealthStatus>) {
        self.override_status = status;
        self.refresh_status();
    }

    fn refresh_status(&mut self) {
        let derived = if self.error_rate >= ERROR_RATE_CRITICAL {
            HealthStatus::Critical
        } else if self.error_rate >= ERROR_RATE_WARNING {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        self.status = self.override_status.unwrap_or(derived);
    }

    pub fn samples(&self) -> usize {
        self.samples.len()
    }
}

/// A target's rules compiled once at registration.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRules {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    boosts: Vec<(Regex, f64)>,
    selectors: Vec<(Regex, String)>,
}

fn compile(pattern: &str) -> SchedulerResult<Regex> {
    Regex::new(pattern).map_err(|source| SchedulerError::InvalidRule {
        pattern: pattern.to_string(),
        source,
    })
}

impl CompiledRules {
    pub(crate) fn compile(rules: &[CrawlRule]) -> SchedulerResult<Self> {
        let mut compiled = Self {
            include: Vec::new(),
            exclude: Vec::new(),
            boosts: Vec::new(),
            selectors: Vec::new(),
        };
        for rule in rules {
            match rule {
                CrawlRule::IncludePath { pattern } => compiled.include.push(compile(pattern)?),
                CrawlRule::ExcludePath { pattern } => compiled.exclude.push(compile(pattern)?),
                CrawlRule::PriorityBoost { pattern, boost } => {
                    compiled.boosts.push((compile(pattern)?, *boost))
                }
                CrawlRule::Selector { pattern, selector } => {
                    compiled.selectors.push((compile(pattern)?, selector.clone()))
                }
                CrawlRule::RateLimit { .. } => {}
            }
        }
        Ok(compiled)
    }

    /// Reason the path is not crawlable, if any.
    pub(crate) fn rejection(&self, path: &str) -> Option<String> {
        if let Some(rule) = self.exclude.iter().find(|r| r.is_match(path)) {
            return Some(format!("excluded by {}", rule.as_str()));
        }
        if !self.include.is_empty() && !self.include.iter().any(|r| r.is_match(path)) {
            return Some("no include rule matches".to_string());
        }
        None
    }

    pub(crate) fn boost(&self, path: &str) -> f64 {
        self.boosts
            .iter()
            .filter(|(r, _)| r.is_match(path))
            .map(|(_, b)| b)
            .sum()
    }

    pub(crate) fn selector(&self, path: &str) -> Option<&str> {
        self.selectors
            .iter()
            .find(|(r, _)| r.is_match(path))
            .map(|(_, s)| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_follows_error_rate() {
        let mut health = TargetHealth::default();
        let now = Utc::now();
        for _ in 0..8 {
            health.record(true, 100, now);
        }
        assert_eq!(health.status, HealthStatus::Healthy);
        health.record(false, 100, now);
        health.record(false, 100, now);
        assert_eq!(health.status, HealthStatus::Warning);
        for _ in 0..10 {
            health.record(false, 300, now);
        }
        assert_eq!(health.status, HealthStatus::Critical);
        assert_eq!(health.samples(), HEALTH_WINDOW);

        health.set_override(Some(HealthStatus::Down));
        assert_eq!(health.status, HealthStatus::Down);
        health.set_override(None);
        assert_eq!(health.status, HealthStatus::Critical);
    }

    #[test]
    fn rules_gate_and_boost_paths() {
        let rules = CompiledRules::compile(&[
            CrawlRule::IncludePath { pattern: "^/(planning|meetings)".into() },
            CrawlRule::ExcludePath { pattern: "/archive/".into() },
            CrawlRule::PriorityBoost { pattern: "^/planning".into(), boost: 3.0 },
        ])
        .unwrap();
        assert!(rules.rejection("/planning/24-0001").is_none());
        assert!(rules.rejection("/planning/archive/2001").is_some());
        assert!(rules.rejection("/about").is_some());
        assert_eq!(rules.boost("/planning/24-0001"), 3.0);
        assert_eq!(rules.boost("/meetings"), 0.0);
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(matches!(
            CompiledRules::compile(&[CrawlRule::ExcludePath { pattern: "(".into() }]),
            Err(SchedulerError::InvalidRule { .. })
        ));
    }

    #[test]
    fn targets_deserialize_from_config() {
        let target: CrawlTarget = serde_json::from_str(
            r#"{"domain":"council.gov.uk","base_priority":8,"crawl_frequency":"hourly",
                "rules":[{"type":"rate_limit","requests_per_minute":10}]}"#,
        )
        .unwrap();
        assert_eq!(target.crawl_frequency, CrawlFrequency::Hourly);
        assert_eq!(target.rate_limit(), Some(10));
    }
}
