//! URL discovery: harvest links from fetched markup, filter them against the
//! domain allowlist, detect sibling patterns and score what survives.
//!
//! ```text
//! markup ─► harvest ─► resolve ─► allowlist / unwanted ─► special classes
//!                                        │
//!                                        └─► detect_patterns ─► score ─► per-depth caps
//! ```

pub mod candidates;
pub mod patterns;
pub mod scoring;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use url::Url;

pub use candidates::{harvest, CandidateSource, RawCandidate};
pub use patterns::{detect_patterns, DetectedPattern, PatternKind};
pub use scoring::{depth_cap, score_url};

use crate::error::DiscoveryError;
use crate::types::UrlCategory;

lazy_static! {
    static ref STATIC_ASSET: Regex = Regex::new(
        r"(?i)\.(css|js|mjs|map|png|jpe?g|gif|svg|webp|ico|bmp|woff2?|ttf|eot|otf|mp3|mp4|avi|mov|zip|gz|tar)$"
    )
    .unwrap();
    static ref PRINT_OR_MOBILE: Regex = Regex::new(
        r"(?i)(/print/|[?&](print|format)=(1|true|print)|/mobile/|[?&]mobile=|^/m/|/amp/?$)"
    )
    .unwrap();
    static ref AUTH_ENDPOINT: Regex = Regex::new(
        r"(?i)/(login|logout|log-in|log-out|signin|sign-in|signout|sign-out|register|my-account|account|wp-admin|wp-login\.php|auth|password|basket|cart)(/|$|\?)"
    )
    .unwrap();
}

const SKIPPED_SCHEMES: [&str; 5] = ["javascript:", "mailto:", "tel:", "data:", "sms:"];

const DEFAULT_SOCIAL_DOMAINS: [&str; 9] = [
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "nextdoor.com",
    "flickr.com",
];

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Hosts that may be crawled; sub-domains included. Empty means the base
    /// URL's host only.
    pub allowed_domains: Vec<String>,
    /// Off-allowlist hosts worth reporting.
    pub relevant_external_domains: Vec<String>,
    pub social_domains: Vec<String>,
    /// Pages at or beyond this crawl depth yield no queueable URLs.
    pub max_depth: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            relevant_external_domains: Vec::new(),
            social_domains: DEFAULT_SOCIAL_DOMAINS.iter().map(|d| d.to_string()).collect(),
            max_depth: 5,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains;
        self
    }

    pub fn with_external_domains(mut self, domains: Vec<String>) -> Self {
        self.relevant_external_domains = domains;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }
}

/// A candidate that survived filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub source: CandidateSource,
    pub anchor_text: Option<String>,
    pub category: UrlCategory,
    /// Crawl depth of the discovered page (source depth + 1).
    pub depth: u32,
    pub path_depth: usize,
    /// 1..=20
    pub score: u8,
    pub pattern: Option<PatternKind>,
}

/// URL classes reported separately from the crawl queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialUrls {
    pub sitemaps: Vec<String>,
    pub api_endpoints: Vec<String>,
    pub feeds: Vec<String>,
    pub social: Vec<String>,
    pub external: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub candidates: usize,
    pub duplicates: usize,
    pub rejected_scheme: usize,
    pub rejected_domain: usize,
    pub rejected_unwanted: usize,
    /// Dropped by the per-depth caps.
    pub truncated: usize,
    pub depth_limited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub base_url: String,
    pub depth: u32,
    /// Highest score first.
    pub urls: Vec<DiscoveredUrl>,
    pub special: SpecialUrls,
    pub patterns: Vec<DetectedPattern>,
    pub stats: DiscoveryStats,
}

fn host_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches("www.").to_lowercase();
    let host = host.to_lowercase();
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn push_unique(list: &mut Vec<String>, url: &Url) {
    let url = url.to_string();
    if !list.contains(&url) {
        list.push(url);
    }
}

fn is_sitemap(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    path.contains("sitemap") && (path.ends_with(".xml") || candidates::extension(&path).is_none())
}

fn is_feed(url: &Url, source: CandidateSource) -> bool {
    let path = url.path().to_lowercase();
    source == CandidateSource::Feed
        || path.ends_with("/feed")
        || path.ends_with("/rss")
        || matches!(candidates::extension(&path).as_deref(), Some("rss" | "atom"))
}

fn is_unwanted(url: &Url) -> bool {
    let path = url.path();
    let path_and_query = match url.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };
    STATIC_ASSET.is_match(path)
        || PRINT_OR_MOBILE.is_match(&path_and_query)
        || AUTH_ENDPOINT.is_match(&path_and_query)
}

/// Extracts and ranks crawlable URLs from fetched content.
#[derive(Debug, Clone, Default)]
pub struct UrlDiscovery {
    config: DiscoveryConfig,
}

impl UrlDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn is_allowed(&self, host: &str, base: &Url) -> bool {
        if self.config.allowed_domains.is_empty() {
            return base
                .host_str()
                .is_some_and(|base_host| host_matches(host, base_host));
        }
        self.config
            .allowed_domains
            .iter()
            .any(|d| host_matches(host, d))
    }

    fn is_social(&self, host: &str) -> bool {
        self.config.social_domains.iter().any(|d| host_matches(host, d))
    }

    fn is_relevant_external(&self, host: &str) -> bool {
        self.config
            .relevant_external_domains
            .iter()
            .any(|d| host_matches(host, d))
    }

    /// Discover URLs in `content`, a page at crawl depth `depth`.
    pub fn discover_urls(
        &self,
        content: &str,
        base_url: &str,
        depth: u32,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let base = Url::parse(base_url).map_err(|source| DiscoveryError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        let mut base_key = base.clone();
        base_key.set_fragment(None);

        let mut stats = DiscoveryStats::default();
        let mut special = SpecialUrls::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept: Vec<(Url, RawCandidate)> = Vec::new();

        for raw in harvest(content) {
            stats.candidates += 1;
            let lowered = raw.href.to_lowercase();
            if raw.href.is_empty()
                || raw.href.starts_with('#')
                || SKIPPED_SCHEMES.iter().any(|s| lowered.starts_with(s))
            {
                stats.rejected_unwanted += 1;
                continue;
            }
            let Ok(mut url) = base.join(&raw.href) else {
                stats.rejected_unwanted += 1;
                continue;
            };
            url.set_fragment(None);
            if !matches!(url.scheme(), "http" | "https") {
                stats.rejected_scheme += 1;
                continue;
            }
            let Some(host) = url.host_str().map(str::to_string) else {
                stats.rejected_scheme += 1;
                continue;
            };

            if !self.is_allowed(&host, &base) {
                if raw.source == CandidateSource::Script {
                    stats.rejected_domain += 1;
                } else if self.is_social(&host) {
                    push_unique(&mut special.social, &url);
                } else if self.is_relevant_external(&host) {
                    push_unique(&mut special.external, &url);
                } else {
                    stats.rejected_domain += 1;
                }
                continue;
            }

            if url == base_key || !seen.insert(url.to_string()) {
                stats.duplicates += 1;
                continue;
            }
            if is_unwanted(&url) {
                stats.rejected_unwanted += 1;
                continue;
            }
            if patterns::is_api_like(&url) {
                push_unique(&mut special.api_endpoints, &url);
                continue;
            }
            if is_sitemap(&url) {
                push_unique(&mut special.sitemaps, &url);
            } else if is_feed(&url, raw.source) {
                push_unique(&mut special.feeds, &url);
            }
            kept.push((url, raw));
        }

        let kept_urls: Vec<Url> = kept.iter().map(|(u, _)| u.clone()).collect();
        let patterns = detect_patterns(&kept_urls);
        let mut pattern_of: HashMap<&str, PatternKind> = HashMap::new();
        for pattern in &patterns {
            for member in &pattern.members {
                pattern_of.entry(member.as_str()).or_insert(pattern.kind);
            }
        }

        let mut discovered: Vec<DiscoveredUrl> = if depth >= self.config.max_depth {
            stats.depth_limited = true;
            Vec::new()
        } else {
            kept.into_iter()
                .map(|(url, raw)| {
                    let key = url.to_string();
                    let pattern = pattern_of.get(key.as_str()).copied();
                    DiscoveredUrl {
                        score: score_url(&url, depth, pattern),
                        category: UrlCategory::from_path(url.path()),
                        path_depth: patterns::path_segments(&url).len(),
                        depth: depth + 1,
                        pattern,
                        source: raw.source,
                        anchor_text: raw.anchor_text,
                        url: key,
                    }
                })
                .collect()
        };
        discovered.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.url.cmp(&b.url)));

        let mut per_depth: BTreeMap<usize, usize> = BTreeMap::new();
        let before = discovered.len();
        discovered.retain(|d| {
            let taken = per_depth.entry(d.path_depth).or_insert(0);
            *taken += 1;
            *taken <= depth_cap(d.path_depth)
        });
        stats.truncated = before - discovered.len();

        tracing::debug!(
            base_url = %base,
            depth,
            candidates = stats.candidates,
            kept = discovered.len(),
            patterns = patterns.len(),
            "URL discovery complete"
        );

        Ok(DiscoveryResult {
            base_url: base.to_string(),
            depth,
            urls: discovered,
            special,
            patterns,
            stats,
        })
    }
}
