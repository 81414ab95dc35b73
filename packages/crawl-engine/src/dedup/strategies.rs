//! Similarity strategies and their local scoring functions.
//!
//! `content_hash`, `title_similarity` and `semantic_analysis` are answered by
//! the storage backend; the remaining strategies score candidates in-process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::similarity::{full_text_rank, trigram_similarity};
use crate::types::CorpusRecord;

/// Amount added to every fuzzy threshold in strict mode.
pub const STRICT_THRESHOLD_OFFSET: f64 = 0.1;

/// Days over which temporal similarity decays to zero.
pub const TEMPORAL_WINDOW_DAYS: f64 = 7.0;

pub const COMBINED_TITLE_WEIGHT: f64 = 0.35;
pub const COMBINED_SEMANTIC_WEIGHT: f64 = 0.2;
pub const COMBINED_URL_WEIGHT: f64 = 0.15;
pub const COMBINED_TEMPORAL_WEIGHT: f64 = 0.1;
pub const COMBINED_STRUCTURAL_WEIGHT: f64 = 0.2;

const STRUCTURAL_KIND_WEIGHT: f64 = 0.25;
const STRUCTURAL_FLAGS_WEIGHT: f64 = 0.25;
const STRUCTURAL_CATEGORY_WEIGHT: f64 = 0.2;
const STRUCTURAL_METADATA_WEIGHT: f64 = 0.3;

/// Path suffixes that do not change which page a URL names.
const INDEX_SEGMENTS: [&str; 5] = ["index.html", "index.htm", "index.php", "default.aspx", "home"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ContentHash,
    TitleSimilarity,
    SemanticAnalysis,
    UrlPattern,
    TemporalProximity,
    StructuralSimilarity,
    CombinedFeatures,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::ContentHash,
        StrategyKind::TitleSimilarity,
        StrategyKind::SemanticAnalysis,
        StrategyKind::UrlPattern,
        StrategyKind::TemporalProximity,
        StrategyKind::StructuralSimilarity,
        StrategyKind::CombinedFeatures,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::ContentHash => "content_hash",
            StrategyKind::TitleSimilarity => "title_similarity",
            StrategyKind::SemanticAnalysis => "semantic_analysis",
            StrategyKind::UrlPattern => "url_pattern",
            StrategyKind::TemporalProximity => "temporal_proximity",
            StrategyKind::StructuralSimilarity => "structural_similarity",
            StrategyKind::CombinedFeatures => "combined_features",
        }
    }

    /// Minimum similarity for a hit in normal mode.
    pub fn threshold(&self) -> f64 {
        match self {
            StrategyKind::ContentHash => 1.0,
            StrategyKind::TitleSimilarity => 0.75,
            StrategyKind::SemanticAnalysis => 0.6,
            StrategyKind::UrlPattern => 0.7,
            StrategyKind::TemporalProximity => 0.5,
            StrategyKind::StructuralSimilarity => 0.8,
            StrategyKind::CombinedFeatures => 0.75,
        }
    }

    /// Threshold after applying strict mode. Exact hashing is unaffected.
    pub fn effective_threshold(&self, strict: bool) -> f64 {
        match (self, strict) {
            (StrategyKind::ContentHash, _) | (_, false) => self.threshold(),
            (_, true) => self.threshold() + STRICT_THRESHOLD_OFFSET,
        }
    }

    /// Highest similarity a strategy may report.
    ///
    /// Weak signals are capped so they can never trigger a merge on their
    /// own. Shape alone stays below the duplicate band: records of one kind
    /// routinely share flags and metadata keys.
    pub fn ceiling(&self) -> f64 {
        match self {
            StrategyKind::UrlPattern => 0.8,
            StrategyKind::TemporalProximity => 0.6,
            StrategyKind::StructuralSimilarity => 0.65,
            _ => 1.0,
        }
    }

    /// Whether a capped score reached this strategy's threshold.
    pub fn reached(&self, capped: f64) -> bool {
        capped >= self.threshold().min(self.ceiling())
    }

    /// Cap `raw` at the ceiling.
    pub fn capped(&self, raw: f64) -> f64 {
        raw.clamp(0.0, self.ceiling())
    }
}

fn normalized_host(url: &url::Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_lowercase())
}

fn normalized_segments(url: &url::Url) -> Vec<String> {
    let mut segments: Vec<String> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_lowercase).collect())
        .unwrap_or_default();
    if segments
        .last()
        .is_some_and(|last| INDEX_SEGMENTS.contains(&last.as_str()))
    {
        segments.pop();
    }
    segments
}

/// Positional path-segment overlap on the same host.
pub fn url_similarity(a: &str, b: &str) -> f64 {
    let (Ok(a), Ok(b)) = (url::Url::parse(a), url::Url::parse(b)) else {
        return 0.0;
    };
    if normalized_host(&a) != normalized_host(&b) {
        return 0.0;
    }
    let left = normalized_segments(&a);
    let right = normalized_segments(&b);
    let longest = left.len().max(right.len());
    if longest == 0 {
        return 1.0;
    }
    let shared = left.iter().zip(&right).filter(|(x, y)| x == y).count();
    shared as f64 / longest as f64
}

/// Linear decay from 1.0 at the same instant to 0.0 at the window edge.
pub fn temporal_similarity(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let days = (a - b).num_seconds().abs() as f64 / 86_400.0;
    (1.0 - days / TEMPORAL_WINDOW_DAYS).max(0.0)
}

fn category_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (None, None) => 1.0,
        (Some(a), Some(b)) => {
            let left: Vec<&str> = a.split('/').filter(|s| !s.is_empty()).collect();
            let right: Vec<&str> = b.split('/').filter(|s| !s.is_empty()).collect();
            let depth = left.len().max(right.len());
            if depth == 0 {
                return 1.0;
            }
            let shared = left
                .iter()
                .zip(&right)
                .take_while(|(x, y)| x.eq_ignore_ascii_case(y))
                .count();
            shared as f64 / depth as f64
        }
        _ => 0.0,
    }
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    shared as f64 / (a.len() + b.len() - shared) as f64
}

/// Weighted agreement of kind, flags, category path and metadata keys.
pub fn structural_similarity(a: &CorpusRecord, b: &CorpusRecord) -> f64 {
    let kind = if a.kind == b.kind { 1.0 } else { 0.0 };

    let flag_names: BTreeSet<&str> = a.flags.keys().chain(b.flags.keys()).map(String::as_str).collect();
    let flags = if flag_names.is_empty() {
        1.0
    } else {
        flag_names
            .iter()
            .filter(|f| a.flags.get(**f) == b.flags.get(**f))
            .count() as f64
            / flag_names.len() as f64
    };

    let category = category_similarity(a.category.as_deref(), b.category.as_deref());

    let keys_a: BTreeSet<&str> = a.metadata.keys().map(String::as_str).collect();
    let keys_b: BTreeSet<&str> = b.metadata.keys().map(String::as_str).collect();
    let metadata = jaccard(&keys_a, &keys_b);

    kind * STRUCTURAL_KIND_WEIGHT
        + flags * STRUCTURAL_FLAGS_WEIGHT
        + category * STRUCTURAL_CATEGORY_WEIGHT
        + metadata * STRUCTURAL_METADATA_WEIGHT
}

fn searchable(record: &CorpusRecord) -> String {
    match &record.description {
        Some(description) => format!("{} {}", record.title, description),
        None => record.title.clone(),
    }
}

/// Per-signal scores between two records, each already capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureScores {
    pub title: f64,
    pub semantic: f64,
    pub url: f64,
    pub temporal: f64,
    pub structural: f64,
}

impl FeatureScores {
    pub fn between(a: &CorpusRecord, b: &CorpusRecord) -> Self {
        let url = match (&a.url, &b.url) {
            (Some(x), Some(y)) => url_similarity(x, y),
            _ => 0.0,
        };
        let temporal = match (a.event_date, b.event_date) {
            (Some(x), Some(y)) => temporal_similarity(x, y),
            _ => 0.0,
        };
        Self {
            title: trigram_similarity(&a.title, &b.title),
            semantic: full_text_rank(&searchable(a), &searchable(b)),
            url: StrategyKind::UrlPattern.capped(url),
            temporal: StrategyKind::TemporalProximity.capped(temporal),
            structural: StrategyKind::StructuralSimilarity.capped(structural_similarity(a, b)),
        }
    }

    /// Weighted blend of the capped signals.
    pub fn combined(&self) -> f64 {
        self.title * COMBINED_TITLE_WEIGHT
            + self.semantic * COMBINED_SEMANTIC_WEIGHT
            + self.url * COMBINED_URL_WEIGHT
            + self.temporal * COMBINED_TEMPORAL_WEIGHT
            + self.structural * COMBINED_STRUCTURAL_WEIGHT
    }

    /// Names of the signals that contributed at or above their own threshold.
    pub fn matched_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        let signals = [
            (StrategyKind::TitleSimilarity, self.title, "title"),
            (StrategyKind::SemanticAnalysis, self.semantic, "description"),
            (StrategyKind::UrlPattern, self.url, "url"),
            (StrategyKind::TemporalProximity, self.temporal, "event_date"),
            (StrategyKind::StructuralSimilarity, self.structural, "structure"),
        ];
        for (strategy, score, field) in signals {
            if strategy.reached(score) {
                fields.push(field.to_string());
            }
        }
        fields
    }
}
