//! Grouping of sibling URLs into list, archive and API patterns.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use super::candidates::extension;

lazy_static! {
    static ref YEAR: Regex = Regex::new(r"(^|[^0-9])(19|20)[0-9]{2}([^0-9]|$)").unwrap();
}

/// Smallest group reported as a pattern.
pub const MIN_PATTERN_MEMBERS: usize = 3;

const LIST_KEYWORDS: [&str; 12] = [
    "news", "events", "meetings", "applications", "documents", "minutes", "agendas",
    "consultations", "list", "search", "page", "category",
];

const API_EXTENSIONS: [&str; 3] = ["json", "xml", "csv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    ListPage,
    Archive,
    ApiEndpoint,
}

impl PatternKind {
    /// Score adjustment applied to every member URL.
    pub fn score_bonus(&self) -> i32 {
        match self {
            PatternKind::ListPage => 2,
            PatternKind::Archive => 1,
            PatternKind::ApiEndpoint => -1,
        }
    }
}

/// Sibling URLs sharing a parent path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub kind: PatternKind,
    pub base_path: String,
    /// Number of path segments shared by every member.
    pub depth: usize,
    pub members: Vec<String>,
    /// 0.0..=1.0
    pub confidence: f64,
}

pub fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

pub fn is_api_like(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    path.contains("/api/")
        || extension(&path).is_some_and(|ext| ext == "json")
        || url
            .query_pairs()
            .any(|(k, v)| k == "format" && (v == "json" || v == "xml"))
}

fn fraction<F: Fn(&Url) -> bool>(members: &[&Url], predicate: F) -> f64 {
    members.iter().filter(|u| predicate(u)).count() as f64 / members.len() as f64
}

fn classify(base_path: &str, members: &[&Url]) -> Option<(PatternKind, f64)> {
    let api = fraction(members, |u| {
        is_api_like(u) || extension(u.path()).is_some_and(|e| API_EXTENSIONS.contains(&e.as_str()))
    });
    if api >= 0.5 {
        return Some((PatternKind::ApiEndpoint, api));
    }

    let archive = fraction(members, |u| YEAR.is_match(u.path()));
    if archive >= 0.5 {
        return Some((PatternKind::Archive, archive));
    }

    let parent_path = base_path
        .split_once('/')
        .map_or("", |(_, path)| path)
        .to_lowercase();
    let keyword_base = LIST_KEYWORDS.iter().any(|k| parent_path.contains(k));
    let paged = fraction(members, |u| {
        u.query_pairs().any(|(k, _)| k == "page" || k == "p" || k == "offset")
    });
    match (keyword_base, paged) {
        (true, p) => Some((PatternKind::ListPage, (0.7 + 0.3 * p).min(1.0))),
        (false, p) if p >= 0.5 => Some((PatternKind::ListPage, p)),
        _ => None,
    }
}

/// Group URLs by (segment count, parent path) and classify groups of three
/// or more.
pub fn detect_patterns(urls: &[Url]) -> Vec<DetectedPattern> {
    let mut groups: BTreeMap<(usize, String), Vec<&Url>> = BTreeMap::new();
    for url in urls {
        let segments = path_segments(url);
        if segments.is_empty() {
            continue;
        }
        let parent = format!(
            "{}/{}",
            url.host_str().unwrap_or_default(),
            segments[..segments.len() - 1].join("/")
        );
        groups.entry((segments.len(), parent)).or_default().push(url);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= MIN_PATTERN_MEMBERS)
        .filter_map(|((depth, base_path), members)| {
            let (kind, confidence) = classify(&base_path, &members)?;
            Some(DetectedPattern {
                kind,
                base_path,
                depth,
                members: members.iter().map(|u| u.to_string()).collect(),
                confidence,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<Url> {
        list.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    #[test]
    fn year_siblings_form_an_archive() {
        let patterns = detect_patterns(&urls(&[
            "https://council.gov.uk/budget/2022",
            "https://council.gov.uk/budget/2023",
            "https://council.gov.uk/budget/2024",
        ]));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Archive);
        assert_eq!(patterns[0].confidence, 1.0);
        assert_eq!(patterns[0].depth, 2);
    }

    #[test]
    fn keyword_parent_forms_a_list() {
        let patterns = detect_patterns(&urls(&[
            "https://council.gov.uk/news/bins",
            "https://council.gov.uk/news/roads",
            "https://council.gov.uk/news/parks",
        ]));
        assert_eq!(patterns[0].kind, PatternKind::ListPage);
        assert_eq!(patterns[0].confidence, 0.7);
    }

    #[test]
    fn json_siblings_form_an_api() {
        let patterns = detect_patterns(&urls(&[
            "https://council.gov.uk/data/spend.json",
            "https://council.gov.uk/data/contracts.json",
            "https://council.gov.uk/data/grants.json",
        ]));
        assert_eq!(patterns[0].kind, PatternKind::ApiEndpoint);
    }

    #[test]
    fn small_or_plain_groups_are_ignored() {
        assert!(detect_patterns(&urls(&[
            "https://council.gov.uk/news/a",
            "https://council.gov.uk/news/b",
        ]))
        .is_empty());
        assert!(detect_patterns(&urls(&[
            "https://council.gov.uk/about/a",
            "https://council.gov.uk/about/b",
            "https://council.gov.uk/about/c",
        ]))
        .is_empty());
    }
}
