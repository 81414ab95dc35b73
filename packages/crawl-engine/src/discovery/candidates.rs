//! Raw link harvesting from markup.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref SCRIPT_URL: Regex = Regex::new(r#"https?://[^\s"'<>()\\]+"#).unwrap();
    static ref REFRESH_TARGET: Regex = Regex::new(r#"(?i)url\s*=\s*['"]?([^'"\s;]+)"#).unwrap();
}

/// File extensions treated as documents worth fetching.
pub const DOCUMENT_EXTENSIONS: [&str; 11] = [
    "pdf", "doc", "docx", "xls", "xlsx", "csv", "odt", "ods", "ppt", "pptx", "rtf",
];

/// Where in the markup a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Link,
    Area,
    FormAction,
    Document,
    Script,
    MetaRefresh,
    Canonical,
    Feed,
}

/// An unresolved reference found in markup.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub href: String,
    pub source: CandidateSource,
    pub anchor_text: Option<String>,
}

impl RawCandidate {
    fn new(href: &str, source: CandidateSource) -> Self {
        Self {
            href: href.trim().to_string(),
            source,
            anchor_text: None,
        }
    }
}

/// Lowercased extension of the last path segment.
pub fn extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5).then(|| ext.to_lowercase())
}

pub fn is_document_path(path: &str) -> bool {
    extension(path).is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
        || path.to_lowercase().contains("/documents/")
}

fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Every reference in `html`, in document order per source kind.
pub fn harvest(html: &str) -> Vec<RawCandidate> {
    let document = Html::parse_document(html);
    let mut found = Vec::new();

    for link in select(&document, "a[href]") {
        if let Some(href) = link.value().attr("href") {
            let mut candidate = RawCandidate::new(href, CandidateSource::Link);
            candidate.anchor_text = text_of(link);
            found.push(candidate);
        }
    }
    for area in select(&document, "area[href]") {
        if let Some(href) = area.value().attr("href") {
            found.push(RawCandidate::new(href, CandidateSource::Area));
        }
    }
    for form in select(&document, "form[action]") {
        let el = form.value();
        // Only idempotent forms can be followed.
        let method = el.attr("method").unwrap_or("get");
        if method.eq_ignore_ascii_case("get") {
            if let Some(action) = el.attr("action") {
                found.push(RawCandidate::new(action, CandidateSource::FormAction));
            }
        }
    }
    for img in select(&document, "img[src]") {
        if let Some(src) = img.value().attr("src") {
            if is_document_path(src.split(['?', '#']).next().unwrap_or(src)) {
                found.push(RawCandidate::new(src, CandidateSource::Document));
            }
        }
    }
    for script in select(&document, "script") {
        let body: String = script.text().collect();
        for m in SCRIPT_URL.find_iter(&body) {
            found.push(RawCandidate::new(m.as_str(), CandidateSource::Script));
        }
    }
    for meta in select(&document, "meta[http-equiv]") {
        let el = meta.value();
        let is_refresh = el
            .attr("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("refresh"));
        if let (true, Some(content)) = (is_refresh, el.attr("content")) {
            if let Some(target) = REFRESH_TARGET.captures(content).and_then(|c| c.get(1)) {
                found.push(RawCandidate::new(target.as_str(), CandidateSource::MetaRefresh));
            }
        }
    }
    for link in select(&document, "link[rel][href]") {
        let el = link.value();
        let rel = el.attr("rel").unwrap_or_default().to_lowercase();
        let Some(href) = el.attr("href") else {
            continue;
        };
        if rel.split_whitespace().any(|r| r == "canonical") {
            found.push(RawCandidate::new(href, CandidateSource::Canonical));
        } else if rel.split_whitespace().any(|r| r == "alternate") {
            let kind = el.attr("type").unwrap_or_default().to_lowercase();
            if kind.contains("rss") || kind.contains("atom") || kind.contains("xml") {
                found.push(RawCandidate::new(href, CandidateSource::Feed));
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harvests_every_source_kind() {
        let html = r#"<html><head>
            <meta http-equiv="refresh" content="5; url=/moved">
            <link rel="canonical" href="https://council.gov.uk/home">
            <link rel="alternate" type="application/rss+xml" href="/news/feed.xml">
            <link rel="stylesheet" href="/style.css">
            <script>var api = "https://council.gov.uk/api/events.json";</script>
          </head><body>
            <a href="/meetings">  Council   meetings </a>
            <map><area href="/wards/north"></map>
            <form action="/search" method="get"></form>
            <form action="/login" method="post"></form>
            <img src="/documents/budget.pdf"><img src="/logo.png">
          </body></html>"#;
        let found = harvest(html);
        let source_of = |href: &str| found.iter().find(|c| c.href == href).map(|c| c.source);

        assert_eq!(source_of("/meetings"), Some(CandidateSource::Link));
        assert_eq!(source_of("/wards/north"), Some(CandidateSource::Area));
        assert_eq!(source_of("/search"), Some(CandidateSource::FormAction));
        assert_eq!(source_of("/login"), None);
        assert_eq!(source_of("/documents/budget.pdf"), Some(CandidateSource::Document));
        assert_eq!(source_of("/logo.png"), None);
        assert_eq!(
            source_of("https://council.gov.uk/api/events.json"),
            Some(CandidateSource::Script)
        );
        assert_eq!(source_of("/moved"), Some(CandidateSource::MetaRefresh));
        assert_eq!(source_of("https://council.gov.uk/home"), Some(CandidateSource::Canonical));
        assert_eq!(source_of("/news/feed.xml"), Some(CandidateSource::Feed));
        assert_eq!(source_of("/style.css"), None);

        let meetings = found.iter().find(|c| c.href == "/meetings").unwrap();
        assert_eq!(meetings.anchor_text.as_deref(), Some("Council meetings"));
    }

    #[test]
    fn extensions_and_document_paths() {
        assert_eq!(extension("/files/Report.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension("/meetings/2025"), None);
        assert!(is_document_path("/downloads/minutes.docx"));
        assert!(is_document_path("/documents/s1234/agenda"));
        assert!(!is_document_path("/images/logo.png"));
    }
}
