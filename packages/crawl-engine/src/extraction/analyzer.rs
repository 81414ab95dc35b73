//! Heuristic page classification.
//!
//! Produces the [`ContentAnalysis`] the scheduler feeds into its dynamic
//! priority formula. Everything here is keyword and pattern based.

use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;

use super::dates::{count_amounts, find_dates};
use super::formats::{process, ContentFormat, ProcessedContent};
use crate::similarity::{is_stopword, normalize_text, sha256_hex};
use crate::types::{
    ChangeFrequency, Complexity, ContentAnalysis, ContentType, ExtractableData, Sentiment,
    StructureLevel,
};

/// Keywords counted per content type. URL hits weigh double.
const TYPE_KEYWORDS: [(ContentType, &[&str]); 7] = [
    (
        ContentType::Meeting,
        &["meeting", "agenda", "minutes", "committee", "councillors", "attendees"],
    ),
    (
        ContentType::Planning,
        &["planning", "application", "applicant", "proposal", "development", "permission"],
    ),
    (
        ContentType::Finance,
        &["budget", "spending", "expenditure", "payment", "invoice", "supplier", "contract"],
    ),
    (
        ContentType::Transparency,
        &["transparency", "freedom", "foi", "disclosure", "open data", "allowances"],
    ),
    (
        ContentType::Service,
        &["apply", "report", "bin", "collection", "parking", "permit", "council tax"],
    ),
    (
        ContentType::Consultation,
        &["consultation", "have your say", "survey", "feedback", "respond", "closing date"],
    ),
    (
        ContentType::Document,
        &["document", "download", "pdf", "report", "strategy", "policy"],
    ),
];

/// Per-type occurrence cap so one repeated word cannot dominate.
const KEYWORD_HIT_CAP: usize = 5;
const URL_KEYWORD_WEIGHT: usize = 2;
const MAX_KEYWORDS: usize = 10;

const POSITIVE_WORDS: &[&str] = &[
    "approved", "granted", "improved", "success", "welcome", "pleased", "award", "support",
    "investment", "opened",
];
const NEGATIVE_WORDS: &[&str] = &[
    "refused", "rejected", "objection", "complaint", "closed", "cancelled", "delay", "cut",
    "deficit", "breach",
];

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    static ref PHONE: Regex =
        Regex::new(r"(?:\+44\s?\d{2,4}|\(?0\d{2,4}\)?)[\s-]?\d{3,4}[\s-]?\d{3,4}").unwrap();
}

fn base_importance(content_type: ContentType) -> i32 {
    match content_type {
        ContentType::Planning => 8,
        ContentType::Meeting => 7,
        ContentType::Finance => 7,
        ContentType::Transparency => 6,
        ContentType::Consultation => 6,
        ContentType::Service => 5,
        ContentType::Document => 4,
        ContentType::Other => 3,
    }
}

fn count_selector(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

/// Analyze one fetch of a page.
pub fn analyze_content(url: &str, content: &str, content_type: &str) -> ContentAnalysis {
    analyze_content_at(url, content, content_type, Utc::now().date_naive())
}

/// [`analyze_content`] with an explicit "today" for freshness scoring.
pub fn analyze_content_at(
    url: &str,
    content: &str,
    content_type: &str,
    today: NaiveDate,
) -> ContentAnalysis {
    let format = ContentFormat::detect(content_type, url, content);
    let processed = process(format, content).unwrap_or_else(|e| {
        tracing::debug!(url, error = %e, "Analyzing unprocessed content");
        ProcessedContent {
            text_content: content.to_string(),
            ..Default::default()
        }
    });
    let text = processed.text_content.to_lowercase();
    let path = url::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());

    let (content_type, top_score, runner_up) = classify(&path, &text);
    let extractable_data = extractable_counts(&processed, format);

    let structure = if (format != ContentFormat::Html && !format.is_stub())
        || extractable_data.structured_blocks > 0
    {
        StructureLevel::Structured
    } else if extractable_data.tables > 0 || extractable_data.lists >= 3 || extractable_data.forms > 0 {
        StructureLevel::SemiStructured
    } else {
        StructureLevel::Unstructured
    };

    let words = processed.word_count();
    let mut importance = base_importance(content_type);
    if extractable_data.total() > 20 {
        importance += 1;
    }
    if structure == StructureLevel::Structured {
        importance += 1;
    }
    if words < 50 {
        importance -= 1;
    }

    let dates = find_dates(&processed.text_content);
    let freshness = freshness_score(dates.iter().max().copied(), today);

    let confidence = if content_type == ContentType::Other {
        0.3
    } else {
        let margin = (top_score - runner_up) as f64 / top_score.max(1) as f64;
        let bonus = if structure == StructureLevel::Unstructured { 0.0 } else { 0.1 };
        (0.5 + 0.4 * margin + bonus).clamp(0.0, 1.0)
    };

    ContentAnalysis {
        content_type,
        importance: importance.clamp(1, 10) as u8,
        freshness,
        structure,
        extractable_data,
        keywords: top_keywords(&text),
        sentiment: sentiment(&text),
        complexity: complexity(&processed.text_content),
        change_frequency: change_frequency(content_type, &path, &text, freshness),
        confidence,
        content_hash: sha256_hex(content),
    }
}

/// Winning type plus its score and the runner-up score.
fn classify(path: &str, text: &str) -> (ContentType, usize, usize) {
    let mut scores: Vec<(ContentType, usize)> = TYPE_KEYWORDS
        .iter()
        .map(|(kind, words)| {
            let score = words
                .iter()
                .map(|w| {
                    let in_url = usize::from(path.contains(&w.replace(' ', "-")) || path.contains(w));
                    in_url * URL_KEYWORD_WEIGHT + text.matches(w).count().min(KEYWORD_HIT_CAP)
                })
                .sum();
            (*kind, score)
        })
        .collect();
    // Stable sort keeps table order on ties.
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (kind, top) = scores[0];
    let runner_up = scores.get(1).map(|s| s.1).unwrap_or(0);
    if top == 0 {
        (ContentType::Other, 0, 0)
    } else {
        (kind, top, runner_up)
    }
}

fn extractable_counts(processed: &ProcessedContent, format: ContentFormat) -> ExtractableData {
    let text = &processed.text_content;
    let mut data = ExtractableData {
        dates: find_dates(text).len(),
        amounts: count_amounts(text),
        emails: EMAIL.find_iter(text).count(),
        phones: PHONE.find_iter(text).count(),
        structured_blocks: processed.embedded_structured_data.len(),
        ..Default::default()
    };

    match (&processed.markup, format) {
        (Some(markup), ContentFormat::Html) => {
            let document = Html::parse_document(markup);
            data.tables = count_selector(&document, "table");
            data.lists = count_selector(&document, "ul, ol, dl");
            data.forms = count_selector(&document, "form");
            data.links = count_selector(&document, "a[href]");
            data.structured_blocks += count_selector(&document, "[itemscope]");
        }
        _ => {
            data.tables = usize::from(!processed.rows.is_empty());
            data.links = processed
                .metadata
                .get("urls")
                .and_then(|v| v.as_array())
                .map_or(0, Vec::len);
        }
    }
    data
}

fn freshness_score(newest: Option<NaiveDate>, today: NaiveDate) -> u8 {
    let Some(newest) = newest else {
        return 5;
    };
    // Upcoming dates count as fresh.
    let age = (today - newest).num_days().max(0);
    match age {
        0..=7 => 10,
        8..=30 => 8,
        31..=90 => 6,
        91..=365 => 4,
        _ => 2,
    }
}

fn top_keywords(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in normalize_text(text).split_whitespace() {
        if word.chars().count() >= 4 && !is_stopword(word) && !word.chars().all(|c| c.is_ascii_digit()) {
            *counts.entry(word.to_string()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(MAX_KEYWORDS).map(|(w, _)| w).collect()
}

fn sentiment(text: &str) -> Sentiment {
    let positive: usize = POSITIVE_WORDS.iter().map(|w| text.matches(w).count()).sum();
    let negative: usize = NEGATIVE_WORDS.iter().map(|w| text.matches(w).count()).sum();
    if positive >= negative + 2 {
        Sentiment::Positive
    } else if negative >= positive + 2 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn complexity(text: &str) -> Complexity {
    let words = text.split_whitespace().count();
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let words_per_sentence = words as f64 / sentences as f64;

    if words > 2000 || words_per_sentence > 25.0 {
        Complexity::High
    } else if words > 500 || words_per_sentence > 18.0 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

fn change_frequency(content_type: ContentType, path: &str, text: &str, freshness: u8) -> ChangeFrequency {
    if path.contains("/live") || text.contains("live updates") {
        return ChangeFrequency::Always;
    }
    if path.contains("news") || freshness >= 10 {
        return ChangeFrequency::Daily;
    }
    match content_type {
        ContentType::Meeting | ContentType::Planning | ContentType::Consultation => {
            ChangeFrequency::Weekly
        }
        ContentType::Finance | ContentType::Transparency | ContentType::Service => {
            ChangeFrequency::Monthly
        }
        ContentType::Document => ChangeFrequency::Yearly,
        ContentType::Other if freshness <= 2 => ChangeFrequency::Never,
        ContentType::Other => ChangeFrequency::Monthly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn meeting_page_is_classified_from_url_and_text() {
        let html = r#"<html><body><h1>Planning Committee</h1>
            <p>Agenda for the meeting on 12 March 2025. Minutes of the previous meeting.</p>
            <ul><li>Item 1</li></ul></body></html>"#;
        let analysis = analyze_content_at(
            "https://council.gov.uk/meetings/agenda-12-march",
            html,
            "text/html",
            today(),
        );
        assert_eq!(analysis.content_type, ContentType::Meeting);
        assert_eq!(analysis.freshness, 10);
        assert!(analysis.confidence > 0.5);
        assert_eq!(analysis.extractable_data.dates, 1);
        assert_eq!(analysis.extractable_data.lists, 1);
    }

    #[test]
    fn unrelated_page_is_other() {
        let analysis = analyze_content_at("https://a.test/", "<p>Hello there</p>", "text/html", today());
        assert_eq!(analysis.content_type, ContentType::Other);
        assert_eq!(analysis.confidence, 0.3);
        assert_eq!(analysis.freshness, 5);
        assert!((1..=10).contains(&analysis.importance));
    }

    #[test]
    fn json_documents_are_structured() {
        let analysis = analyze_content_at(
            "https://a.test/spending.json",
            r#"[{"supplier":"Acme","amount":"£500","payment_date":"2024-06-02"}]"#,
            "application/json",
            today(),
        );
        assert_eq!(analysis.structure, StructureLevel::Structured);
        assert_eq!(analysis.content_type, ContentType::Finance);
        assert_eq!(analysis.freshness, 4);
    }

    #[test]
    fn old_content_is_less_fresh() {
        assert_eq!(freshness_score(NaiveDate::from_ymd_opt(2020, 1, 1), today()), 2);
        assert_eq!(freshness_score(NaiveDate::from_ymd_opt(2025, 2, 1), today()), 6);
        assert_eq!(freshness_score(NaiveDate::from_ymd_opt(2026, 1, 1), today()), 10);
    }

    #[test]
    fn hash_tracks_raw_content() {
        let a = analyze_content_at("https://a.test/", "<p>one</p>", "text/html", today());
        let b = analyze_content_at("https://a.test/", "<p>two</p>", "text/html", today());
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn keywords_skip_stopwords_and_short_words() {
        let keywords = top_keywords("the budget budget budget and the parking permit");
        assert_eq!(keywords[0], "budget");
        assert!(!keywords.iter().any(|k| k == "the" || k == "and"));
    }
}
