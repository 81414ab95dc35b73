//! Additive URL scoring and per-depth caps.

use url::Url;

use super::candidates::is_document_path;
use super::patterns::{path_segments, PatternKind};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 20;

const BASE_SCORE: i32 = 5;
const CONTENT_KEYWORD_BONUS: i32 = 3;
const DOCUMENT_BONUS: i32 = 2;
const SANE_PATH_BONUS: i32 = 1;
const LONG_PATH_PENALTY: i32 = 2;
const NO_PARAMS_BONUS: i32 = 1;
const MANY_PARAMS_PENALTY: i32 = 2;

/// Path words that suggest civic content worth extracting.
const CONTENT_KEYWORDS: [&str; 18] = [
    "meeting", "agenda", "minutes", "committee", "planning", "application", "budget",
    "spending", "finance", "transparency", "consultation", "council", "decision", "policy",
    "report", "contract", "document", "service",
];

/// URLs kept per path depth.
pub fn depth_cap(depth: usize) -> usize {
    match depth {
        0 => 100,
        1 => 200,
        2 => 300,
        3 => 150,
        _ => 50,
    }
}

/// Score a candidate found on a page at crawl depth `crawl_depth`.
pub fn score_url(url: &Url, crawl_depth: u32, pattern: Option<PatternKind>) -> u8 {
    let path = url.path().to_lowercase();
    let mut score = BASE_SCORE;

    if CONTENT_KEYWORDS.iter().any(|k| path.contains(k)) {
        score += CONTENT_KEYWORD_BONUS;
    }
    if is_document_path(&path) {
        score += DOCUMENT_BONUS;
    }
    if let Some(pattern) = pattern {
        score += pattern.score_bonus();
    }
    score -= crawl_depth.min(MAX_SCORE as u32) as i32;

    match path_segments(url).len() {
        1..=4 => score += SANE_PATH_BONUS,
        n if n > 6 => score -= LONG_PATH_PENALTY,
        _ => {}
    }
    match url.query_pairs().count() {
        0 => score += NO_PARAMS_BONUS,
        n if n > 3 => score -= MANY_PARAMS_PENALTY,
        _ => {}
    }

    score.clamp(MIN_SCORE, MAX_SCORE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn keyword_document_and_shape_bonuses_add_up() {
        // 5 + 3 keyword + 2 document + 1 path + 1 no params
        assert_eq!(score_url(&url("https://c.gov.uk/planning/report.pdf"), 0, None), 12);
        // 5 + 1 path + 1 no params + 2 list
        assert_eq!(
            score_url(&url("https://c.gov.uk/news/bins"), 0, Some(PatternKind::ListPage)),
            9
        );
    }

    #[test]
    fn depth_and_noise_penalties() {
        let deep = url("https://c.gov.uk/a/b/c/d/e/f/g?w=1&x=2&y=3&z=4");
        // 5 - 2 long path - 2 many params - 1 depth, clamped up to 1
        assert_eq!(score_url(&deep, 1, None), 1);
        assert_eq!(score_url(&deep, 10, None), MIN_SCORE as u8);
    }

    #[test]
    fn scores_stay_in_range() {
        let best = url("https://c.gov.uk/meetings/agenda.pdf");
        assert!(score_url(&best, 0, Some(PatternKind::ListPage)) <= MAX_SCORE as u8);
        assert_eq!(depth_cap(0), 100);
        assert_eq!(depth_cap(2), 300);
        assert_eq!(depth_cap(9), 50);
    }
}
