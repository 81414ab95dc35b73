//! Text normalization, fingerprints and similarity measures.
//!
//! Shared by the deduplication strategies and by [`MemoryStorage`], which
//! emulates the trigram and full-text ranking a database backend would
//! provide server-side.
//!
//! [`MemoryStorage`]: crate::stores::MemoryStorage

use sha2::{Digest, Sha256};
use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "will", "have",
    "has", "had", "not", "but", "all", "any", "can", "our", "your", "you", "its", "into", "about",
    "there", "their", "they", "them", "these", "those", "been", "being", "which", "when", "what",
    "who", "how", "also", "more", "other", "such", "than", "then", "may", "page", "home",
];

/// Normalize text for hashing and comparison.
///
/// - Convert to lowercase
/// - Remove all non-alphanumeric characters (except spaces)
/// - Collapse runs of whitespace into single spaces
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of the given bytes as lowercase hex.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint over normalized title, description, type, category and location.
pub fn content_fingerprint(
    title: &str,
    description: &str,
    kind: &str,
    category: &str,
    location: &str,
) -> String {
    let joined = [title, description, kind, category, location]
        .iter()
        .map(|part| normalize_text(part))
        .collect::<Vec<_>>()
        .join("|");
    sha256_hex(&joined)
}

/// Trigrams of normalized text, padded per word like `pg_trgm`.
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut grams = HashSet::new();
    for word in normalize_text(text).split_whitespace() {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

/// Trigram similarity: shared trigrams over the union of both sets.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let left = trigrams(a);
    let right = trigrams(b);
    if left.is_empty() && right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}

/// Content-bearing words: normalized, at least 3 chars, stopwords removed.
pub fn keyword_set(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split_whitespace()
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Whether `word` is a stopword.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Keyword rank between two texts (Dice coefficient over keyword sets).
pub fn full_text_rank(a: &str, b: &str) -> f64 {
    let left = keyword_set(a);
    let right = keyword_set(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    (2 * shared) as f64 / (left.len() + right.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_case_and_punctuation() {
        assert_eq!(
            normalize_text("Planning  Committee – Meeting!"),
            "planning committee meeting"
        );
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let hash = content_fingerprint("a", "b", "c", "d", "e");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_fields_are_positional() {
        assert_ne!(
            content_fingerprint("a", "b", "", "", ""),
            content_fingerprint("b", "a", "", "", "")
        );
    }

    #[test]
    fn meeting_title_variants_are_similar() {
        let score = trigram_similarity(
            "Planning Committee Meeting - 12 March 2025",
            "Planning Committee Meeting – 12th March 2025",
        );
        assert!(score >= 0.75, "score was {score}");
    }

    #[test]
    fn unrelated_titles_are_dissimilar() {
        let score = trigram_similarity("Budget consultation 2024", "Street lighting repairs");
        assert!(score < 0.3, "score was {score}");
    }

    #[test]
    fn identical_text_ranks_one() {
        let text = "Residents parking permit consultation";
        assert_eq!(full_text_rank(text, text), 1.0);
        assert_eq!(full_text_rank(text, ""), 0.0);
    }

    #[test]
    fn keyword_set_drops_stopwords() {
        let words = keyword_set("The budget for the year");
        assert!(words.contains("budget"));
        assert!(words.contains("year"));
        assert!(!words.contains("the"));
        assert!(!words.contains("for"));
    }
}
