use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::similarity::sha256_hex;

/// Classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Parse,
    Extraction,
    Validation,
    Storage,
    Timeout,
    Task,
    RateLimit,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Parse => "parse",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Validation => "validation",
            ErrorKind::Storage => "storage",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Task => "task",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorExample {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregated occurrences of one (kind, operation, url) error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub key: String,
    pub kind: ErrorKind,
    pub operation: String,
    pub url: Option<String>,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub examples: VecDeque<ErrorExample>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, operation: &str, url: Option<&str>, at: DateTime<Utc>) -> Self {
        Self {
            key: error_key(kind, operation, url),
            kind,
            operation: operation.to_string(),
            url: url.map(str::to_string),
            count: 0,
            first_seen: at,
            last_seen: at,
            examples: VecDeque::new(),
        }
    }

    /// Count one more occurrence, keeping at most `max_examples` recent messages.
    pub fn record(&mut self, message: String, at: DateTime<Utc>, max_examples: usize) {
        self.count += 1;
        self.last_seen = at;
        self.examples.push_back(ErrorExample {
            message,
            occurred_at: at,
        });
        while self.examples.len() > max_examples {
            self.examples.pop_front();
        }
    }
}

/// Ledger key: hash of kind, operation and url.
pub fn error_key(kind: ErrorKind, operation: &str, url: Option<&str>) -> String {
    let raw = format!("{}|{}|{}", kind.as_str(), operation, url.unwrap_or(""));
    sha256_hex(&raw)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_depends_on_every_part() {
        let base = error_key(ErrorKind::Network, "fetch", Some("https://a.test/"));
        assert_eq!(base, error_key(ErrorKind::Network, "fetch", Some("https://a.test/")));
        assert_ne!(base, error_key(ErrorKind::Parse, "fetch", Some("https://a.test/")));
        assert_ne!(base, error_key(ErrorKind::Network, "extract", Some("https://a.test/")));
        assert_ne!(base, error_key(ErrorKind::Network, "fetch", None));
    }

    #[test]
    fn examples_are_bounded() {
        let now = Utc::now();
        let mut record = ErrorRecord::new(ErrorKind::Task, "run", None, now);
        for i in 0..8 {
            record.record(format!("failure {i}"), now, 5);
        }
        assert_eq!(record.count, 8);
        assert_eq!(record.examples.len(), 5);
        assert_eq!(record.examples.front().unwrap().message, "failure 3");
    }
}
