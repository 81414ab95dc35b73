use serde::{Deserialize, Serialize};

/// Coarse category assigned to a URL when it is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UrlCategory {
    Meeting,
    Planning,
    Finance,
    Transparency,
    Consultation,
    Service,
    Document,
    News,
    #[default]
    General,
}

impl UrlCategory {
    /// Priority added on top of a target's base priority.
    pub fn priority(&self) -> f64 {
        match self {
            UrlCategory::Planning => 5.0,
            UrlCategory::Meeting => 4.0,
            UrlCategory::Finance => 4.0,
            UrlCategory::Transparency => 3.0,
            UrlCategory::Consultation => 3.0,
            UrlCategory::Document => 2.0,
            UrlCategory::Service => 2.0,
            UrlCategory::News => 1.0,
            UrlCategory::General => 0.0,
        }
    }

    /// Guess a category from URL path keywords.
    pub fn from_path(path: &str) -> Self {
        let path = path.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| path.contains(w));

        if has(&["planning", "application"]) {
            UrlCategory::Planning
        } else if has(&["meeting", "agenda", "minutes", "committee"]) {
            UrlCategory::Meeting
        } else if has(&["budget", "spending", "finance", "expenditure", "payments", "contract"]) {
            UrlCategory::Finance
        } else if has(&["transparency", "foi", "freedom-of-information", "open-data"]) {
            UrlCategory::Transparency
        } else if has(&["consultation", "have-your-say", "survey"]) {
            UrlCategory::Consultation
        } else if has(&[".pdf", ".doc", ".xls", ".csv", "/documents/", "/downloads/"]) {
            UrlCategory::Document
        } else if has(&["news", "press", "blog"]) {
            UrlCategory::News
        } else if has(&["services", "apply", "report-", "pay-"]) {
            UrlCategory::Service
        } else {
            UrlCategory::General
        }
    }
}

/// Content classification produced by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Meeting,
    Planning,
    Finance,
    Transparency,
    Service,
    Consultation,
    Document,
    #[default]
    Other,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Meeting,
        ContentType::Planning,
        ContentType::Finance,
        ContentType::Transparency,
        ContentType::Service,
        ContentType::Consultation,
        ContentType::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Meeting => "meeting",
            ContentType::Planning => "planning",
            ContentType::Finance => "finance",
            ContentType::Transparency => "transparency",
            ContentType::Service => "service",
            ContentType::Consultation => "consultation",
            ContentType::Document => "document",
            ContentType::Other => "other",
        }
    }
}

/// How much machine-readable structure a page carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StructureLevel {
    Structured,
    SemiStructured,
    #[default]
    Unstructured,
}

impl StructureLevel {
    /// Bonus applied by the dynamic priority formula.
    pub fn priority_bonus(&self) -> f64 {
        match self {
            StructureLevel::Structured => 2.0,
            StructureLevel::SemiStructured => 1.0,
            StructureLevel::Unstructured => 0.0,
        }
    }
}

/// Estimated rate at which a page changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangeFrequency {
    Always,
    Hourly,
    Daily,
    Weekly,
    #[default]
    Monthly,
    Yearly,
    Never,
}

impl ChangeFrequency {
    /// Content that practically never changes.
    pub fn is_static(&self) -> bool {
        matches!(self, ChangeFrequency::Yearly | ChangeFrequency::Never)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Low,
    Medium,
    High,
}

/// Counts of extractable items found on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractableData {
    pub tables: usize,
    pub lists: usize,
    pub forms: usize,
    pub links: usize,
    pub dates: usize,
    pub amounts: usize,
    pub emails: usize,
    pub phones: usize,
    pub structured_blocks: usize,
}

impl ExtractableData {
    pub fn total(&self) -> usize {
        self.tables
            + self.lists
            + self.forms
            + self.links
            + self.dates
            + self.amounts
            + self.emails
            + self.phones
            + self.structured_blocks
    }
}

/// Result of analyzing one fetch of a page.
///
/// Computed once per fetch and attached to the queue item unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub content_type: ContentType,
    /// 1..=10
    pub importance: u8,
    /// 1..=10
    pub freshness: u8,
    pub structure: StructureLevel,
    pub extractable_data: ExtractableData,
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
    pub complexity: Complexity,
    pub change_frequency: ChangeFrequency,
    /// 0.0..=1.0
    pub confidence: f64,
    pub content_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_path() {
        assert_eq!(
            UrlCategory::from_path("/planning-applications/24-0001"),
            UrlCategory::Planning
        );
        assert_eq!(UrlCategory::from_path("/council/meetings"), UrlCategory::Meeting);
        assert_eq!(UrlCategory::from_path("/about-us"), UrlCategory::General);
        assert_eq!(UrlCategory::from_path("/files/report.PDF"), UrlCategory::Document);
    }

    #[test]
    fn extractable_total_sums_every_count() {
        let data = ExtractableData {
            tables: 1,
            lists: 2,
            links: 3,
            ..Default::default()
        };
        assert_eq!(data.total(), 6);
    }
}
