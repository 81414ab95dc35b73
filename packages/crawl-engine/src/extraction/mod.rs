//! Content extraction: format dispatch, rule-based entities, structured data,
//! relationships and validation.
//!
//! ```text
//! fetched content
//!   └─► ContentFormat::detect ─► process ─► ProcessedContent
//!         ├─► infer_entity_kinds ─► apply_rules ─► validate_entity ─► ExtractedEntity
//!         ├─► mine_structured_data ─► StructuredDataPoint
//!         └─► infer_relationships ─► EntityRelationship
//! ```
//!
//! Extraction never fails as a whole: format, rule and validation problems
//! are reported as [`ExtractionIssue`]s on the result.

pub mod analyzer;
pub mod dates;
pub mod formats;
pub mod inference;
pub mod relationships;
pub mod rules;
pub mod structured;
pub mod validation;

use chrono::{NaiveDate, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;
use uuid::Uuid;

pub use analyzer::{analyze_content, analyze_content_at};
pub use formats::{ContentFormat, ProcessedContent};
pub use inference::infer_entity_kinds;
pub use relationships::infer_relationships;
pub use rules::{apply_rules, rules_for, total_weight, FieldRule, RuleMatch};
pub use structured::mine_structured_data;
pub use validation::validate_entity;

use crate::similarity::sha256_hex;
use crate::types::{
    EntityKind, EntityRelationship, EntitySource, ExtractedEntity, StructuredDataPoint,
};

/// Method tag recorded on every rule-built entity.
pub const EXTRACTION_METHOD: &str = "rules";

/// Bonus per structured data point in the quality score.
const STRUCTURED_POINT_BONUS: f64 = 0.01;
const MAX_STRUCTURED_BONUS: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStage {
    Format,
    Rules,
    Validation,
}

/// A non-fatal problem met during extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionIssue {
    pub stage: IssueStage,
    pub entity_kind: Option<EntityKind>,
    pub message: String,
}

impl ExtractionIssue {
    fn new(stage: IssueStage, entity_kind: Option<EntityKind>, message: impl Into<String>) -> Self {
        Self {
            stage,
            entity_kind,
            message: message.into(),
        }
    }
}

/// Everything extracted from one fetched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    pub format: ContentFormat,
    pub content_hash: String,
    pub inferred_kinds: Vec<EntityKind>,
    pub entities: Vec<ExtractedEntity>,
    pub structured_data: Vec<StructuredDataPoint>,
    pub relationships: Vec<EntityRelationship>,
    /// 0.0..=1.0
    pub quality_score: f64,
    pub issues: Vec<ExtractionIssue>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Upper bound on structured points kept per document.
    pub max_structured_points: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_structured_points: 500,
        }
    }
}

/// Turns fetched content into entities and structured data.
///
/// Extraction is synchronous and CPU bound; parsed documents never leave the
/// call, so the extractor can be shared freely across tasks.
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor {
    config: ExtractorConfig,
}

impl ContentExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, url: &str, content: &str, content_type: &str) -> ExtractionResult {
        self.extract_at(url, content, content_type, Utc::now().date_naive())
    }

    /// [`extract`](Self::extract) with an explicit "today" for date validation.
    pub fn extract_at(
        &self,
        url: &str,
        content: &str,
        content_type: &str,
        today: NaiveDate,
    ) -> ExtractionResult {
        let format = ContentFormat::detect(content_type, url, content);
        let content_hash = sha256_hex(content);
        let mut result = ExtractionResult {
            url: url.to_string(),
            format,
            content_hash: content_hash.clone(),
            inferred_kinds: Vec::new(),
            entities: Vec::new(),
            structured_data: Vec::new(),
            relationships: Vec::new(),
            quality_score: 0.0,
            issues: Vec::new(),
            metadata: Map::new(),
        };

        let processed = match formats::process(format, content) {
            Ok(processed) => processed,
            Err(e) => {
                tracing::debug!(url, format = format.as_str(), error = %e, "Content processing failed");
                result
                    .issues
                    .push(ExtractionIssue::new(IssueStage::Format, None, e.to_string()));
                return result;
            }
        };
        if format.is_stub() {
            result.issues.push(ExtractionIssue::new(
                IssueStage::Format,
                None,
                format!("{} content handled by placeholder processor", format.as_str()),
            ));
        }

        let document = processed.markup.as_deref().map(Html::parse_document);
        let base_url = Url::parse(url).ok();
        let extracted_at = Utc::now();

        result.inferred_kinds = infer_entity_kinds(url, &processed.text_content);
        for kind in &result.inferred_kinds {
            match apply_rules(*kind, document.as_ref(), &processed.text_content, base_url.as_ref()) {
                Ok(matched) => {
                    let validation = validate_entity(*kind, &matched.data, today);
                    for issue in &validation.issues {
                        result.issues.push(ExtractionIssue::new(
                            IssueStage::Validation,
                            Some(*kind),
                            issue.message.clone(),
                        ));
                    }
                    result.entities.push(ExtractedEntity {
                        id: Uuid::now_v7(),
                        kind: *kind,
                        title: entity_title(*kind, &matched.data),
                        data: matched.data,
                        source: EntitySource {
                            url: url.to_string(),
                            content_hash: content_hash.clone(),
                            extraction_method: EXTRACTION_METHOD.to_string(),
                            extracted_at,
                        },
                        confidence: matched.confidence,
                        validation,
                        superseded_by: None,
                    });
                }
                Err(missing) => {
                    result.issues.push(ExtractionIssue::new(
                        IssueStage::Rules,
                        Some(*kind),
                        format!("missing required fields: {}", missing.join(", ")),
                    ));
                }
            }
        }

        result.structured_data = mine_structured_data(
            &processed,
            document.as_ref(),
            self.config.max_structured_points,
        );
        result.relationships = infer_relationships(&result.entities);
        result.quality_score = quality_score(&result.entities, result.structured_data.len());
        result.metadata = processed.metadata;
        result
            .metadata
            .insert("word_count".to_string(), json!(processed.text_content.split_whitespace().count()));

        tracing::debug!(
            url,
            entities = result.entities.len(),
            structured = result.structured_data.len(),
            quality = result.quality_score,
            "Extraction complete"
        );
        result
    }
}

/// Title from a naming field, otherwise the kind's label and first value.
fn entity_title(kind: EntityKind, data: &Map<String, Value>) -> String {
    if let Some(title) = ["title", "name", "headline"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
    {
        return title.to_string();
    }
    let identifier = rules_for(kind)
        .iter()
        .filter(|r| r.required)
        .find_map(|r| data.get(r.name).and_then(Value::as_str));
    match identifier {
        Some(id) => format!("{} {}", kind.label(), id),
        None => kind.label().to_string(),
    }
}

/// Confidence-weighted mean validation score plus a capped structured bonus.
pub fn quality_score(entities: &[ExtractedEntity], structured_points: usize) -> f64 {
    let weight: f64 = entities.iter().map(|e| e.confidence).sum();
    let base = if weight > 0.0 {
        entities
            .iter()
            .map(|e| e.confidence * e.validation.score())
            .sum::<f64>()
            / weight
    } else {
        0.0
    };
    let bonus = (structured_points as f64 * STRUCTURED_POINT_BONUS).min(MAX_STRUCTURED_BONUS);
    (base + bonus).min(1.0)
}
