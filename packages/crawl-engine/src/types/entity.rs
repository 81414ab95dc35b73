use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Kinds of civic entity the extractor knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CouncilMeeting,
    PlanningApplication,
    BudgetItem,
    SpendingRecord,
    Contract,
    Councillor,
    Committee,
    Decision,
    Consultation,
    Service,
    PolicyDocument,
    NewsArticle,
    Event,
    Contact,
}

impl EntityKind {
    pub const ALL: [EntityKind; 14] = [
        EntityKind::CouncilMeeting,
        EntityKind::PlanningApplication,
        EntityKind::BudgetItem,
        EntityKind::SpendingRecord,
        EntityKind::Contract,
        EntityKind::Councillor,
        EntityKind::Committee,
        EntityKind::Decision,
        EntityKind::Consultation,
        EntityKind::Service,
        EntityKind::PolicyDocument,
        EntityKind::NewsArticle,
        EntityKind::Event,
        EntityKind::Contact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::CouncilMeeting => "council_meeting",
            EntityKind::PlanningApplication => "planning_application",
            EntityKind::BudgetItem => "budget_item",
            EntityKind::SpendingRecord => "spending_record",
            EntityKind::Contract => "contract",
            EntityKind::Councillor => "councillor",
            EntityKind::Committee => "committee",
            EntityKind::Decision => "decision",
            EntityKind::Consultation => "consultation",
            EntityKind::Service => "service",
            EntityKind::PolicyDocument => "policy_document",
            EntityKind::NewsArticle => "news_article",
            EntityKind::Event => "event",
            EntityKind::Contact => "contact",
        }
    }

    /// Human readable label used when an entity has no title field.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::CouncilMeeting => "Council meeting",
            EntityKind::PlanningApplication => "Planning application",
            EntityKind::BudgetItem => "Budget item",
            EntityKind::SpendingRecord => "Spending record",
            EntityKind::Contract => "Contract",
            EntityKind::Councillor => "Councillor",
            EntityKind::Committee => "Committee",
            EntityKind::Decision => "Decision",
            EntityKind::Consultation => "Consultation",
            EntityKind::Service => "Service",
            EntityKind::PolicyDocument => "Policy document",
            EntityKind::NewsArticle => "News article",
            EntityKind::Event => "Event",
            EntityKind::Contact => "Contact",
        }
    }

    /// Kinds whose dates legitimately lie in the future.
    pub fn allows_future_dates(&self) -> bool {
        matches!(
            self,
            EntityKind::CouncilMeeting
                | EntityKind::Consultation
                | EntityKind::Event
                | EntityKind::Contract
                | EntityKind::BudgetItem
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// Where an extracted entity came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySource {
    pub url: String,
    pub content_hash: String,
    pub extraction_method: String,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    FutureDate,
    MalformedDate,
    MalformedEmail,
    MalformedPhone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub kind: IssueKind,
    pub message: String,
}

/// Validation scores attached to an entity before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityValidation {
    pub completeness: f64,
    pub consistency: f64,
    pub accuracy: f64,
    pub issues: Vec<ValidationIssue>,
}

impl EntityValidation {
    /// Mean of the three component scores.
    pub fn score(&self) -> f64 {
        (self.completeness + self.consistency + self.accuracy) / 3.0
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Default for EntityValidation {
    fn default() -> Self {
        Self {
            completeness: 1.0,
            consistency: 1.0,
            accuracy: 1.0,
            issues: Vec::new(),
        }
    }
}

/// An entity materialized from a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub title: String,
    pub data: Map<String, Value>,
    pub source: EntitySource,
    pub confidence: f64,
    pub validation: EntityValidation,
    /// Set when a merge made another record canonical.
    pub superseded_by: Option<Uuid>,
}

impl ExtractedEntity {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

/// Provenance of a structured data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Html,
    JsonLd,
    Microdata,
    Table,
    Form,
    Derived,
}

impl DataSource {
    /// Fixed confidence per provenance kind.
    pub fn confidence(&self) -> f64 {
        match self {
            DataSource::JsonLd => 0.9,
            DataSource::Microdata => 0.8,
            DataSource::Table => 0.7,
            DataSource::Form => 0.6,
            DataSource::Html => 0.5,
            DataSource::Derived => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Number,
    Boolean,
    Date,
    Url,
    Object,
    List,
}

impl DataType {
    /// Infer a data type from a JSON value.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => DataType::Boolean,
            Value::Number(_) => DataType::Number,
            Value::Array(_) => DataType::List,
            Value::Object(_) => DataType::Object,
            Value::Null => DataType::Text,
            Value::String(s) => {
                if s.starts_with("http://") || s.starts_with("https://") {
                    DataType::Url
                } else if crate::extraction::dates::parse_date(s).is_some() {
                    DataType::Date
                } else if s.trim().parse::<f64>().is_ok() {
                    DataType::Number
                } else {
                    DataType::Text
                }
            }
        }
    }
}

/// A key/value fact harvested independently of entity rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredDataPoint {
    pub key: String,
    pub value: Value,
    pub data_type: DataType,
    pub source: DataSource,
    pub confidence: f64,
    /// Location hint such as `table[0] row 2`.
    pub context: Option<String>,
}

impl StructuredDataPoint {
    pub fn new(key: impl Into<String>, value: Value, source: DataSource) -> Self {
        let data_type = DataType::infer(&value);
        Self {
            key: key.into(),
            value,
            data_type,
            source,
            confidence: source.confidence(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    References,
    RelatedTo,
}

impl RelationshipType {
    pub fn confidence(&self) -> f64 {
        match self {
            RelationshipType::References => 0.7,
            RelationshipType::RelatedTo => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relationship_type: RelationshipType,
    pub confidence: f64,
    pub evidence: String,
}
