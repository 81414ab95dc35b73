//! Domain types shared across the engine's components.

pub mod content;
pub mod entity;
pub mod health;
pub mod ids;
pub mod record;

pub use content::{
    ChangeFrequency, Complexity, ContentAnalysis, ContentType, ExtractableData, Sentiment,
    StructureLevel, UrlCategory,
};
pub use entity::{
    DataSource, DataType, EntityKind, EntityRelationship, EntitySource, EntityValidation,
    ExtractedEntity, IssueKind, RelationshipType, StructuredDataPoint, ValidationIssue,
};
pub use health::{HealthStatus, Timeframe};
pub use ids::{AlertId, ExecutionId, RunId, SessionId, TaskId, TimingId};
pub use record::{default_category, CorpusRecord, RecordFilter};
