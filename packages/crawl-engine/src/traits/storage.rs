use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::dedup::{SimilarItem, StrategyKind};
use crate::error::StorageResult;
use crate::types::{CorpusRecord, RecordFilter};

/// Server-side similarity lookup requested by a dedup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimilarityQuery {
    /// Trigram similarity on titles.
    Trigram { threshold: f64 },
    /// Full-text keyword rank over title and description.
    FullText { threshold: f64 },
}

impl SimilarityQuery {
    pub fn threshold(&self) -> f64 {
        match self {
            SimilarityQuery::Trigram { threshold } | SimilarityQuery::FullText { threshold } => {
                *threshold
            }
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        match self {
            SimilarityQuery::Trigram { .. } => StrategyKind::TitleSimilarity,
            SimilarityQuery::FullText { .. } => StrategyKind::SemanticAnalysis,
        }
    }
}

/// Persistence for extracted records.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert or replace a record, returning its id.
    async fn upsert(&self, record: CorpusRecord) -> StorageResult<Uuid>;

    async fn get(&self, id: Uuid) -> StorageResult<Option<CorpusRecord>>;

    async fn query(&self, filter: &RecordFilter) -> StorageResult<Vec<CorpusRecord>>;

    /// Records similar to `candidate` (never the candidate itself), superseded
    /// records excluded.
    async fn find_similar(
        &self,
        candidate: &CorpusRecord,
        query: SimilarityQuery,
    ) -> StorageResult<Vec<SimilarItem>>;

    /// Mark `id` as superseded by `by`. Records are never deleted.
    async fn supersede(&self, id: Uuid, by: Uuid) -> StorageResult<()>;

    /// Overwrite the given metadata fields on a record.
    async fn update_metadata(&self, id: Uuid, fields: Map<String, Value>) -> StorageResult<()>;

    async fn count(&self) -> StorageResult<usize>;
}
