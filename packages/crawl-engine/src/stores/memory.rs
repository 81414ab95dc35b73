//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dedup::SimilarItem;
use crate::error::{StorageError, StorageResult};
use crate::similarity::{full_text_rank, trigram_similarity};
use crate::traits::{SimilarityQuery, Storage};
use crate::types::{CorpusRecord, RecordFilter};

/// In-memory record store.
///
/// Trigram and full-text lookups are computed in-process with the same
/// measures a database backend would apply. Data is lost on restart.
pub struct MemoryStorage {
    records: RwLock<BTreeMap<Uuid, CorpusRecord>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Every record, superseded ones included.
    pub async fn all(&self) -> Vec<CorpusRecord> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

fn searchable(record: &CorpusRecord) -> String {
    match &record.description {
        Some(description) => format!("{} {}", record.title, description),
        None => record.title.clone(),
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert(&self, record: CorpusRecord) -> StorageResult<Uuid> {
        let id = record.id;
        self.records.write().await.insert(id, record);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<CorpusRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn query(&self, filter: &RecordFilter) -> StorageResult<Vec<CorpusRecord>> {
        let records = self.records.read().await;
        let matching = records.values().filter(|r| filter.matches(r)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn find_similar(
        &self,
        candidate: &CorpusRecord,
        query: SimilarityQuery,
    ) -> StorageResult<Vec<SimilarItem>> {
        let records = self.records.read().await;
        let candidate_text = searchable(candidate);
        let mut items: Vec<SimilarItem> = records
            .values()
            .filter(|r| r.id != candidate.id && r.superseded_by.is_none() && r.kind == candidate.kind)
            .filter_map(|r| {
                let (similarity, fields): (f64, &[&str]) = match query {
                    SimilarityQuery::Trigram { .. } => {
                        (trigram_similarity(&candidate.title, &r.title), &["title"])
                    }
                    SimilarityQuery::FullText { .. } => (
                        full_text_rank(&candidate_text, &searchable(r)),
                        &["title", "description"],
                    ),
                };
                (similarity >= query.threshold())
                    .then(|| SimilarItem::new(r.id, similarity, query.strategy(), fields))
            })
            .collect();
        items.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(items)
    }

    async fn supersede(&self, id: Uuid, by: Uuid) -> StorageResult<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(&by) {
            return Err(StorageError::NotFound(by));
        }
        let record = records.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        record.superseded_by = Some(by);
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_metadata(&self, id: Uuid, fields: Map<String, Value>) -> StorageResult<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        record.metadata.extend(fields);
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn trigram_lookup_respects_threshold_and_kind() {
        let store = MemoryStorage::new();
        let meeting = CorpusRecord::new("council_meeting", "Planning Committee Meeting - 12 March 2025");
        let other_kind = CorpusRecord::new("event", "Planning Committee Meeting - 12 March 2025");
        let unrelated = CorpusRecord::new("council_meeting", "Licensing Sub-Committee");
        for r in [&meeting, &other_kind, &unrelated] {
            store.upsert(r.clone()).await.unwrap();
        }

        let candidate = CorpusRecord::new("council_meeting", "Planning Committee Meeting – 12th March 2025");
        let items = store
            .find_similar(&candidate, SimilarityQuery::Trigram { threshold: 0.75 })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, meeting.id);
        assert!(items[0].similarity >= 0.75);
    }

    #[tokio::test]
    async fn superseded_records_are_hidden() {
        let store = MemoryStorage::new();
        let keep = CorpusRecord::new("event", "Summer fair");
        let old = CorpusRecord::new("event", "Summer fair");
        store.upsert(keep.clone()).await.unwrap();
        store.upsert(old.clone()).await.unwrap();
        store.supersede(old.id, keep.id).await.unwrap();

        assert_eq!(store.query(&RecordFilter::new()).await.unwrap().len(), 1);
        let candidate = CorpusRecord::new("event", "Summer fair");
        let items = store
            .find_similar(&candidate, SimilarityQuery::FullText { threshold: 0.6 })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn metadata_updates_merge() {
        let store = MemoryStorage::new();
        let record = CorpusRecord::new("event", "Fair").with_metadata("venue", json!("Park"));
        store.upsert(record.clone()).await.unwrap();

        let mut fields = Map::new();
        fields.insert("capacity".into(), json!(200));
        store.update_metadata(record.id, fields).await.unwrap();
        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata["venue"], json!("Park"));
        assert_eq!(stored.metadata["capacity"], json!(200));

        assert!(matches!(
            store.update_metadata(Uuid::now_v7(), Map::new()).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
