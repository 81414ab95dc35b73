//! Bulk deduplication sessions and the manual review queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{
    DeduplicationEngine, DuplicateDetectionResult, DuplicateType, MergeStrategy, StrategyKind,
};
use crate::error::DedupResult;

#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub batch_size: usize,
    /// Merge high-confidence duplicates without review.
    pub auto_resolve: bool,
    pub strict: bool,
    pub merge_strategy: MergeStrategy,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            auto_resolve: false,
            strict: false,
            merge_strategy: MergeStrategy::MergeComplementary,
        }
    }
}

impl BulkOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_auto_resolve(mut self, auto_resolve: bool) -> Self {
        self.auto_resolve = auto_resolve;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }
}

/// A duplicate awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub record_id: Uuid,
    pub primary_id: Option<Uuid>,
    pub confidence: f64,
    pub duplicate_type: Option<DuplicateType>,
    pub reason: Option<String>,
    pub queued_at: DateTime<Utc>,
}

impl ReviewItem {
    pub fn from_result(result: &DuplicateDetectionResult) -> Self {
        Self {
            record_id: result.record_id,
            primary_id: result.primary_id,
            confidence: result.confidence,
            duplicate_type: result.duplicate_type,
            reason: result.primary_recommendation().map(|r| r.reason.clone()),
            queued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkSessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub batches: usize,
    pub processed: usize,
    /// Missing or already superseded records.
    pub skipped: usize,
    pub duplicates_found: usize,
    pub auto_resolved: usize,
    pub queued_for_review: usize,
    pub errors: usize,
    pub strategy_counts: BTreeMap<StrategyKind, usize>,
}

impl BulkSessionReport {
    fn start() -> Self {
        Self {
            session_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: None,
            batches: 0,
            processed: 0,
            skipped: 0,
            duplicates_found: 0,
            auto_resolved: 0,
            queued_for_review: 0,
            errors: 0,
            strategy_counts: BTreeMap::new(),
        }
    }
}

impl DeduplicationEngine {
    /// Check every record in `ids` in fixed-size batches.
    ///
    /// Storage failures on a single record are counted and logged; the
    /// session continues with the next record.
    pub async fn process_bulk(&self, ids: &[Uuid], options: &BulkOptions) -> DedupResult<BulkSessionReport> {
        let mut report = BulkSessionReport::start();
        tracing::info!(
            session_id = %report.session_id,
            records = ids.len(),
            auto_resolve = options.auto_resolve,
            "Starting bulk deduplication"
        );

        for batch in ids.chunks(options.batch_size.max(1)) {
            report.batches += 1;
            for id in batch {
                if let Err(e) = self.process_one(*id, options, &mut report).await {
                    report.errors += 1;
                    tracing::warn!(record_id = %id, error = %e, "Bulk deduplication failed for record");
                }
            }
            tracing::debug!(
                session_id = %report.session_id,
                batch = report.batches,
                processed = report.processed,
                "Batch complete"
            );
            tokio::task::yield_now().await;
        }

        report.finished_at = Some(Utc::now());
        tracing::info!(
            session_id = %report.session_id,
            processed = report.processed,
            duplicates = report.duplicates_found,
            auto_resolved = report.auto_resolved,
            queued = report.queued_for_review,
            errors = report.errors,
            "Bulk deduplication complete"
        );
        Ok(report)
    }

    async fn process_one(
        &self,
        id: Uuid,
        options: &BulkOptions,
        report: &mut BulkSessionReport,
    ) -> DedupResult<()> {
        let Some(record) = self.storage.get(id).await? else {
            report.skipped += 1;
            return Ok(());
        };
        if record.superseded_by.is_some() {
            report.skipped += 1;
            return Ok(());
        }

        let result = self.detect_duplicates(&record, options.strict).await?;
        report.processed += 1;
        for (strategy, hits) in &result.strategy_hits {
            *report.strategy_counts.entry(*strategy).or_insert(0) += hits;
        }
        if !result.is_duplicate {
            return Ok(());
        }
        report.duplicates_found += 1;

        let primary_similarity = result.primary_similarity().unwrap_or(0.0);
        match result.primary_id {
            Some(primary)
                if options.auto_resolve
                    && primary_similarity >= self.config.auto_resolve_threshold =>
            {
                self.merge_duplicates(primary, &[record.id], options.merge_strategy)
                    .await?;
                report.auto_resolved += 1;
            }
            _ => {
                self.queue_for_review(&result).await;
                report.queued_for_review += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupConfig;
    use crate::stores::MemoryStorage;
    use crate::traits::Storage;
    use crate::types::CorpusRecord;
    use std::sync::Arc;

    async fn seeded() -> (Arc<MemoryStorage>, DeduplicationEngine, Vec<Uuid>) {
        let storage = Arc::new(MemoryStorage::new());
        let records = vec![
            CorpusRecord::new("event", "Summer fair").with_description("Victoria Park"),
            CorpusRecord::new("event", "summer fair").with_description("Victoria park"),
            CorpusRecord::new("consultation", "Library opening hours"),
        ];
        let mut ids = Vec::new();
        for record in records {
            ids.push(storage.upsert(record).await.unwrap());
        }
        let engine = DeduplicationEngine::new(storage.clone(), DedupConfig::default());
        (storage, engine, ids)
    }

    #[tokio::test]
    async fn auto_resolve_merges_exact_duplicates() {
        let (storage, engine, ids) = seeded().await;
        let options = BulkOptions::default().with_batch_size(2).with_auto_resolve(true);
        let report = engine.process_bulk(&ids, &options).await.unwrap();

        assert_eq!(report.batches, 2);
        assert_eq!(report.auto_resolved, 1);
        assert_eq!(report.duplicates_found, 1);
        assert_eq!(report.processed, 3);
        assert!(report.strategy_counts[&StrategyKind::ContentHash] >= 1);
        assert!(report.finished_at.is_some());
        assert!(engine.review_queue().await.is_empty());

        let superseded = storage.get(ids[0]).await.unwrap().unwrap();
        assert_eq!(superseded.superseded_by, Some(ids[1]));
    }

    #[tokio::test]
    async fn without_auto_resolve_duplicates_wait_for_review() {
        let (_, engine, ids) = seeded().await;
        let report = engine.process_bulk(&ids, &BulkOptions::default()).await.unwrap();

        assert_eq!(report.auto_resolved, 0);
        assert_eq!(report.duplicates_found, 2);
        assert_eq!(report.queued_for_review, 2);
        assert_eq!(engine.review_queue().await.len(), 2);
    }

    #[tokio::test]
    async fn auto_resolve_requires_a_confident_primary() {
        let storage = Arc::new(MemoryStorage::new());
        let stale_twin = CorpusRecord::new("event", "Summer fair")
            .with_quality(0.0)
            .with_created_at(Utc::now() - chrono::Duration::days(800));
        let polished = CorpusRecord::new("event", "Library opening hours consultation results")
            .with_description("Updated opening hours for every branch library")
            .with_quality(1.0);
        let candidate = CorpusRecord::new("event", "Summer fair");
        storage.upsert(stale_twin.clone()).await.unwrap();
        storage.upsert(polished.clone()).await.unwrap();
        storage.upsert(candidate.clone()).await.unwrap();
        let engine = DeduplicationEngine::new(storage.clone(), DedupConfig::default());

        let result = engine.detect_duplicates(&candidate, false).await.unwrap();
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.primary_id, Some(stale_twin.id));
        assert_eq!(result.primary_similarity(), Some(1.0));

        let options = BulkOptions::default().with_auto_resolve(true);
        let report = engine.process_bulk(&[candidate.id], &options).await.unwrap();
        assert_eq!(report.auto_resolved, 1);

        let stored = storage.get(candidate.id).await.unwrap().unwrap();
        assert_eq!(stored.superseded_by, Some(stale_twin.id));
        assert!(storage.get(polished.id).await.unwrap().unwrap().superseded_by.is_none());
    }

    #[tokio::test]
    async fn missing_records_are_skipped() {
        let (_, engine, _) = seeded().await;
        let report = engine
            .process_bulk(&[Uuid::now_v7()], &BulkOptions::default())
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 0);
    }
}
