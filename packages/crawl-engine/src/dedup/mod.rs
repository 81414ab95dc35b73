//! Duplicate detection across the persisted corpus.
//!
//! Each strategy produces [`SimilarItem`] hits independently; hits are
//! consolidated per record id, classified, and turned into recommendations
//! against a selected primary record. Records are never deleted: merging
//! supersedes the duplicates.

pub mod bulk;
pub mod merge;
pub mod strategies;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub use bulk::{BulkOptions, BulkSessionReport, ReviewItem};
pub use merge::{MergeOutcome, MergeStrategy};
pub use strategies::{FeatureScores, StrategyKind};

use crate::error::{DedupError, DedupResult};
use crate::traits::{SimilarityQuery, Storage};
use crate::types::{CorpusRecord, RecordFilter};

/// Confidence at which a record counts as a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.7;
pub const EXACT_THRESHOLD: f64 = 0.95;
pub const NEAR_THRESHOLD: f64 = 0.85;
pub const KEEP_PRIMARY_THRESHOLD: f64 = 0.5;

/// Floating point slack when comparing similarities for ties.
const TIE_EPSILON: f64 = 1e-9;

/// A corpus record found similar to the candidate by one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItem {
    pub id: Uuid,
    /// 0.0..=1.0
    pub similarity: f64,
    pub matching_strategy: StrategyKind,
    pub matched_fields: Vec<String>,
}

impl SimilarItem {
    pub fn new(id: Uuid, similarity: f64, strategy: StrategyKind, fields: &[&str]) -> Self {
        Self {
            id,
            similarity: strategy.capped(similarity),
            matching_strategy: strategy,
            matched_fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateType {
    #[serde(rename = "exact_duplicate")]
    Exact,
    #[serde(rename = "near_duplicate")]
    Near,
    #[serde(rename = "semantic_duplicate")]
    Semantic,
    #[serde(rename = "structural_duplicate")]
    Structural,
    #[serde(rename = "temporal_duplicate")]
    Temporal,
    #[serde(rename = "partial_duplicate")]
    Partial,
}

impl DuplicateType {
    pub fn classify(similarity: f64, strategy: StrategyKind) -> Self {
        if similarity >= EXACT_THRESHOLD {
            return DuplicateType::Exact;
        }
        if similarity >= NEAR_THRESHOLD {
            return DuplicateType::Near;
        }
        match strategy {
            StrategyKind::SemanticAnalysis => DuplicateType::Semantic,
            StrategyKind::StructuralSimilarity => DuplicateType::Structural,
            StrategyKind::TemporalProximity => DuplicateType::Temporal,
            _ => DuplicateType::Partial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupAction {
    MarkDuplicate,
    Merge,
    NeedsReview,
    KeepPrimary,
    Ignore,
}

impl DedupAction {
    pub fn for_similarity(similarity: f64) -> Self {
        if similarity >= EXACT_THRESHOLD {
            DedupAction::MarkDuplicate
        } else if similarity >= NEAR_THRESHOLD {
            DedupAction::Merge
        } else if similarity >= DUPLICATE_THRESHOLD {
            DedupAction::NeedsReview
        } else if similarity >= KEEP_PRIMARY_THRESHOLD {
            DedupAction::KeepPrimary
        } else {
            DedupAction::Ignore
        }
    }
}

/// What to do about one similar record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: DedupAction,
    pub target_id: Uuid,
    pub similarity: f64,
    pub merge_strategy: Option<MergeStrategy>,
    /// Fields the candidate has that the target lacks (merge only).
    pub fields_to_merge: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDetectionResult {
    pub record_id: Uuid,
    pub is_duplicate: bool,
    pub confidence: f64,
    pub duplicate_type: Option<DuplicateType>,
    /// Consolidated, most similar first.
    pub similar_items: Vec<SimilarItem>,
    pub primary_id: Option<Uuid>,
    /// The primary's recommendation first.
    pub recommendations: Vec<Recommendation>,
    /// Raw hits per strategy before consolidation.
    pub strategy_hits: BTreeMap<StrategyKind, usize>,
}

impl DuplicateDetectionResult {
    fn unique(record_id: Uuid) -> Self {
        Self {
            record_id,
            is_duplicate: false,
            confidence: 0.0,
            duplicate_type: None,
            similar_items: Vec::new(),
            primary_id: None,
            recommendations: Vec::new(),
            strategy_hits: BTreeMap::new(),
        }
    }

    /// Action recommended against the primary record.
    pub fn recommended_action(&self) -> DedupAction {
        self.recommendations
            .first()
            .map(|r| r.action)
            .unwrap_or(DedupAction::Ignore)
    }

    pub fn primary_recommendation(&self) -> Option<&Recommendation> {
        self.recommendations.first()
    }

    /// Similarity of the selected primary, which may be below `confidence`.
    pub fn primary_similarity(&self) -> Option<f64> {
        let primary = self.primary_id?;
        self.similar_items
            .iter()
            .find(|item| item.id == primary)
            .map(|item| item.similarity)
    }
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Same-kind records scored by the in-process strategies.
    pub candidate_limit: usize,
    /// Bulk auto-resolution requires at least this confidence.
    pub auto_resolve_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 500,
            auto_resolve_threshold: 0.9,
        }
    }
}

impl DedupConfig {
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    pub fn with_auto_resolve_threshold(mut self, threshold: f64) -> Self {
        self.auto_resolve_threshold = threshold;
        self
    }
}

/// Keep the best hit per id; exact ties merge their matched fields.
fn consolidate(hits: Vec<SimilarItem>) -> Vec<SimilarItem> {
    let mut best: HashMap<Uuid, SimilarItem> = HashMap::new();
    for hit in hits {
        match best.get_mut(&hit.id) {
            None => {
                best.insert(hit.id, hit);
            }
            Some(existing) if (hit.similarity - existing.similarity).abs() < TIE_EPSILON => {
                for field in hit.matched_fields {
                    if !existing.matched_fields.contains(&field) {
                        existing.matched_fields.push(field);
                    }
                }
            }
            Some(existing) if hit.similarity > existing.similarity => *existing = hit,
            Some(_) => {}
        }
    }
    let mut items: Vec<SimilarItem> = best.into_values().collect();
    items.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.id.cmp(&b.id))
    });
    items
}

/// Detects, merges and reviews duplicate records.
pub struct DeduplicationEngine {
    storage: Arc<dyn Storage>,
    config: DedupConfig,
    review_queue: Mutex<Vec<ReviewItem>>,
}

impl DeduplicationEngine {
    pub fn new(storage: Arc<dyn Storage>, config: DedupConfig) -> Self {
        Self {
            storage,
            config,
            review_queue: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Run every strategy for `record` against the stored corpus.
    ///
    /// The record itself is excluded, so it may already be persisted.
    pub async fn detect_duplicates(
        &self,
        record: &CorpusRecord,
        strict: bool,
    ) -> DedupResult<DuplicateDetectionResult> {
        let hash_filter = RecordFilter::new()
            .content_hash(record.content_hash.clone())
            .excluding(record.id);
        let pool_filter = RecordFilter::new()
            .kind(record.kind.clone())
            .excluding(record.id)
            .limit(self.config.candidate_limit);
        let title_query = SimilarityQuery::Trigram {
            threshold: StrategyKind::TitleSimilarity.effective_threshold(strict),
        };
        let semantic_query = SimilarityQuery::FullText {
            threshold: StrategyKind::SemanticAnalysis.effective_threshold(strict),
        };

        let (exact, titles, semantic, pool) = tokio::try_join!(
            self.storage.query(&hash_filter),
            self.storage.find_similar(record, title_query),
            self.storage.find_similar(record, semantic_query),
            self.storage.query(&pool_filter),
        )?;

        let mut hits: Vec<SimilarItem> = exact
            .iter()
            .map(|r| SimilarItem::new(r.id, 1.0, StrategyKind::ContentHash, &["content_hash"]))
            .collect();
        hits.extend(titles);
        hits.extend(semantic);

        for candidate in &pool {
            let scores = FeatureScores::between(record, candidate);
            let local = [
                (StrategyKind::UrlPattern, scores.url, "url"),
                (StrategyKind::TemporalProximity, scores.temporal, "event_date"),
                (
                    StrategyKind::StructuralSimilarity,
                    strategies::structural_similarity(record, candidate),
                    "structure",
                ),
            ];
            for (strategy, similarity, field) in local {
                if similarity >= strategy.effective_threshold(strict) {
                    hits.push(SimilarItem::new(candidate.id, similarity, strategy, &[field]));
                }
            }
            let combined = scores.combined();
            if combined >= StrategyKind::CombinedFeatures.effective_threshold(strict) {
                hits.push(SimilarItem {
                    id: candidate.id,
                    similarity: combined,
                    matching_strategy: StrategyKind::CombinedFeatures,
                    matched_fields: scores.matched_fields(),
                });
            }
        }

        let mut strategy_hits = BTreeMap::new();
        for hit in &hits {
            *strategy_hits.entry(hit.matching_strategy).or_insert(0) += 1;
        }

        let similar_items = consolidate(hits);
        let Some(top) = similar_items.first() else {
            tracing::debug!(record_id = %record.id, "No duplicates found");
            return Ok(DuplicateDetectionResult {
                strategy_hits,
                ..DuplicateDetectionResult::unique(record.id)
            });
        };
        let confidence = top.similarity;
        let duplicate_type = DuplicateType::classify(top.similarity, top.matching_strategy);

        let mut known: HashMap<Uuid, CorpusRecord> = pool
            .into_iter()
            .chain(exact)
            .map(|r| (r.id, r))
            .collect();
        for item in &similar_items {
            if !known.contains_key(&item.id) {
                if let Some(found) = self.storage.get(item.id).await? {
                    known.insert(found.id, found);
                }
            }
        }

        // Only records in the duplicate band compete for primary when any exist
        let primary_floor = if confidence >= DUPLICATE_THRESHOLD {
            DUPLICATE_THRESHOLD
        } else {
            0.0
        };
        let now = Utc::now();
        let primary_id = similar_items
            .iter()
            .filter(|item| item.similarity >= primary_floor)
            .filter_map(|item| known.get(&item.id).map(|r| (item, r)))
            .max_by(|(a, ra), (b, rb)| {
                merge::primary_score(ra, a.similarity, now)
                    .total_cmp(&merge::primary_score(rb, b.similarity, now))
            })
            .map(|(item, _)| item.id);

        let mut recommendations: Vec<Recommendation> = similar_items
            .iter()
            .filter_map(|item| {
                let target = known.get(&item.id)?;
                let action = DedupAction::for_similarity(item.similarity);
                let (merge_strategy, fields_to_merge) = match action {
                    DedupAction::Merge => (
                        Some(MergeStrategy::MergeComplementary),
                        merge::complementary_fields(target, record),
                    ),
                    _ => (None, Vec::new()),
                };
                Some(Recommendation {
                    action,
                    target_id: item.id,
                    similarity: item.similarity,
                    merge_strategy,
                    fields_to_merge,
                    reason: format!(
                        "{} similarity {:.2}",
                        item.matching_strategy.as_str(),
                        item.similarity
                    ),
                })
            })
            .collect();
        if let Some(primary) = primary_id {
            if let Some(pos) = recommendations.iter().position(|r| r.target_id == primary) {
                let first = recommendations.remove(pos);
                recommendations.insert(0, first);
            }
        }

        let result = DuplicateDetectionResult {
            record_id: record.id,
            is_duplicate: confidence >= DUPLICATE_THRESHOLD,
            confidence,
            duplicate_type: Some(duplicate_type),
            similar_items,
            primary_id,
            recommendations,
            strategy_hits,
        };
        tracing::debug!(
            record_id = %record.id,
            confidence = result.confidence,
            is_duplicate = result.is_duplicate,
            action = ?result.recommended_action(),
            "Duplicate detection complete"
        );
        Ok(result)
    }

    /// Merge `duplicates` into `primary` and supersede them.
    pub async fn merge_duplicates(
        &self,
        primary: Uuid,
        duplicates: &[Uuid],
        strategy: MergeStrategy,
    ) -> DedupResult<MergeOutcome> {
        if duplicates.contains(&primary) {
            return Err(DedupError::SelfMerge(primary));
        }
        let mut primary_record = self
            .storage
            .get(primary)
            .await?
            .ok_or(DedupError::RecordNotFound(primary))?;

        let mut merged_fields: Vec<String> = Vec::new();
        for id in duplicates {
            let duplicate = self
                .storage
                .get(*id)
                .await?
                .ok_or(DedupError::RecordNotFound(*id))?;
            for field in merge::apply_merge(&mut primary_record, &duplicate, strategy) {
                if !merged_fields.contains(&field) {
                    merged_fields.push(field);
                }
            }
        }

        if !merged_fields.is_empty() {
            self.storage.upsert(primary_record).await?;
        }
        for id in duplicates {
            self.storage.supersede(*id, primary).await?;
        }

        tracing::info!(
            primary_id = %primary,
            superseded = duplicates.len(),
            merged_fields = merged_fields.len(),
            strategy = ?strategy,
            "Merged duplicates"
        );
        Ok(MergeOutcome {
            primary_id: primary,
            superseded: duplicates.to_vec(),
            merged_fields,
        })
    }

    /// Queue a detection result for manual review.
    pub async fn queue_for_review(&self, result: &DuplicateDetectionResult) {
        let mut queue = self.review_queue.lock().await;
        queue.retain(|item| item.record_id != result.record_id);
        queue.push(ReviewItem::from_result(result));
    }

    pub async fn review_queue(&self) -> Vec<ReviewItem> {
        self.review_queue.lock().await.clone()
    }

    /// Resolve a queued review. Approval merges the record into its primary.
    pub async fn resolve_review(
        &self,
        record_id: Uuid,
        approve: bool,
        strategy: MergeStrategy,
    ) -> DedupResult<Option<MergeOutcome>> {
        let item = {
            let mut queue = self.review_queue.lock().await;
            let pos = queue
                .iter()
                .position(|i| i.record_id == record_id)
                .ok_or(DedupError::RecordNotFound(record_id))?;
            queue.remove(pos)
        };
        match (approve, item.primary_id) {
            (true, Some(primary)) => Ok(Some(
                self.merge_duplicates(primary, &[record_id], strategy).await?,
            )),
            _ => {
                tracing::debug!(record_id = %record_id, "Review dismissed");
                Ok(None)
            }
        }
    }
}
