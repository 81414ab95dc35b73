//! Primary selection and field merging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CorpusRecord;

pub const PRIMARY_SIMILARITY_WEIGHT: f64 = 0.4;
pub const PRIMARY_QUALITY_WEIGHT: f64 = 0.3;
pub const PRIMARY_RECENCY_WEIGHT: f64 = 0.2;
pub const PRIMARY_TITLE_WEIGHT: f64 = 0.1;

/// Records older than this contribute no recency.
const RECENCY_HORIZON_DAYS: f64 = 365.0;

/// Title length treated as complete.
const COMPLETE_TITLE_CHARS: f64 = 60.0;

/// Record fields a merge may fill, besides metadata keys.
const MERGEABLE_FIELDS: [&str; 4] = ["description", "category", "location", "event_date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Keep the primary untouched; duplicates are only superseded.
    KeepPrimary,
    /// Fill fields absent on the primary from the duplicates.
    #[default]
    MergeComplementary,
    /// Take every present field from whichever record was updated last.
    PreferNewest,
}

/// Outcome of merging duplicates into a primary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub primary_id: uuid::Uuid,
    pub superseded: Vec<uuid::Uuid>,
    pub merged_fields: Vec<String>,
}

pub fn recency(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - updated_at).num_seconds().max(0) as f64 / 86_400.0;
    (1.0 - age_days / RECENCY_HORIZON_DAYS).max(0.0)
}

pub fn title_completeness(title: &str) -> f64 {
    (title.trim().chars().count() as f64 / COMPLETE_TITLE_CHARS).min(1.0)
}

/// Score used to pick the record the others merge into.
pub fn primary_score(record: &CorpusRecord, similarity: f64, now: DateTime<Utc>) -> f64 {
    similarity * PRIMARY_SIMILARITY_WEIGHT
        + record.quality * PRIMARY_QUALITY_WEIGHT
        + recency(record.updated_at, now) * PRIMARY_RECENCY_WEIGHT
        + title_completeness(&record.title) * PRIMARY_TITLE_WEIGHT
}

fn has_record_field(record: &CorpusRecord, field: &str) -> bool {
    match field {
        "description" => record.description.as_deref().is_some_and(|s| !s.trim().is_empty()),
        "category" => record.category.is_some(),
        "location" => record.location.as_deref().is_some_and(|s| !s.trim().is_empty()),
        "event_date" => record.event_date.is_some(),
        _ => record.has_field(field),
    }
}

/// Fields present on `incoming` and absent on `primary`.
pub fn complementary_fields(primary: &CorpusRecord, incoming: &CorpusRecord) -> Vec<String> {
    let mut fields: Vec<String> = MERGEABLE_FIELDS
        .iter()
        .filter(|f| has_record_field(incoming, f) && !has_record_field(primary, f))
        .map(|f| f.to_string())
        .collect();
    fields.extend(
        incoming
            .metadata
            .keys()
            .filter(|k| incoming.has_field(k) && !primary.has_field(k))
            .cloned(),
    );
    fields
}

fn copy_field(primary: &mut CorpusRecord, source: &CorpusRecord, field: &str) {
    match field {
        "description" => primary.description = source.description.clone(),
        "category" => primary.category = source.category.clone(),
        "location" => primary.location = source.location.clone(),
        "event_date" => primary.event_date = source.event_date,
        key => {
            if let Some(value) = source.metadata.get(key) {
                primary.metadata.insert(key.to_string(), value.clone());
            }
        }
    }
}

/// Apply `duplicate` onto `primary` under `strategy`, returning changed fields.
pub fn apply_merge(
    primary: &mut CorpusRecord,
    duplicate: &CorpusRecord,
    strategy: MergeStrategy,
) -> Vec<String> {
    let fields: Vec<String> = match strategy {
        MergeStrategy::KeepPrimary => Vec::new(),
        MergeStrategy::MergeComplementary => complementary_fields(primary, duplicate),
        MergeStrategy::PreferNewest if duplicate.updated_at > primary.updated_at => {
            let mut fields: Vec<String> = MERGEABLE_FIELDS
                .iter()
                .filter(|f| has_record_field(duplicate, f))
                .map(|f| f.to_string())
                .collect();
            fields.extend(
                duplicate
                    .metadata
                    .keys()
                    .filter(|k| duplicate.has_field(k) && primary.metadata.get(*k) != duplicate.metadata.get(*k))
                    .cloned(),
            );
            fields
        }
        MergeStrategy::PreferNewest => complementary_fields(primary, duplicate),
    };

    for field in &fields {
        copy_field(primary, duplicate, field);
    }
    if !fields.is_empty() {
        primary.updated_at = Utc::now();
        primary.refresh_hash();
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn complementary_fields_only_fill_gaps() {
        let primary = CorpusRecord::new("council_meeting", "Planning Committee")
            .with_metadata("venue", json!("Town Hall"));
        let incoming = CorpusRecord::new("council_meeting", "Planning Committee")
            .with_description("Monthly meeting")
            .with_metadata("venue", json!("Civic Centre"))
            .with_metadata("agenda_items", json!(["Item 1"]));
        assert_eq!(
            complementary_fields(&primary, &incoming),
            vec!["description".to_string(), "agenda_items".to_string()]
        );
    }

    #[test]
    fn keep_primary_changes_nothing() {
        let mut primary = CorpusRecord::new("event", "Fair");
        let before = primary.clone();
        let duplicate = CorpusRecord::new("event", "Fair").with_description("Summer fair");
        assert!(apply_merge(&mut primary, &duplicate, MergeStrategy::KeepPrimary).is_empty());
        assert_eq!(primary, before);
    }

    #[test]
    fn prefer_newest_overwrites_from_newer_record() {
        let old = Utc::now() - Duration::days(30);
        let mut primary = CorpusRecord::new("event", "Fair")
            .with_location("Park")
            .with_created_at(old);
        let duplicate = CorpusRecord::new("event", "Fair").with_location("Market Square");
        let fields = apply_merge(&mut primary, &duplicate, MergeStrategy::PreferNewest);
        assert_eq!(fields, vec!["location".to_string()]);
        assert_eq!(primary.location.as_deref(), Some("Market Square"));
    }

    #[test]
    fn primary_score_prefers_quality_and_recency() {
        let now = Utc::now();
        let fresh = CorpusRecord::new("event", "Summer fair in the park").with_quality(0.9);
        let stale = CorpusRecord::new("event", "Fair")
            .with_quality(0.2)
            .with_created_at(now - Duration::days(400));
        assert!(primary_score(&fresh, 0.8, now) > primary_score(&stale, 0.8, now));
        assert_eq!(recency(now - Duration::days(400), now), 0.0);
        assert_eq!(title_completeness(&"x".repeat(90)), 1.0);
    }
}
