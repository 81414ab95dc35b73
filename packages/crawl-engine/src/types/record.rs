use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::entity::{EntityKind, ExtractedEntity};
use crate::similarity::content_fingerprint;

/// Fields checked, in order, for an entity's primary date.
const DATE_FIELDS: [&str; 8] = [
    "date",
    "meeting_date",
    "decision_date",
    "received_date",
    "published_date",
    "start_date",
    "payment_date",
    "closing_date",
];

const LOCATION_FIELDS: [&str; 4] = ["address", "application_address", "location", "venue"];

/// The storage shape of a persisted item, as seen by deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub flags: BTreeMap<String, bool>,
    pub metadata: Map<String, Value>,
    /// 0.0..=1.0, usually the entity's validation score
    pub quality: f64,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub superseded_by: Option<Uuid>,
}

impl CorpusRecord {
    /// Build a record with a fresh id and a fingerprint over the normalized fields.
    pub fn new(kind: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut record = Self {
            id: Uuid::now_v7(),
            kind: kind.into(),
            title: title.into(),
            description: None,
            category: None,
            location: None,
            url: None,
            event_date: None,
            flags: BTreeMap::new(),
            metadata: Map::new(),
            quality: 0.5,
            content_hash: String::new(),
            created_at: now,
            updated_at: now,
            superseded_by: None,
        };
        record.refresh_hash();
        record
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self.refresh_hash();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self.refresh_hash();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self.refresh_hash();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_event_date(mut self, date: DateTime<Utc>) -> Self {
        self.event_date = Some(date);
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = quality.clamp(0.0, 1.0);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// Recompute the content fingerprint after a field change.
    pub fn refresh_hash(&mut self) {
        self.content_hash = content_fingerprint(
            &self.title,
            self.description.as_deref().unwrap_or(""),
            &self.kind,
            self.category.as_deref().unwrap_or(""),
            self.location.as_deref().unwrap_or(""),
        );
    }

    /// Host of the record's source URL, if any.
    pub fn domain(&self) -> Option<String> {
        self.url
            .as_deref()
            .and_then(|u| url::Url::parse(u).ok())
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Whether the metadata value under `key` is present and non-empty.
    pub fn has_field(&self, key: &str) -> bool {
        match self.metadata.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        }
    }

    /// Project an extracted entity into its storage shape.
    pub fn from_entity(entity: &ExtractedEntity) -> Self {
        let text = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| entity.field_str(n))
                .map(str::to_string)
        };

        let event_date = DATE_FIELDS
            .iter()
            .filter_map(|f| entity.field_str(f))
            .find_map(crate::extraction::dates::parse_date)
            .map(|d| d.and_time(NaiveTime::MIN).and_utc());

        let mut flags = BTreeMap::new();
        flags.insert("has_documents".to_string(), entity.data.contains_key("documents"));
        flags.insert("validated".to_string(), entity.validation.is_clean());
        flags.insert(
            "has_location".to_string(),
            LOCATION_FIELDS.iter().any(|f| entity.data.contains_key(*f)),
        );

        let now = Utc::now();
        let mut record = Self {
            id: entity.id,
            kind: entity.kind.as_str().to_string(),
            title: entity.title.clone(),
            description: text(&["description", "summary", "proposal"]),
            category: Some(
                text(&["category"]).unwrap_or_else(|| default_category(entity.kind).to_string()),
            ),
            location: text(&LOCATION_FIELDS),
            url: Some(entity.source.url.clone()),
            event_date,
            flags,
            metadata: entity.data.clone(),
            quality: entity.validation.score(),
            content_hash: String::new(),
            created_at: entity.source.extracted_at,
            updated_at: now,
            superseded_by: entity.superseded_by,
        };
        record.refresh_hash();
        record
    }
}

/// Hierarchical category used when an entity carries none.
pub fn default_category(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::CouncilMeeting => "governance/meetings",
        EntityKind::PlanningApplication => "planning/applications",
        EntityKind::BudgetItem => "finance/budget",
        EntityKind::SpendingRecord => "finance/spending",
        EntityKind::Contract => "finance/contracts",
        EntityKind::Councillor => "governance/people",
        EntityKind::Committee => "governance/committees",
        EntityKind::Decision => "governance/decisions",
        EntityKind::Consultation => "engagement/consultations",
        EntityKind::Service => "services",
        EntityKind::PolicyDocument => "documents/policy",
        EntityKind::NewsArticle => "news",
        EntityKind::Event => "events",
        EntityKind::Contact => "directory/contacts",
    }
}

/// Filter passed to [`Storage::query`](crate::traits::Storage::query).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub kind: Option<String>,
    pub domain: Option<String>,
    pub content_hash: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub ids: Option<Vec<Uuid>>,
    pub exclude_id: Option<Uuid>,
    pub include_superseded: bool,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn excluding(mut self, id: Uuid) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` passes every set criterion.
    pub fn matches(&self, record: &CorpusRecord) -> bool {
        if !self.include_superseded && record.superseded_by.is_some() {
            return false;
        }
        if self.exclude_id == Some(record.id) {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&record.id) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if &record.kind != kind {
                return false;
            }
        }
        if let Some(hash) = &self.content_hash {
            if &record.content_hash != hash {
                return false;
            }
        }
        if let Some(domain) = &self.domain {
            if record.domain().as_deref() != Some(domain.as_str()) {
                return false;
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = record.event_date else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| date > to) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_fields_share_a_hash() {
        let a = CorpusRecord::new("council_meeting", "Budget Meeting")
            .with_description("Annual budget")
            .with_location("Town Hall");
        let b = CorpusRecord::new("council_meeting", "budget meeting!")
            .with_description("Annual  budget")
            .with_location("town hall");
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn filter_skips_superseded_records() {
        let mut record = CorpusRecord::new("event", "Fair");
        assert!(RecordFilter::new().matches(&record));
        record.superseded_by = Some(Uuid::now_v7());
        assert!(!RecordFilter::new().matches(&record));
    }

    #[test]
    fn filter_by_domain() {
        let record = CorpusRecord::new("event", "Fair").with_url("https://council.gov.uk/events/1");
        assert!(RecordFilter::new().domain("council.gov.uk").matches(&record));
        assert!(!RecordFilter::new().domain("other.gov.uk").matches(&record));
    }
}
