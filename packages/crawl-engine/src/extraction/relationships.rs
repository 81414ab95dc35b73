use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

use super::dates::parse_date;
use crate::similarity::{keyword_set, normalize_text};
use crate::types::{EntityRelationship, ExtractedEntity, RelationshipType};

/// Dates closer than this relate two entities.
const RELATED_DATE_WINDOW_DAYS: i64 = 7;

/// Fields that identify an entity when mentioned elsewhere.
const IDENTIFIER_FIELDS: [&str; 4] = ["application_number", "contract_reference", "name", "title"];

fn primary_date(entity: &ExtractedEntity) -> Option<NaiveDate> {
    entity
        .data
        .iter()
        .filter(|(k, _)| k.contains("date"))
        .filter_map(|(_, v)| v.as_str())
        .find_map(parse_date)
}

fn searchable_text(entity: &ExtractedEntity) -> String {
    let mut parts = vec![entity.title.clone()];
    for value in entity.data.values() {
        match value {
            serde_json::Value::String(s) => parts.push(s.clone()),
            serde_json::Value::Array(items) => {
                parts.extend(items.iter().filter_map(|v| v.as_str()).map(str::to_string))
            }
            _ => {}
        }
    }
    normalize_text(&parts.join(" "))
}

/// The identifier of `target` mentioned in `haystack`, if any.
fn mentioned_identifier(target: &ExtractedEntity, haystack: &str) -> Option<String> {
    IDENTIFIER_FIELDS
        .iter()
        .filter_map(|f| target.field_str(f))
        .chain(std::iter::once(target.title.as_str()))
        .map(normalize_text)
        // Short or generic identifiers would match everywhere.
        .filter(|id| keyword_set(id).len() >= 2 || (id.len() >= 5 && id.chars().any(|c| c.is_ascii_digit())))
        .find(|id| haystack.contains(id.as_str()))
}

/// Relationships between entities extracted from the same content.
///
/// Identifier containment yields `references`, dates within a week yield
/// `related_to`. Pairs are undirected: the same pair and type is reported once
/// with the higher confidence.
pub fn infer_relationships(entities: &[ExtractedEntity]) -> Vec<EntityRelationship> {
    let mut found: HashMap<(Uuid, Uuid, RelationshipType), EntityRelationship> = HashMap::new();
    let mut keep = |rel: EntityRelationship| {
        let key = if rel.source_id <= rel.target_id {
            (rel.source_id, rel.target_id, rel.relationship_type)
        } else {
            (rel.target_id, rel.source_id, rel.relationship_type)
        };
        match found.get(&key) {
            Some(existing) if existing.confidence >= rel.confidence => {}
            _ => {
                found.insert(key, rel);
            }
        }
    };

    let texts: Vec<String> = entities.iter().map(searchable_text).collect();
    let dates: Vec<Option<NaiveDate>> = entities.iter().map(primary_date).collect();

    for (i, source) in entities.iter().enumerate() {
        for (j, target) in entities.iter().enumerate() {
            if i == j || source.id == target.id {
                continue;
            }

            // The source's own title is excluded so an entity does not
            // "reference" another just by sharing a heading.
            let own_title = normalize_text(&source.title);
            let haystack = texts[i].replacen(&own_title, " ", 1);
            if let Some(identifier) = mentioned_identifier(target, &haystack) {
                keep(EntityRelationship {
                    source_id: source.id,
                    target_id: target.id,
                    relationship_type: RelationshipType::References,
                    confidence: RelationshipType::References.confidence(),
                    evidence: format!("mentions \"{}\"", identifier),
                });
            }

            if i < j {
                if let (Some(a), Some(b)) = (dates[i], dates[j]) {
                    let gap = (a - b).num_days().abs();
                    if gap <= RELATED_DATE_WINDOW_DAYS {
                        keep(EntityRelationship {
                            source_id: source.id,
                            target_id: target.id,
                            relationship_type: RelationshipType::RelatedTo,
                            confidence: RelationshipType::RelatedTo.confidence(),
                            evidence: format!("dates {} days apart", gap),
                        });
                    }
                }
            }
        }
    }

    let mut relationships: Vec<EntityRelationship> = found.into_values().collect();
    relationships.sort_by(|a, b| {
        (a.source_id, a.target_id)
            .cmp(&(b.source_id, b.target_id))
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
    relationships
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityKind, EntitySource, EntityValidation};
    use chrono::Utc;
    use serde_json::{json, Map, Value};

    fn entity(kind: EntityKind, title: &str, data: Value) -> ExtractedEntity {
        ExtractedEntity {
            id: Uuid::now_v7(),
            kind,
            title: title.to_string(),
            data: data.as_object().cloned().unwrap_or_else(Map::new),
            source: EntitySource {
                url: "https://council.gov.uk/x".into(),
                content_hash: String::new(),
                extraction_method: "rules".into(),
                extracted_at: Utc::now(),
            },
            confidence: 1.0,
            validation: EntityValidation::default(),
            superseded_by: None,
        }
    }

    #[test]
    fn identifier_mentions_become_references() {
        let application = entity(
            EntityKind::PlanningApplication,
            "Planning application 24/00123/FUL",
            json!({"application_number": "24/00123/FUL"}),
        );
        let meeting = entity(
            EntityKind::CouncilMeeting,
            "Planning Committee",
            json!({"agenda_items": ["Item 4: 24/00123/FUL, 12 High Street"]}),
        );
        let relationships = infer_relationships(&[application.clone(), meeting.clone()]);
        assert_eq!(relationships.len(), 1);
        let rel = &relationships[0];
        assert_eq!(rel.relationship_type, RelationshipType::References);
        assert_eq!(rel.source_id, meeting.id);
        assert_eq!(rel.target_id, application.id);
        assert_eq!(rel.confidence, 0.7);
    }

    #[test]
    fn close_dates_relate_once() {
        let a = entity(EntityKind::Event, "Budget roadshow", json!({"start_date": "2025-03-10"}));
        let b = entity(
            EntityKind::Consultation,
            "Budget survey",
            json!({"closing_date": "2025-03-14"}),
        );
        let c = entity(EntityKind::Event, "Summer fair", json!({"start_date": "2025-07-01"}));
        let relationships = infer_relationships(&[a, b, c]);
        let related: Vec<_> = relationships
            .iter()
            .filter(|r| r.relationship_type == RelationshipType::RelatedTo)
            .collect();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].evidence, "dates 4 days apart");
    }
}
