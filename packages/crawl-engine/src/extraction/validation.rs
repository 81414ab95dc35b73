//! Completeness, consistency and accuracy checks for extracted entities.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::dates::parse_date;
use crate::types::{EntityKind, EntityValidation, IssueKind, ValidationIssue};

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").unwrap();
}

/// Fields whose presence defines a complete entity of each kind.
fn validation_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::CouncilMeeting => &["title", "date", "venue", "committee"],
        EntityKind::PlanningApplication => &["application_number", "address", "description", "status"],
        EntityKind::BudgetItem => &["title", "amount", "financial_year"],
        EntityKind::SpendingRecord => &["supplier", "amount", "payment_date"],
        EntityKind::Contract => &["title", "supplier", "value", "start_date"],
        EntityKind::Councillor => &["name", "ward", "party", "email"],
        EntityKind::Committee => &["name", "chair"],
        EntityKind::Decision => &["title", "outcome", "decision_date"],
        EntityKind::Consultation => &["title", "closing_date", "summary"],
        EntityKind::Service => &["name", "description"],
        EntityKind::PolicyDocument => &["title", "document_url", "published_date"],
        EntityKind::NewsArticle => &["headline", "published_date", "summary"],
        EntityKind::Event => &["name", "start_date", "venue"],
        EntityKind::Contact => &["name", "email", "phone"],
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL.is_match(value.trim())
}

/// UK-style numbers: 10 or 11 digits starting with 0, or +44 and 10 digits.
pub fn is_valid_phone(value: &str) -> bool {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    let trimmed = value.trim_start();
    if trimmed.starts_with('+') {
        digits.starts_with("44") && digits.len() == 12
    } else {
        digits.starts_with('0') && (10..=11).contains(&digits.len())
    }
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

fn issue(field: &str, kind: IssueKind, message: String) -> ValidationIssue {
    ValidationIssue {
        field: field.to_string(),
        kind,
        message,
    }
}

/// Score an entity's data against its kind's expectations.
pub fn validate_entity(kind: EntityKind, data: &Map<String, Value>, today: NaiveDate) -> EntityValidation {
    let mut issues = Vec::new();

    let fields = validation_fields(kind);
    let present = fields.iter().filter(|f| is_present(data.get(**f))).count();
    for field in fields.iter().filter(|f| !is_present(data.get(**f))) {
        issues.push(issue(
            field,
            IssueKind::MissingField,
            format!("{} is missing {}", kind.label(), field),
        ));
    }
    let completeness = if fields.is_empty() {
        1.0
    } else {
        present as f64 / fields.len() as f64
    };

    let mut date_fields = 0usize;
    let mut date_problems = 0usize;
    for (field, value) in data.iter().filter(|(k, _)| k.contains("date")) {
        let Some(raw) = value.as_str() else {
            continue;
        };
        date_fields += 1;
        match parse_date(raw) {
            None => {
                date_problems += 1;
                issues.push(issue(
                    field,
                    IssueKind::MalformedDate,
                    format!("{} is not a recognisable date: {}", field, raw),
                ));
            }
            Some(date) if date > today && !kind.allows_future_dates() => {
                date_problems += 1;
                issues.push(issue(
                    field,
                    IssueKind::FutureDate,
                    format!("{} is in the future: {}", field, date),
                ));
            }
            Some(_) => {}
        }
    }
    let consistency = if date_fields == 0 {
        1.0
    } else {
        1.0 - date_problems as f64 / date_fields as f64
    };

    let mut checked = 0usize;
    let mut valid = 0usize;
    for (field, value) in data {
        let Some(raw) = value.as_str() else {
            continue;
        };
        let (ok, issue_kind) = if field.contains("email") {
            (is_valid_email(raw), IssueKind::MalformedEmail)
        } else if field.contains("phone") {
            (is_valid_phone(raw), IssueKind::MalformedPhone)
        } else {
            continue;
        };
        checked += 1;
        if ok {
            valid += 1;
        } else {
            issues.push(issue(field, issue_kind, format!("{} looks malformed: {}", field, raw)));
        }
    }
    let accuracy = if checked == 0 {
        1.0
    } else {
        valid as f64 / checked as f64
    };

    EntityValidation {
        completeness,
        consistency,
        accuracy,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn completeness_counts_expected_fields() {
        let validation = validate_entity(
            EntityKind::PlanningApplication,
            &data(json!({"application_number": "24/0001/FUL", "address": "1 High St"})),
            today(),
        );
        assert_eq!(validation.completeness, 0.5);
        assert_eq!(validation.consistency, 1.0);
        assert_eq!(
            validation
                .issues
                .iter()
                .filter(|i| i.kind == IssueKind::MissingField)
                .count(),
            2
        );
    }

    #[test]
    fn future_dates_flagged_unless_allowed() {
        let record = data(json!({"title": "Parking review", "outcome": "approved", "decision_date": "2030-01-01"}));
        let decision = validate_entity(EntityKind::Decision, &record, today());
        assert_eq!(decision.consistency, 0.0);
        assert!(decision.issues.iter().any(|i| i.kind == IssueKind::FutureDate));

        let meeting = data(json!({"title": "Full Council", "date": "2030-01-01"}));
        let meeting = validate_entity(EntityKind::CouncilMeeting, &meeting, today());
        assert_eq!(meeting.consistency, 1.0);
    }

    #[test]
    fn malformed_values_reduce_scores() {
        let record = data(json!({
            "name": "Customer services",
            "email": "not-an-email",
            "phone": "01234 567890",
            "updated_date": "TBC"
        }));
        let validation = validate_entity(EntityKind::Contact, &record, today());
        assert_eq!(validation.accuracy, 0.5);
        assert_eq!(validation.consistency, 0.0);
        assert!(validation.issues.iter().any(|i| i.kind == IssueKind::MalformedEmail));
        assert!(validation.issues.iter().any(|i| i.kind == IssueKind::MalformedDate));
    }

    #[test]
    fn phone_patterns() {
        assert!(is_valid_phone("01234 567890"));
        assert!(is_valid_phone("+44 20 7946 0000"));
        assert!(!is_valid_phone("12345"));
    }
}
