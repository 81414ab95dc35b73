use crate::types::EntityKind;

/// URL path fragments and content keywords per entity kind.
const KIND_SIGNALS: [(EntityKind, &[&str], &[&str]); 14] = [
    (
        EntityKind::CouncilMeeting,
        &["meeting", "agenda", "minutes", "mgcommittee"],
        &["agenda", "minutes", "meeting"],
    ),
    (
        EntityKind::PlanningApplication,
        &["planning-application", "planning/application", "applications", "planning"],
        &["planning application", "application number", "application reference"],
    ),
    (
        EntityKind::BudgetItem,
        &["budget"],
        &["budget", "revenue budget", "capital programme"],
    ),
    (
        EntityKind::SpendingRecord,
        &["spending", "payments", "expenditure", "spend-over"],
        &["supplier", "expenditure", "payment"],
    ),
    (
        EntityKind::Contract,
        &["contract", "tender", "procurement"],
        &["contract", "tender", "procurement"],
    ),
    (
        EntityKind::Councillor,
        &["councillor", "members", "mgmember"],
        &["councillor", "ward member"],
    ),
    (EntityKind::Committee, &["committee"], &["committee membership", "terms of reference"]),
    (
        EntityKind::Decision,
        &["decision", "mgdecision"],
        &["decision", "resolved", "delegated"],
    ),
    (
        EntityKind::Consultation,
        &["consultation", "have-your-say", "haveyoursay", "survey"],
        &["consultation", "have your say", "closing date"],
    ),
    (
        EntityKind::Service,
        &["services", "apply", "report-", "pay-"],
        &["apply online", "how to apply", "eligibility"],
    ),
    (
        EntityKind::PolicyDocument,
        &["policy", "policies", "strategy", "plan-"],
        &["policy", "strategy"],
    ),
    (
        EntityKind::NewsArticle,
        &["news", "press-release", "press"],
        &["press release", "published"],
    ),
    (EntityKind::Event, &["events", "whats-on", "event"], &["event", "tickets", "venue"]),
    (
        EntityKind::Contact,
        &["contact", "directory"],
        &["contact us", "email us", "telephone"],
    ),
];

/// Content keyword occurrences needed when the URL gives no hint.
const CONTENT_HIT_THRESHOLD: usize = 2;

/// Entity kinds a page likely contains.
///
/// Kinds hinted by the URL path come first, then kinds with enough keyword
/// hits in the content; each kind appears once.
pub fn infer_entity_kinds(url: &str, text: &str) -> Vec<EntityKind> {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    let text = text.to_lowercase();

    let mut kinds: Vec<EntityKind> = KIND_SIGNALS
        .iter()
        .filter(|(_, paths, _)| paths.iter().any(|p| path.contains(p)))
        .map(|(kind, _, _)| *kind)
        .collect();

    let mut by_content: Vec<(EntityKind, usize)> = KIND_SIGNALS
        .iter()
        .filter(|(kind, _, _)| !kinds.contains(kind))
        .map(|(kind, _, words)| (*kind, words.iter().map(|w| text.matches(w).count()).sum()))
        .filter(|(_, hits)| *hits >= CONTENT_HIT_THRESHOLD)
        .collect();
    by_content.sort_by(|a, b| b.1.cmp(&a.1));
    kinds.extend(by_content.into_iter().map(|(kind, _)| kind));

    kinds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_hints_come_first() {
        let kinds = infer_entity_kinds(
            "https://council.gov.uk/planning-applications/24-0001",
            "The committee meeting agenda and minutes",
        );
        assert_eq!(kinds[0], EntityKind::PlanningApplication);
        assert!(kinds.contains(&EntityKind::CouncilMeeting));
    }

    #[test]
    fn meeting_keywords_imply_council_meeting() {
        let kinds = infer_entity_kinds("https://council.gov.uk/page/123", "Agenda for the meeting");
        assert_eq!(kinds, vec![EntityKind::CouncilMeeting]);
    }

    #[test]
    fn no_signals_no_kinds() {
        assert!(infer_entity_kinds("https://council.gov.uk/", "Welcome").is_empty());
    }
}
