//! Per-kind field extraction rules.
//!
//! Each [`EntityKind`] has a static table of [`FieldRule`]s. A rule tries its
//! locators in order; the first candidate that passes the validator wins (or,
//! for multi-valued fields, every passing candidate from the first locator
//! that yields one). An entity only materializes when every required field
//! resolved.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use url::Url;

use super::dates::{find_dates, parse_amount, parse_date};
use super::validation::{is_valid_email, is_valid_phone};
use crate::types::EntityKind;

/// Date as published, for text locators.
const DATE_CAPTURE: &str = r"(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4}|\d{1,2}(?:st|nd|rd|th)?\s+(?:January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec)\.?\s+\d{4})";
const AMOUNT_CAPTURE: &str = r"([£$€]\s?\d[\d,]*(?:\.\d{1,2})?(?:\s?(?:k|m|bn|million|billion)\b)?)";
const EMAIL_CAPTURE: &str = r"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})";
const PHONE_CAPTURE: &str = r"((?:\+44\s?\d{2,4}|\(?0\d{2,4}\)?)[\s-]?\d{3,4}[\s-]?\d{3,4})";
const COMMITTEE_CAPTURE: &str = r"([A-Z][A-Za-z&]+(?:\s+[A-Z&][A-Za-z&]*){0,4}\s+Committee)";
const PROPER_NAME: &str = r"([A-Z][A-Za-z0-9&.'\-]+(?:\s+[A-Z&][A-Za-z0-9&.'\-]*){0,5})";

lazy_static! {
    static ref REFERENCE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/\-.]{3,}$").unwrap();
    static ref RULES: HashMap<EntityKind, Vec<FieldRule>> = build_rules();
}

/// Where a rule looks for a value.
#[derive(Debug, Clone)]
pub enum Locator {
    /// CSS selector against the parsed markup.
    Css(String),
    /// Regex against the visible text; capture group 1 is the value.
    Text(Regex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Case or application reference: alphanumeric with at least one digit.
    Reference,
    Email,
    Phone,
    Amount,
    Date,
    /// At least two words.
    PersonName,
}

impl Validator {
    pub fn check(&self, value: &str) -> bool {
        match self {
            Validator::Reference => {
                REFERENCE.is_match(value) && value.chars().any(|c| c.is_ascii_digit())
            }
            Validator::Email => is_valid_email(value),
            Validator::Phone => is_valid_phone(value),
            Validator::Amount => parse_amount(value).is_some(),
            Validator::Date => parse_date(value).is_some() || !find_dates(value).is_empty(),
            Validator::PersonName => value.split_whitespace().count() >= 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    Trim,
    /// ISO `YYYY-MM-DD`; unparseable values are kept raw for validation to flag.
    Date,
    /// Numeric amount; unparseable values are kept raw.
    Amount,
    /// Absolute URL resolved against the page.
    Url,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub locators: Vec<Locator>,
    pub validator: Option<Validator>,
    pub required: bool,
    pub weight: f64,
    pub multiple: bool,
    pub transform: Transform,
}

impl FieldRule {
    fn new(name: &'static str, weight: f64) -> Self {
        Self {
            name,
            locators: Vec::new(),
            validator: None,
            required: false,
            weight,
            multiple: false,
            transform: Transform::Trim,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    fn css(mut self, selectors: &[&str]) -> Self {
        self.locators
            .extend(selectors.iter().map(|s| Locator::Css(s.to_string())));
        self
    }

    fn text(mut self, pattern: &str) -> Self {
        self.locators.push(Locator::Text(Regex::new(pattern).unwrap()));
        self
    }

    fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    fn date(self) -> Self {
        self.validate(Validator::Date).transform(Transform::Date)
    }

    fn amount(self) -> Self {
        self.validate(Validator::Amount).transform(Transform::Amount)
    }
}

fn labelled(label: &str, capture: &str) -> String {
    format!(r"(?i:{})\s*:?\s*{}", label, capture)
}

fn build_rules() -> HashMap<EntityKind, Vec<FieldRule>> {
    let mut rules = HashMap::new();

    rules.insert(
        EntityKind::CouncilMeeting,
        vec![
            FieldRule::new("title", 2.0)
                .required()
                .css(&[".meeting-title", "[itemprop=name]", "h1"]),
            FieldRule::new("date", 3.0)
                .required()
                .css(&["time[datetime]", ".meeting-date", "[itemprop=startDate]"])
                .text(DATE_CAPTURE)
                .date(),
            FieldRule::new("venue", 1.0).css(&[".venue", ".meeting-location", "[itemprop=location]"]),
            FieldRule::new("committee", 1.0)
                .css(&[".committee", ".committee-name"])
                .text(COMMITTEE_CAPTURE),
            FieldRule::new("agenda_items", 1.0)
                .multiple()
                .css(&[".agenda-item", "ol.agenda li", ".agenda li"]),
            FieldRule::new("documents", 1.0)
                .multiple()
                .css(&["a[href$='.pdf']", ".documents a[href]"])
                .transform(Transform::Url),
        ],
    );

    rules.insert(
        EntityKind::PlanningApplication,
        vec![
            FieldRule::new("application_number", 3.0)
                .required()
                .css(&[".application-number", "[data-field=application_number]", "[itemprop=identifier]"])
                .text(&labelled(
                    r"(?:application|planning)\s+(?:number|no\.?|ref(?:erence)?)",
                    r"([A-Za-z0-9][A-Za-z0-9/\-]{3,})",
                ))
                .validate(Validator::Reference),
            FieldRule::new("address", 2.0)
                .required()
                .css(&[".address", ".site-address", "[itemprop=address]", "address"])
                .text(&labelled(
                    r"(?:site\s+)?address",
                    r"([0-9A-Za-z ,.'\-]{5,80}?\b[A-Z]{1,2}\d{1,2}[A-Z]?\s*\d[A-Z]{2})\b",
                )),
            FieldRule::new("description", 2.0)
                .css(&[".description", ".proposal", "[itemprop=description]"])
                .text(&labelled("proposal", r"([^.]{10,200})")),
            FieldRule::new("status", 1.0)
                .css(&[".status", "[data-field=status]"])
                .text(&labelled(
                    "status",
                    r"(?i)(pending|approved|refused|granted|withdrawn|awaiting decision|under consideration|validated)",
                )),
            FieldRule::new("decision_date", 1.0)
                .css(&[".decision-date"])
                .text(&labelled(r"decision\s+date", DATE_CAPTURE))
                .date(),
            FieldRule::new("applicant", 1.0)
                .css(&[".applicant"])
                .text(&labelled(r"applicant(?:\s+name)?", PROPER_NAME)),
            FieldRule::new("documents", 1.0)
                .multiple()
                .css(&[".documents a[href]", "a[href$='.pdf']"])
                .transform(Transform::Url),
        ],
    );

    rules.insert(
        EntityKind::BudgetItem,
        vec![
            FieldRule::new("title", 2.0)
                .required()
                .css(&[".budget-line", "[itemprop=name]", "h1"]),
            FieldRule::new("amount", 3.0)
                .required()
                .css(&[".amount", ".budget-amount", "[itemprop=price]"])
                .text(AMOUNT_CAPTURE)
                .amount(),
            FieldRule::new("financial_year", 1.0)
                .css(&[".financial-year"])
                .text(&labelled(r"(?:financial\s+year|fy)", r"(\d{4}\s*[/-]\s*\d{2,4})")),
            FieldRule::new("department", 1.0)
                .css(&[".department", ".service-area"])
                .text(&labelled("department|directorate|service area", PROPER_NAME)),
        ],
    );

    rules.insert(
        EntityKind::SpendingRecord,
        vec![
            FieldRule::new("supplier", 3.0)
                .required()
                .css(&[".supplier", "[data-field=supplier]"])
                .text(&labelled(r"supplier(?:\s+name)?", PROPER_NAME)),
            FieldRule::new("amount", 3.0)
                .required()
                .css(&[".amount", "[data-field=amount]"])
                .text(AMOUNT_CAPTURE)
                .amount(),
            FieldRule::new("payment_date", 1.0)
                .css(&[".payment-date", "time[datetime]"])
                .text(&labelled(r"(?:payment\s+)?date", DATE_CAPTURE))
                .date(),
            FieldRule::new("description", 1.0).css(&[".description", ".purpose"]),
            FieldRule::new("department", 1.0)
                .css(&[".department", ".service-area"])
                .text(&labelled("department|directorate|service area", PROPER_NAME)),
        ],
    );

    rules.insert(
        EntityKind::Contract,
        vec![
            FieldRule::new("title", 2.0)
                .required()
                .css(&[".contract-title", "[itemprop=name]", "h1"]),
            FieldRule::new("contract_reference", 1.0)
                .css(&[".contract-reference"])
                .text(&labelled(
                    r"contract\s+(?:ref(?:erence)?|number|no\.?)",
                    r"([A-Za-z0-9][A-Za-z0-9/\-]{3,})",
                ))
                .validate(Validator::Reference),
            FieldRule::new("supplier", 2.0)
                .css(&[".supplier", ".awarded-to"])
                .text(&labelled(r"(?:supplier|awarded\s+to)", PROPER_NAME)),
            FieldRule::new("value", 2.0)
                .css(&[".contract-value", ".value"])
                .text(&labelled(r"(?:contract\s+)?value", AMOUNT_CAPTURE))
                .amount(),
            FieldRule::new("start_date", 1.0)
                .css(&[".start-date"])
                .text(&labelled(r"start\s+date", DATE_CAPTURE))
                .date(),
            FieldRule::new("end_date", 1.0)
                .css(&[".end-date"])
                .text(&labelled(r"end\s+date", DATE_CAPTURE))
                .date(),
        ],
    );

    rules.insert(
        EntityKind::Councillor,
        vec![
            FieldRule::new("name", 3.0)
                .required()
                .css(&[".councillor-name", "[itemprop=name]", "h1"])
                .text(r"((?:Councillor|Cllr\.?)\s+[A-Z][a-z]+(?:\s+[A-Z][a-z'\-]+){1,2})")
                .validate(Validator::PersonName),
            FieldRule::new("ward", 2.0)
                .css(&[".ward"])
                .text(&labelled("ward", r"([A-Z][A-Za-z'\-]+(?:\s+[A-Z&][A-Za-z'\-]+){0,3})")),
            FieldRule::new("party", 1.0)
                .css(&[".party"])
                .text(&labelled("party", r"([A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+){0,3})")),
            FieldRule::new("email", 1.0)
                .css(&["a[href^='mailto:']"])
                .text(EMAIL_CAPTURE)
                .validate(Validator::Email),
            FieldRule::new("phone", 1.0)
                .css(&["a[href^='tel:']", ".phone"])
                .text(PHONE_CAPTURE)
                .validate(Validator::Phone),
        ],
    );

    rules.insert(
        EntityKind::Committee,
        vec![
            FieldRule::new("name", 3.0)
                .required()
                .css(&[".committee-name", "h1"])
                .text(COMMITTEE_CAPTURE),
            FieldRule::new("chair", 1.0)
                .css(&[".chair"])
                .text(&labelled(
                    r"chair(?:man|person)?",
                    r"((?:Councillor|Cllr\.?)\s+[A-Z][a-z]+(?:\s+[A-Z][a-z'\-]+){0,2})",
                )),
            FieldRule::new("members", 1.0)
                .multiple()
                .css(&[".members li", ".committee-members li"]),
            FieldRule::new("remit", 1.0).css(&[".remit", ".terms-of-reference"]),
        ],
    );

    rules.insert(
        EntityKind::Decision,
        vec![
            FieldRule::new("title", 2.0)
                .required()
                .css(&[".decision-title", "h1"]),
            FieldRule::new("outcome", 2.0)
                .required()
                .css(&[".decision-outcome", ".outcome"])
                .text(r"(?i)\b(approved|refused|deferred|agreed|rejected|noted)\b"),
            FieldRule::new("decision_date", 2.0)
                .css(&[".decision-date", "time[datetime]"])
                .text(&labelled(r"(?:decision\s+date|date\s+of\s+decision)", DATE_CAPTURE))
                .date(),
            FieldRule::new("decision_maker", 1.0).css(&[".decision-maker"]),
        ],
    );

    rules.insert(
        EntityKind::Consultation,
        vec![
            FieldRule::new("title", 2.0)
                .required()
                .css(&[".consultation-title", "[itemprop=name]", "h1"]),
            FieldRule::new("closing_date", 3.0)
                .required()
                .css(&[".closing-date"])
                .text(&labelled(r"(?:closing\s+date|closes(?:\s+on)?|deadline)", DATE_CAPTURE))
                .date(),
            FieldRule::new("start_date", 1.0)
                .css(&[".start-date", ".opening-date"])
                .text(&labelled(r"(?:opens?(?:\s+on)?|start\s+date)", DATE_CAPTURE))
                .date(),
            FieldRule::new("summary", 1.0).css(&[".summary", "[itemprop=description]"]),
            FieldRule::new("response_url", 1.0)
                .css(&["a.respond", "a[href*='survey']"])
                .transform(Transform::Url),
        ],
    );

    rules.insert(
        EntityKind::Service,
        vec![
            FieldRule::new("name", 3.0)
                .required()
                .css(&[".service-name", "h1"]),
            FieldRule::new("description", 2.0).css(&[
                ".service-description",
                "[itemprop=description]",
                "main p",
            ]),
            FieldRule::new("contact_email", 1.0)
                .css(&["a[href^='mailto:']"])
                .text(EMAIL_CAPTURE)
                .validate(Validator::Email),
            FieldRule::new("contact_phone", 1.0)
                .css(&["a[href^='tel:']"])
                .text(PHONE_CAPTURE)
                .validate(Validator::Phone),
            FieldRule::new("apply_url", 1.0)
                .css(&["a[href*='apply']", "a.button"])
                .transform(Transform::Url),
        ],
    );

    rules.insert(
        EntityKind::PolicyDocument,
        vec![
            FieldRule::new("title", 2.0)
                .required()
                .css(&["h1", "[itemprop=name]"]),
            FieldRule::new("document_url", 2.0)
                .required()
                .css(&["a[href$='.pdf']", "a[href$='.docx']", "a[href$='.doc']"])
                .transform(Transform::Url),
            FieldRule::new("published_date", 1.0)
                .css(&[".published", "time[datetime]"])
                .text(&labelled(r"(?:published|adopted)(?:\s+on)?", DATE_CAPTURE))
                .date(),
            FieldRule::new("version", 1.0).text(&labelled("version", r"(\d+(?:\.\d+)*)")),
        ],
    );

    rules.insert(
        EntityKind::NewsArticle,
        vec![
            FieldRule::new("headline", 3.0)
                .required()
                .css(&["article h1", ".headline", "h1"]),
            FieldRule::new("published_date", 2.0)
                .css(&["time[datetime]", ".published", "[itemprop=datePublished]"])
                .text(&labelled(r"(?:published|posted)(?:\s+on)?", DATE_CAPTURE))
                .date(),
            FieldRule::new("summary", 1.0).css(&[".summary", ".standfirst", "article p"]),
            FieldRule::new("author", 1.0).css(&[".author", "[itemprop=author]"]),
        ],
    );

    rules.insert(
        EntityKind::Event,
        vec![
            FieldRule::new("name", 3.0)
                .required()
                .css(&[".event-title", "[itemprop=name]", "h1"]),
            FieldRule::new("start_date", 3.0)
                .required()
                .css(&["time[datetime]", "[itemprop=startDate]", ".event-date"])
                .text(DATE_CAPTURE)
                .date(),
            FieldRule::new("venue", 2.0).css(&[".venue", "[itemprop=location]", ".location"]),
            FieldRule::new("price", 1.0)
                .css(&[".price", "[itemprop=price]"])
                .text(AMOUNT_CAPTURE)
                .transform(Transform::Amount),
            FieldRule::new("booking_url", 1.0)
                .css(&["a[href*='book']", "a[href*='ticket']"])
                .transform(Transform::Url),
        ],
    );

    rules.insert(
        EntityKind::Contact,
        vec![
            FieldRule::new("name", 2.0)
                .required()
                .css(&[".contact-name", "h1"]),
            FieldRule::new("email", 2.0)
                .css(&["a[href^='mailto:']"])
                .text(EMAIL_CAPTURE)
                .validate(Validator::Email),
            FieldRule::new("phone", 2.0)
                .css(&["a[href^='tel:']"])
                .text(PHONE_CAPTURE)
                .validate(Validator::Phone),
            FieldRule::new("address", 1.0).css(&["address", ".address"]),
        ],
    );

    rules
}

/// Rule table for a kind.
pub fn rules_for(kind: EntityKind) -> &'static [FieldRule] {
    RULES.get(&kind).map(Vec::as_slice).unwrap_or(&[])
}

/// Sum of every field weight for a kind.
pub fn total_weight(kind: EntityKind) -> f64 {
    rules_for(kind).iter().map(|r| r.weight).sum()
}

/// Fields resolved for one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub data: Map<String, Value>,
    pub matched_fields: Vec<&'static str>,
    /// Matched weight over total weight.
    pub confidence: f64,
}

/// Apply a kind's rules. Returns the missing required fields on failure.
pub fn apply_rules(
    kind: EntityKind,
    document: Option<&Html>,
    text: &str,
    base_url: Option<&Url>,
) -> Result<RuleMatch, Vec<&'static str>> {
    let rules = rules_for(kind);
    let mut data = Map::new();
    let mut matched_fields = Vec::new();
    let mut missing = Vec::new();
    let mut matched_weight = 0.0;

    for rule in rules {
        match resolve_field(rule, document, text, base_url) {
            Some(value) => {
                matched_weight += rule.weight;
                matched_fields.push(rule.name);
                data.insert(rule.name.to_string(), value);
            }
            None if rule.required => missing.push(rule.name),
            None => {}
        }
    }

    if !missing.is_empty() {
        return Err(missing);
    }

    let total = total_weight(kind);
    Ok(RuleMatch {
        data,
        matched_fields,
        confidence: if total > 0.0 { matched_weight / total } else { 0.0 },
    })
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_value(element: ElementRef<'_>, transform: Transform) -> Option<String> {
    let el = element.value();
    if transform == Transform::Url {
        return el.attr("href").or_else(|| el.attr("src")).map(str::to_string);
    }
    if let Some(href) = el.attr("href") {
        if let Some(address) = href.strip_prefix("mailto:").or_else(|| href.strip_prefix("tel:")) {
            return Some(address.split('?').next().unwrap_or(address).to_string());
        }
    }
    el.attr("datetime")
        .or_else(|| el.attr("content"))
        .map(str::to_string)
        .or_else(|| Some(collapse(&element.text().collect::<String>())))
}

fn candidates(
    locator: &Locator,
    transform: Transform,
    document: Option<&Html>,
    text: &str,
) -> Vec<String> {
    match locator {
        Locator::Css(selector) => {
            let (Some(document), Ok(selector)) = (document, Selector::parse(selector)) else {
                return Vec::new();
            };
            document
                .select(&selector)
                .filter_map(|el| element_value(el, transform))
                .collect()
        }
        Locator::Text(regex) => regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string())
            .collect(),
    }
}

fn apply_transform(value: &str, transform: Transform, base_url: Option<&Url>) -> Option<Value> {
    match transform {
        Transform::Trim => Some(json!(value)),
        Transform::Date => Some(
            parse_date(value)
                .or_else(|| find_dates(value).into_iter().next())
                .map(|d| json!(d.format("%Y-%m-%d").to_string()))
                .unwrap_or_else(|| json!(value)),
        ),
        Transform::Amount => Some(
            parse_amount(value)
                .map(|a| json!(a))
                .unwrap_or_else(|| json!(value)),
        ),
        Transform::Url => match base_url {
            Some(base) => base.join(value).ok().map(|u| json!(u.to_string())),
            None => Url::parse(value).ok().map(|u| json!(u.to_string())),
        },
    }
}

fn resolve_field(
    rule: &FieldRule,
    document: Option<&Html>,
    text: &str,
    base_url: Option<&Url>,
) -> Option<Value> {
    for locator in &rule.locators {
        let mut accepted: Vec<Value> = Vec::new();
        for raw in candidates(locator, rule.transform, document, text) {
            let raw = collapse(&raw);
            if raw.is_empty() {
                continue;
            }
            if rule.validator.is_some_and(|v| !v.check(&raw)) {
                continue;
            }
            let Some(value) = apply_transform(&raw, rule.transform, base_url) else {
                continue;
            };
            if !rule.multiple {
                return Some(value);
            }
            if !accepted.contains(&value) {
                accepted.push(value);
            }
        }
        if !accepted.is_empty() {
            return Some(Value::Array(accepted));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLANNING_PAGE: &str = r#"<html><body>
        <h1>Planning application 24/00123/FUL</h1>
        <dl>
          <dt>Application number</dt><dd class="application-number">24/00123/FUL</dd>
          <dt>Site address</dt><dd class="address">12 High Street, Anytown AB1 2CD</dd>
        </dl>
        </body></html>"#;

    fn apply(kind: EntityKind, html: &str) -> Result<RuleMatch, Vec<&'static str>> {
        let document = Html::parse_document(html);
        let text = super::super::formats::visible_text(&document);
        let base = Url::parse("https://council.gov.uk/planning/").unwrap();
        apply_rules(kind, Some(&document), &text, Some(&base))
    }

    #[test]
    fn planning_confidence_is_weight_ratio() {
        let result = apply(EntityKind::PlanningApplication, PLANNING_PAGE).unwrap();
        assert_eq!(total_weight(EntityKind::PlanningApplication), 11.0);
        assert_eq!(result.confidence, 5.0 / 11.0);
        assert_eq!(result.data["application_number"], "24/00123/FUL");
        assert_eq!(result.data["address"], "12 High Street, Anytown AB1 2CD");
        assert_eq!(result.matched_fields, vec!["application_number", "address"]);
    }

    #[test]
    fn missing_required_field_blocks_entity() {
        let html = r#"<html><body><dd class="application-number">24/00123/FUL</dd></body></html>"#;
        let missing = apply(EntityKind::PlanningApplication, html).unwrap_err();
        assert_eq!(missing, vec!["address"]);
    }

    #[test]
    fn text_locators_pick_up_labelled_values() {
        let html = r#"<html><body><p>Application reference: 25/0042/HOU</p>
            <p>Site address: 4 Mill Lane, Anytown AB1 3EF</p>
            <p>Decision date: 3rd February 2025</p></body></html>"#;
        let result = apply(EntityKind::PlanningApplication, html).unwrap();
        assert_eq!(result.data["application_number"], "25/0042/HOU");
        assert_eq!(result.data["address"], "4 Mill Lane, Anytown AB1 3EF");
        assert_eq!(result.data["decision_date"], "2025-02-03");
    }

    #[test]
    fn document_links_are_resolved_and_deduplicated() {
        let html = r#"<html><body><h1>Budget Scrutiny</h1><time datetime="2025-03-12">12 March</time>
            <a href="agenda.pdf">Agenda</a><a href="agenda.pdf">Agenda again</a>
            <a href="/docs/minutes.pdf">Minutes</a></body></html>"#;
        let result = apply(EntityKind::CouncilMeeting, html).unwrap();
        assert_eq!(result.data["date"], "2025-03-12");
        assert_eq!(
            result.data["documents"],
            json!([
                "https://council.gov.uk/planning/agenda.pdf",
                "https://council.gov.uk/docs/minutes.pdf"
            ])
        );
    }

    #[test]
    fn amounts_are_numeric() {
        let html = r#"<html><body><h1>Highways maintenance</h1><span class="amount">£1,250,000</span></body></html>"#;
        let result = apply(EntityKind::BudgetItem, html).unwrap();
        assert_eq!(result.data["amount"], json!(1_250_000.0));
    }

    #[test]
    fn every_kind_has_a_required_field() {
        for kind in EntityKind::ALL {
            assert!(
                rules_for(kind).iter().any(|r| r.required),
                "{} has no required field",
                kind.as_str()
            );
        }
    }
}
