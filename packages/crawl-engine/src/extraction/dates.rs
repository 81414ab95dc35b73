//! Date and amount parsing for the formats civic sites actually publish.

use chrono::{DateTime, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const MONTH_PATTERN: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

lazy_static! {
    static ref ISO_DATE: Regex = Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap();
    static ref NUMERIC_DATE: Regex = Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap();
    static ref DAY_MONTH_YEAR: Regex = Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({})\.?,?\s+(\d{{4}})\b",
        MONTH_PATTERN
    ))
    .unwrap();
    static ref MONTH_DAY_YEAR: Regex = Regex::new(&format!(
        r"(?i)\b({})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b",
        MONTH_PATTERN
    ))
    .unwrap();
    static ref LEADING_WEEKDAY: Regex =
        Regex::new(r"(?i)^(?:mon|tues|wednes|thurs|fri|satur|sun)day,?\s+").unwrap();
    static ref AMOUNT: Regex =
        Regex::new(r"(?i)[£$€]\s?(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?\s?(k|m|bn|million|billion)?\b")
            .unwrap();
    static ref BARE_NUMBER: Regex = Regex::new(r"^-?(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d+))?$").unwrap();
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.trim_end_matches('.').to_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(&name))
        .map(|i| i as u32 + 1)
}

/// Every date found in free text, in order of appearance.
pub fn find_dates(text: &str) -> Vec<NaiveDate> {
    scan(text).into_iter().map(|(_, date)| date).collect()
}

fn scan(text: &str) -> Vec<(Range<usize>, NaiveDate)> {
    let mut found: Vec<(Range<usize>, NaiveDate)> = Vec::new();

    for caps in ISO_DATE.captures_iter(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[3].parse().unwrap_or(0),
        );
        if let (Some(date), Some(m)) = (date, caps.get(0)) {
            found.push((m.range(), date));
        }
    }
    for caps in NUMERIC_DATE.captures_iter(text) {
        // Day first, as published on UK council sites.
        let date = NaiveDate::from_ymd_opt(
            caps[3].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[1].parse().unwrap_or(0),
        );
        if let (Some(date), Some(m)) = (date, caps.get(0)) {
            found.push((m.range(), date));
        }
    }
    for caps in DAY_MONTH_YEAR.captures_iter(text) {
        let date = month_number(&caps[2]).and_then(|month| {
            NaiveDate::from_ymd_opt(caps[3].parse().unwrap_or(0), month, caps[1].parse().unwrap_or(0))
        });
        if let (Some(date), Some(m)) = (date, caps.get(0)) {
            found.push((m.range(), date));
        }
    }
    for caps in MONTH_DAY_YEAR.captures_iter(text) {
        let date = month_number(&caps[1]).and_then(|month| {
            NaiveDate::from_ymd_opt(caps[3].parse().unwrap_or(0), month, caps[2].parse().unwrap_or(0))
        });
        if let (Some(date), Some(m)) = (date, caps.get(0)) {
            found.push((m.range(), date));
        }
    }

    found.sort_by_key(|(range, _)| (range.start, std::cmp::Reverse(range.end)));
    let mut result: Vec<(Range<usize>, NaiveDate)> = Vec::with_capacity(found.len());
    for (range, date) in found {
        if result.last().map_or(true, |(last, _)| range.start >= last.end) {
            result.push((range, date));
        }
    }
    result
}

/// Parse a value that is entirely a date.
///
/// Accepts RFC 3339 timestamps, ISO dates (optionally followed by a time),
/// `dd/mm/yyyy`, `12 March 2025`, `12th March 2025` and `March 12, 2025`,
/// with an optional leading weekday.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim().trim_end_matches('.');
    if value.is_empty() || value.len() > 48 {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive());
    }

    let stripped = LEADING_WEEKDAY.replace(value, "");
    let value: &str = &stripped;
    let (range, date) = scan(value).into_iter().next()?;
    if range.start != 0 {
        return None;
    }
    let rest = &value[range.end..];
    let trailing_time = rest.starts_with('T')
        || (rest.starts_with(' ') && rest.trim_start().starts_with(|c: char| c.is_ascii_digit()));
    if rest.is_empty() || trailing_time {
        Some(date)
    } else {
        None
    }
}

/// Parse a money amount such as `£1,250.50` or `$2.5m`.
pub fn parse_amount(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if BARE_NUMBER.is_match(trimmed) {
        return trimmed.replace(',', "").parse().ok();
    }

    let caps = AMOUNT.captures(trimmed)?;
    let whole: f64 = caps[1].replace(',', "").parse().ok()?;
    let fraction = caps
        .get(2)
        .and_then(|m| format!("0.{}", m.as_str()).parse::<f64>().ok())
        .unwrap_or(0.0);
    let multiplier = match caps.get(3).map(|m| m.as_str().to_lowercase()).as_deref() {
        Some("k") => 1_000.0,
        Some("m") | Some("million") => 1_000_000.0,
        Some("bn") | Some("billion") => 1_000_000_000.0,
        _ => 1.0,
    };
    Some((whole + fraction) * multiplier)
}

/// Count of money amounts in free text.
pub fn count_amounts(text: &str) -> usize {
    AMOUNT.find_iter(text).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_formats() {
        assert_eq!(parse_date("2025-03-12"), Some(ymd(2025, 3, 12)));
        assert_eq!(parse_date("2025-03-12T19:00:00Z"), Some(ymd(2025, 3, 12)));
        assert_eq!(parse_date("12/03/2025"), Some(ymd(2025, 3, 12)));
        assert_eq!(parse_date("12 March 2025"), Some(ymd(2025, 3, 12)));
        assert_eq!(parse_date("12th March 2025"), Some(ymd(2025, 3, 12)));
        assert_eq!(parse_date("March 12, 2025"), Some(ymd(2025, 3, 12)));
        assert_eq!(parse_date("Wednesday 12 March 2025"), Some(ymd(2025, 3, 12)));
        assert_eq!(parse_date("1 Sept 2024"), Some(ymd(2024, 9, 1)));
    }

    #[test]
    fn rejects_non_dates() {
        assert_eq!(parse_date("TBC"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("31/02/2025"), None);
        assert_eq!(parse_date("Meeting on 12 March 2025"), None);
        assert_eq!(parse_date("12 Marchington 2025"), None);
    }

    #[test]
    fn finds_dates_in_text() {
        let dates = find_dates("Received 3 January 2025, decided on 2025-02-14.");
        assert_eq!(dates, vec![ymd(2025, 1, 3), ymd(2025, 2, 14)]);
    }

    #[test]
    fn parses_amounts() {
        assert_eq!(parse_amount("£1,250.50"), Some(1250.5));
        assert_eq!(parse_amount("$2.5m"), Some(2_500_000.0));
        assert_eq!(parse_amount("4000"), Some(4000.0));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(count_amounts("Costs £500 and £1,000 total"), 2);
    }
}
