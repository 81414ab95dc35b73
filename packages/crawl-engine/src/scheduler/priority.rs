//! Priority and re-crawl interval arithmetic.

use chrono::Duration;

use crate::types::{ChangeFrequency, ContentAnalysis};

pub const MIN_PRIORITY: f64 = 1.0;
pub const MAX_PRIORITY: f64 = 20.0;

/// Shortest re-crawl interval, in seconds.
pub const MIN_INTERVAL_SECS: i64 = 30 * 60;
/// Longest re-crawl interval, in seconds.
pub const MAX_INTERVAL_SECS: i64 = 365 * 24 * 60 * 60;

const CHANGED_FACTOR: f64 = 0.7;
const UNCHANGED_FACTOR: f64 = 1.5;
const UNIMPORTANT_AT_OR_BELOW: u8 = 3;

const FRESHNESS_WEIGHT: f64 = 0.5;
const EXTRACTABLE_WEIGHT: f64 = 0.1;
const MAX_EXTRACTABLE_BONUS: f64 = 3.0;
const CONFIDENCE_WEIGHT: f64 = 2.0;
const ALWAYS_CHANGING_PENALTY: f64 = 2.0;

pub fn clip_priority(priority: f64) -> f64 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

pub fn bound_interval(secs: i64) -> i64 {
    secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS)
}

/// Priority after content analysis.
pub fn dynamic_priority(static_priority: f64, analysis: &ContentAnalysis) -> f64 {
    let extractable =
        (analysis.extractable_data.total() as f64 * EXTRACTABLE_WEIGHT).min(MAX_EXTRACTABLE_BONUS);
    let churn = if analysis.change_frequency == ChangeFrequency::Always {
        ALWAYS_CHANGING_PENALTY
    } else {
        0.0
    };
    clip_priority(
        static_priority
            + (analysis.importance as f64 - 5.0)
            + (analysis.freshness as f64 - 5.0) * FRESHNESS_WEIGHT
            + analysis.structure.priority_bonus()
            + extractable
            + (analysis.confidence - 0.5) * CONFIDENCE_WEIGHT
            - churn,
    )
}

/// Adapt the base interval after a fetch. `changed` is `None` on the first
/// fetch, which leaves the interval alone.
pub fn adapt_interval(current_secs: i64, changed: Option<bool>, analysis: &ContentAnalysis) -> i64 {
    let factor = match changed {
        Some(true) => CHANGED_FACTOR,
        Some(false)
            if analysis.importance <= UNIMPORTANT_AT_OR_BELOW
                || analysis.change_frequency.is_static() =>
        {
            UNCHANGED_FACTOR
        }
        _ => 1.0,
    };
    bound_interval((current_secs as f64 * factor).round() as i64)
}

/// Retry back-off: 30 minutes doubled per failed attempt, bounded.
pub fn failure_interval(attempts: u32) -> i64 {
    let doublings = attempts.min(32);
    let secs = (MIN_INTERVAL_SECS as f64) * 2f64.powi(doublings as i32);
    bound_interval(secs.min(MAX_INTERVAL_SECS as f64) as i64)
}

pub fn secs_to_duration(secs: i64) -> Duration {
    Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, ExtractableData, StructureLevel};
    use proptest::prelude::*;

    fn analysis(importance: u8, freshness: u8) -> ContentAnalysis {
        ContentAnalysis {
            content_type: ContentType::Meeting,
            importance,
            freshness,
            structure: StructureLevel::SemiStructured,
            extractable_data: ExtractableData {
                tables: 2,
                dates: 8,
                ..Default::default()
            },
            keywords: Vec::new(),
            sentiment: Default::default(),
            complexity: Default::default(),
            change_frequency: ChangeFrequency::Weekly,
            confidence: 0.8,
            content_hash: String::new(),
        }
    }

    #[test]
    fn formula_matches_hand_calculation() {
        // 8 + 2 + 1.5 + 1 + 1.0 + 0.6
        let priority = dynamic_priority(8.0, &analysis(7, 8));
        assert!((priority - 14.1).abs() < 1e-9);
    }

    #[test]
    fn always_changing_pages_are_penalised() {
        let mut churny = analysis(5, 5);
        churny.change_frequency = ChangeFrequency::Always;
        assert!(dynamic_priority(10.0, &churny) < dynamic_priority(10.0, &analysis(5, 5)));
    }

    #[test]
    fn interval_adaptation() {
        let day = 86_400;
        assert_eq!(adapt_interval(day, Some(true), &analysis(7, 5)), 60_480);
        assert_eq!(adapt_interval(day, Some(false), &analysis(7, 5)), day);
        assert_eq!(adapt_interval(day, Some(false), &analysis(2, 5)), 129_600);
        assert_eq!(adapt_interval(day, None, &analysis(2, 5)), day);
        assert_eq!(adapt_interval(MIN_INTERVAL_SECS, Some(true), &analysis(7, 5)), MIN_INTERVAL_SECS);
    }

    #[test]
    fn failure_backoff_doubles() {
        assert_eq!(failure_interval(0), 1_800);
        assert_eq!(failure_interval(1), 3_600);
        assert_eq!(failure_interval(2), 7_200);
        assert_eq!(failure_interval(40), MAX_INTERVAL_SECS);
    }

    proptest! {
        #[test]
        fn dynamic_priority_stays_in_range(
            base in -50.0f64..50.0,
            importance in 1u8..=10,
            freshness in 1u8..=10,
            confidence in 0.0f64..=1.0,
        ) {
            let mut a = analysis(importance, freshness);
            a.confidence = confidence;
            let p = dynamic_priority(base, &a);
            prop_assert!((MIN_PRIORITY..=MAX_PRIORITY).contains(&p));
        }

        #[test]
        fn dynamic_priority_is_monotone(
            base in 1.0f64..20.0,
            importance in 1u8..10,
            freshness in 1u8..10,
        ) {
            let p = dynamic_priority(base, &analysis(importance, freshness));
            prop_assert!(dynamic_priority(base, &analysis(importance + 1, freshness)) >= p);
            prop_assert!(dynamic_priority(base, &analysis(importance, freshness + 1)) >= p);
        }

        #[test]
        fn failure_intervals_increase_until_bounded(attempts in 0u32..20) {
            let now = failure_interval(attempts);
            let next = failure_interval(attempts + 1);
            prop_assert!((MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&now));
            prop_assert!(next > now || next == MAX_INTERVAL_SECS);
        }
    }
}
