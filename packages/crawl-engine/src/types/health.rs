use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Health of a service, a crawl target, or the whole system.
///
/// Variants are ordered from best to worst so `max()` yields the worst state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
    Down,
}

impl HealthStatus {
    /// Critical and down states force the orchestrator into maintenance mode.
    pub fn is_critical(&self) -> bool {
        matches!(self, HealthStatus::Critical | HealthStatus::Down)
    }
}

/// Reporting window for analytics and orchestration reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Hour,
    Day,
    Week,
    Month,
}

impl Timeframe {
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Hour => Duration::hours(1),
            Timeframe::Day => Duration::days(1),
            Timeframe::Week => Duration::days(7),
            Timeframe::Month => Duration::days(30),
        }
    }

    /// Earliest timestamp included in the window ending at `now`.
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_status_wins() {
        let worst = [HealthStatus::Warning, HealthStatus::Down, HealthStatus::Healthy]
            .into_iter()
            .max()
            .unwrap();
        assert_eq!(worst, HealthStatus::Down);
        assert!(worst.is_critical());
        assert!(!HealthStatus::Warning.is_critical());
    }
}
