use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::TimingId;

/// An in-flight measurement returned by `start_timing`.
#[derive(Debug)]
pub struct TimingHandle {
    pub id: TimingId,
    pub operation: String,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl TimingHandle {
    pub(crate) fn start(operation: impl Into<String>) -> Self {
        Self {
            id: TimingId::new(),
            operation: operation.into(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    pub memory_bytes: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate timings for one operation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub operation: String,
    pub count: usize,
    pub success_rate: f64,
    pub avg_ms: f64,
    pub p95_ms: u64,
    pub max_ms: u64,
}

impl OperationStats {
    pub fn from_records<'a>(
        operation: &str,
        records: impl IntoIterator<Item = &'a PerformanceRecord>,
    ) -> Self {
        let mut durations = Vec::new();
        let mut successes = 0usize;
        for record in records {
            durations.push(record.duration_ms);
            if record.success {
                successes += 1;
            }
        }
        durations.sort_unstable();

        let count = durations.len();
        let (avg_ms, p95_ms, max_ms) = if count == 0 {
            (0.0, 0, 0)
        } else {
            let total: u64 = durations.iter().sum();
            let p95_index = ((count as f64 * 0.95).ceil() as usize).saturating_sub(1);
            (
                total as f64 / count as f64,
                durations[p95_index.min(count - 1)],
                durations[count - 1],
            )
        };

        Self {
            operation: operation.to_string(),
            count,
            success_rate: if count == 0 { 0.0 } else { successes as f64 / count as f64 },
            avg_ms,
            p95_ms,
            max_ms,
        }
    }
}

/// Resident memory of this process in bytes, 0 when unavailable.
pub fn current_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm") {
            if let Some(resident) = statm.split_whitespace().nth(1) {
                if let Ok(pages) = resident.parse::<u64>() {
                    return pages * 4096;
                }
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ms: u64, success: bool) -> PerformanceRecord {
        PerformanceRecord {
            operation: "fetch".into(),
            duration_ms: ms,
            success,
            memory_bytes: 0,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn stats_summarize_durations() {
        let records: Vec<_> = (1..=20).map(|i| record(i * 10, i % 4 != 0)).collect();
        let stats = OperationStats::from_records("fetch", &records);
        assert_eq!(stats.count, 20);
        assert_eq!(stats.max_ms, 200);
        assert_eq!(stats.p95_ms, 190);
        assert!((stats.avg_ms - 105.0).abs() < f64::EPSILON);
        assert!((stats.success_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = OperationStats::from_records("none", &[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.success_rate, 0.0);
    }
}
