use chrono::{DateTime, Utc};
use cron::Schedule;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::str::FromStr;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::TaskId;

pub fn parse_schedule(expression: &str) -> OrchestratorResult<Schedule> {
    Schedule::from_str(expression).map_err(|e| OrchestratorError::InvalidSchedule {
        schedule: expression.to_string(),
        message: e.to_string(),
    })
}

/// First fire time strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Min-heap of upcoming fire times.
///
/// Entries are not removed when a task is rescheduled; callers compare the
/// popped time with the task's current `next_run` and drop stale entries.
#[derive(Debug, Default)]
pub(crate) struct CronHeap {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, TaskId)>>,
}

impl CronHeap {
    pub(crate) fn push(&mut self, at: DateTime<Utc>, task_id: TaskId) {
        self.heap.push(Reverse((at, task_id)));
    }

    pub(crate) fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    /// Remove and return every entry due at `now`, earliest first.
    pub(crate) fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<(DateTime<Utc>, TaskId)> {
        let mut due = Vec::new();
        while self.next_deadline().is_some_and(|at| at <= now) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn parses_six_field_expressions() {
        let schedule = parse_schedule("0 */15 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 7, 0).unwrap();
        assert_eq!(
            next_fire(&schedule, start),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap())
        );
        assert!(matches!(
            parse_schedule("every five minutes"),
            Err(OrchestratorError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn heap_pops_due_entries_in_order() {
        let now = Utc::now();
        let (a, b, c) = (TaskId::new(), TaskId::new(), TaskId::new());
        let mut heap = CronHeap::default();
        heap.push(now + Duration::seconds(30), c);
        heap.push(now - Duration::seconds(5), b);
        heap.push(now - Duration::seconds(60), a);

        let due = heap.pop_due(now);
        assert_eq!(due.iter().map(|(_, id)| *id).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.next_deadline(), Some(now + Duration::seconds(30)));
    }
}
