use serde::{Deserialize, Serialize};

use super::alerts::Alert;
use super::errors::ErrorRecord;
use super::health::HealthCheck;
use super::performance::PerformanceRecord;
use super::sessions::SessionMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Csv,
}

/// Full copy of every monitoring ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    pub errors: Vec<ErrorRecord>,
    pub performance: Vec<PerformanceRecord>,
    pub alerts: Vec<Alert>,
    pub health: Vec<HealthCheck>,
    pub sessions: Vec<SessionMetrics>,
}

impl MonitoringSnapshot {
    /// Flatten all ledgers into one CSV table.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("record_type,timestamp,name,status,value,detail\n");

        for error in &self.errors {
            push_row(
                &mut out,
                [
                    "error",
                    &error.last_seen.to_rfc3339(),
                    &error.operation,
                    error.kind.as_str(),
                    &error.count.to_string(),
                    error.url.as_deref().unwrap_or(""),
                ],
            );
        }
        for record in &self.performance {
            push_row(
                &mut out,
                [
                    "performance",
                    &record.recorded_at.to_rfc3339(),
                    &record.operation,
                    if record.success { "success" } else { "failure" },
                    &record.duration_ms.to_string(),
                    &record.memory_bytes.to_string(),
                ],
            );
        }
        for alert in &self.alerts {
            push_row(
                &mut out,
                [
                    "alert",
                    &alert.created_at.to_rfc3339(),
                    &alert.title,
                    alert.severity.as_str(),
                    if alert.acknowledged { "acknowledged" } else { "open" },
                    &alert.message,
                ],
            );
        }
        for check in &self.health {
            let status = serde_json::to_value(check.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            push_row(
                &mut out,
                [
                    "health",
                    &check.checked_at.to_rfc3339(),
                    &check.service,
                    &status,
                    &check.response_ms.to_string(),
                    check.message.as_deref().unwrap_or(""),
                ],
            );
        }
        for session in &self.sessions {
            push_row(
                &mut out,
                [
                    "session",
                    &session.started_at.to_rfc3339(),
                    &session.name,
                    if session.is_active() { "active" } else { "ended" },
                    &session.requests.to_string(),
                    &format!("error_rate={:.3}", session.error_rate()),
                ],
            );
        }
        out
    }
}

fn push_row<const N: usize>(out: &mut String, cells: [&str; N]) {
    let row = cells.iter().map(|c| escape(c)).collect::<Vec<_>>().join(",");
    out.push_str(&row);
    out.push('\n');
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_quotes_cells_with_separators() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
