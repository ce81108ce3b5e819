use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-run log and statistics collector. The collected payload is stored
/// on the job's `data` column so operators can inspect a run without
/// reading process logs.
#[derive(Debug, Default)]
pub struct SyncLogging {
    entries: Vec<LogEntry>,
    statistics: BTreeMap<String, ModelStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Failure,
    Success,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelStats {
    pub total: u64,
    pub current: u64,
}

impl SyncLogging {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn log_warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message.into());
    }

    pub fn log_failure(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Failure, message.into());
    }

    pub fn log_success(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Success, message.into());
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.entries.push(LogEntry {
            time: Utc::now(),
            level,
            message,
        });
    }

    pub fn init_statistics(&mut self, model: &str, total: u64) {
        self.statistics
            .insert(model.to_string(), ModelStats { total, current: 0 });
    }

    pub fn increment_statistics(&mut self, model: &str) {
        self.statistics.entry(model.to_string()).or_default().current += 1;
    }

    /// Completion percentage per model, for operator display.
    #[must_use]
    pub fn statistics_percent(&self) -> BTreeMap<String, f64> {
        self.statistics
            .iter()
            .filter(|(_, stats)| stats.total > 0)
            .map(|(model, stats)| {
                (
                    model.clone(),
                    stats.current as f64 / stats.total as f64 * 100.0,
                )
            })
            .collect()
    }

    /// Serialize the run payload for the job `data` column.
    #[must_use]
    pub fn log_data(&self) -> Value {
        serde_json::json!({
            "log": self.entries,
            "statistics": self.statistics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_track_totals_and_percentages() {
        let mut logger = SyncLogging::new();
        logger.init_statistics("device", 4);
        logger.increment_statistics("device");
        logger.increment_statistics("device");
        logger.init_statistics("interface", 0);

        let percent = logger.statistics_percent();
        assert_eq!(percent.get("device"), Some(&50.0));
        // Zero-total models are omitted from the percentage view
        assert!(!percent.contains_key("interface"));
    }

    #[test]
    fn log_data_payload_contains_entries_and_statistics() {
        let mut logger = SyncLogging::new();
        logger.log_info("starting");
        logger.log_failure("boom");
        logger.init_statistics("device", 1);

        let data = logger.log_data();
        assert_eq!(data["log"].as_array().unwrap().len(), 2);
        assert_eq!(data["log"][1]["level"], "failure");
        assert_eq!(data["statistics"]["device"]["total"], 1);
    }
}
