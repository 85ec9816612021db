use serde::{Deserialize, Serialize};

use super::TimestampMs;

/// One request observed by the monitored API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub source_ip: String,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: f64,
    pub timestamp_ms: TimestampMs,
    pub user_agent: String,
    pub api_key: String,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}
