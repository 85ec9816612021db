//! Canonical entities held by the sync engine
//!
//! Every record fetched from the monitoring API is normalized into one of
//! these types before it reaches the store. Timestamps are always epoch
//! milliseconds.

pub mod alert;
pub mod blocked;
pub mod incident;
pub mod log_entry;
pub mod stats;

pub use alert::{Alert, AlertId, ParseSeverityError, Severity};
pub use blocked::BlockedClient;
pub use incident::{Incident, IncidentMember};
pub use log_entry::LogEntry;
pub use stats::{AggregateStats, EndpointCount, TrafficBucket};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch milliseconds
pub type TimestampMs = i64;

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

/// Independently polled resources of the monitoring API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Stats,
    Timeline,
    Alerts,
    Incidents,
    Blocked,
    Logs,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Stats,
        Resource::Timeline,
        Resource::Alerts,
        Resource::Incidents,
        Resource::Blocked,
        Resource::Logs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Stats => "stats",
            Resource::Timeline => "timeline",
            Resource::Alerts => "alerts",
            Resource::Incidents => "incidents",
            Resource::Blocked => "blocked",
            Resource::Logs => "logs",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stats" => Ok(Resource::Stats),
            "timeline" => Ok(Resource::Timeline),
            "alerts" => Ok(Resource::Alerts),
            "incidents" | "correlated-incidents" => Ok(Resource::Incidents),
            "blocked" => Ok(Resource::Blocked),
            "logs" => Ok(Resource::Logs),
            other => Err(format!("unknown resource '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_parse() {
        assert_eq!("Alerts".parse::<Resource>().unwrap(), Resource::Alerts);
        assert_eq!(
            "correlated-incidents".parse::<Resource>().unwrap(),
            Resource::Incidents
        );
        assert!("users".parse::<Resource>().is_err());
        for resource in Resource::ALL {
            assert_eq!(resource.as_str().parse::<Resource>().unwrap(), resource);
        }
    }
}
