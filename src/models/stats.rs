use serde::{Deserialize, Serialize};

use super::TimestampMs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCount {
    pub path: String,
    pub count: u64,
}

/// Request count of one minute of traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficBucket {
    /// Start of the minute
    pub timestamp_ms: TimestampMs,
    pub requests: u64,
}

/// Aggregate counters from the stats endpoint, taken verbatim from the
/// latest snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub active_alerts: u64,
    pub blocked_clients: u64,
    pub top_endpoints: Vec<EndpointCount>,
}
