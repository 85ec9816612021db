use serde::{Deserialize, Serialize};

use super::{AlertId, TimestampMs};

/// Reference to an alert that belongs to an incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentMember {
    pub alert_id: Option<AlertId>,
    pub reason: String,
    pub source_ip: String,
}

/// A group of correlated alerts, computed server-side
///
/// The engine stores and exposes incidents verbatim; it never recomputes
/// the correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub description: String,
    pub members: Vec<IncidentMember>,
    pub member_count: usize,
    /// The backend sent only a prefix of the members
    pub truncated: bool,
    pub last_activity_ms: TimestampMs,
}
