use serde::Serialize;
use std::fmt;

use crate::models::TimestampMs;

/// Recoverable failure categories surfaced to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A poll or command could not reach the authority
    NetworkFailure,
    /// Records (or a whole payload) failed to parse
    NormalizationFailure,
    /// The authority refused a command; the optimistic change was rolled back
    MutationRejected,
    /// No snapshot corroborated a mutation within the staleness window
    ReconciliationTimeout,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoticeKind::NetworkFailure => "network failure",
            NoticeKind::NormalizationFailure => "normalization failure",
            NoticeKind::MutationRejected => "mutation rejected",
            NoticeKind::ReconciliationTimeout => "reconciliation timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    /// Resource name or mutation description
    pub subject: String,
    pub message: String,
    pub at_ms: TimestampMs,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}
