//! Live filtering over the store's derived collections
//!
//! Filtering never touches the network or the store: it is a pure function
//! of the collection, the current time and the criteria, and preserves the
//! collection's order. All predicates are AND-composed; unset predicates
//! match everything.

use serde::{Deserialize, Serialize};

use crate::models::{Alert, BlockedClient, Incident, LogEntry, Severity, TimestampMs};

const HOUR_MS: i64 = 3_600_000;

/// Lifecycle predicate
///
/// For alerts "active" means unresolved; for blocked clients it means the
/// block has not expired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

/// Predicate set for one view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub severity: Option<Severity>,
    #[serde(default)]
    pub status: StatusFilter,
    /// Case-insensitive substring over the entity's searchable fields;
    /// empty means no text predicate
    #[serde(default)]
    pub search: String,
    /// Substring of the source address
    pub address: Option<String>,
    /// HTTP method, compared case-insensitively
    pub method: Option<String>,
    pub status_code: Option<u16>,
    /// Keep only entities no older than this many hours
    pub within_hours: Option<u32>,
}

impl FilterCriteria {
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn within_hours(mut self, hours: u32) -> Self {
        self.within_hours = Some(hours);
        self
    }

    /// Number of predicates that actually constrain the result
    pub fn active_count(&self) -> usize {
        [
            self.severity.is_some(),
            self.status != StatusFilter::All,
            !self.search.trim().is_empty(),
            self.address.as_deref().is_some_and(|a| !a.is_empty()),
            self.method.as_deref().is_some_and(|m| !m.is_empty()),
            self.status_code.is_some(),
            self.within_hours.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Whether a single entity passes every predicate
    pub fn matches<T: Filterable>(&self, item: &T, now_ms: TimestampMs) -> bool {
        if let Some(severity) = self.severity {
            if item.severity() != Some(severity) {
                return false;
            }
        }

        match (self.status, item.is_active(now_ms)) {
            (StatusFilter::All, _) => {}
            (StatusFilter::Active, Some(true)) | (StatusFilter::Inactive, Some(false)) => {}
            _ => return false,
        }

        let needle = self.search.trim().to_lowercase();
        if !needle.is_empty()
            && !item
                .search_fields()
                .iter()
                .any(|f| f.to_lowercase().contains(&needle))
        {
            return false;
        }

        if let Some(address) = self.address.as_deref().filter(|a| !a.is_empty()) {
            if !item.address().is_some_and(|a| a.contains(address)) {
                return false;
            }
        }

        if let Some(method) = self.method.as_deref().filter(|m| !m.is_empty()) {
            if !item.method().is_some_and(|m| m.eq_ignore_ascii_case(method)) {
                return false;
            }
        }

        if let Some(code) = self.status_code {
            if item.status_code() != Some(code) {
                return false;
            }
        }

        if let Some(hours) = self.within_hours {
            let window = i64::from(hours) * HOUR_MS;
            match item.timestamp_ms() {
                Some(ts) if now_ms.saturating_sub(ts) <= window => {}
                _ => return false,
            }
        }

        true
    }
}

/// Filter a collection, preserving its order
pub fn apply<T: Filterable + Clone>(
    items: &[T],
    now_ms: TimestampMs,
    criteria: &FilterCriteria,
) -> Vec<T> {
    items
        .iter()
        .filter(|item| criteria.matches(*item, now_ms))
        .cloned()
        .collect()
}

/// Field access used by the predicates
///
/// A field an entity kind does not carry returns `None`, and any predicate
/// on that field excludes the entity.
pub trait Filterable {
    fn severity(&self) -> Option<Severity> {
        None
    }

    fn is_active(&self, _now_ms: TimestampMs) -> Option<bool> {
        None
    }

    /// Fields the free-text predicate looks at
    fn search_fields(&self) -> Vec<&str>;

    fn address(&self) -> Option<&str> {
        None
    }

    fn method(&self) -> Option<&str> {
        None
    }

    fn status_code(&self) -> Option<u16> {
        None
    }

    fn timestamp_ms(&self) -> Option<TimestampMs> {
        None
    }
}

impl Filterable for Alert {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }

    fn is_active(&self, _now_ms: TimestampMs) -> Option<bool> {
        Some(Alert::is_active(self))
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.reason.as_str(), self.source_ip.as_str(), self.api_key.as_str()]
    }

    fn address(&self) -> Option<&str> {
        Some(self.source_ip.as_str())
    }

    fn timestamp_ms(&self) -> Option<TimestampMs> {
        Some(self.timestamp_ms)
    }
}

impl Filterable for LogEntry {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.source_ip.as_str(), self.path.as_str(), self.user_agent.as_str()]
    }

    fn address(&self) -> Option<&str> {
        Some(self.source_ip.as_str())
    }

    fn method(&self) -> Option<&str> {
        Some(self.method.as_str())
    }

    fn status_code(&self) -> Option<u16> {
        Some(self.status_code)
    }

    fn timestamp_ms(&self) -> Option<TimestampMs> {
        Some(self.timestamp_ms)
    }
}

impl Filterable for BlockedClient {
    fn is_active(&self, now_ms: TimestampMs) -> Option<bool> {
        Some(BlockedClient::is_active(self, now_ms))
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.identifier.as_str(), self.reason.as_str()]
    }

    fn address(&self) -> Option<&str> {
        Some(BlockedClient::address(self))
    }

    fn timestamp_ms(&self) -> Option<TimestampMs> {
        Some(self.blocked_at_ms)
    }
}

impl Filterable for Incident {
    fn search_fields(&self) -> Vec<&str> {
        vec![self.id.as_str(), self.description.as_str()]
    }

    fn timestamp_ms(&self) -> Option<TimestampMs> {
        Some(self.last_activity_ms)
    }
}
