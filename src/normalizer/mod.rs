//! Entity normalization
//!
//! Converts raw monitoring API payloads into canonical entities. Every
//! function here is pure: the same payload always yields the same entities
//! and the same diagnostics.
//!
//! Records with an unparseable identifier or severity are dropped and
//! counted in the [`NormalizationReport`]; the rest of the batch is kept.

mod fields;

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::LogExclusionConfig;
use crate::models::{
    AggregateStats, Alert, BlockedClient, EndpointCount, Incident, IncidentMember, LogEntry,
    ParseSeverityError, Resource, Severity, TrafficBucket,
};

use fields::Record;
pub use fields::timestamp_ms;

/// Maximum number of diagnostic samples kept per batch
pub const MAX_DIAGNOSTIC_SAMPLES: usize = 5;

/// Errors raised while normalizing a payload or a single record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("expected a JSON array for {0}")]
    NotAnArray(Resource),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    #[error(transparent)]
    InvalidSeverity(#[from] ParseSeverityError),

    #[error("duplicate identifier '{0}'")]
    DuplicateId(String),
}

/// Outcome of normalizing one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizationReport {
    pub accepted: usize,
    pub dropped: usize,
    /// First few diagnostics, `record <index>: <reason>`
    pub samples: Vec<String>,
}

impl NormalizationReport {
    fn drop_record(&mut self, index: usize, err: &NormalizeError) {
        self.dropped += 1;
        if self.samples.len() < MAX_DIAGNOSTIC_SAMPLES {
            self.samples.push(format!("record {}: {}", index, err));
        }
    }

    pub fn is_clean(&self) -> bool {
        self.dropped == 0
    }
}

/// A normalized batch of entities
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub entities: Vec<T>,
    pub report: NormalizationReport,
}

/// A normalized snapshot of one resource, ready to merge into the store
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Stats(AggregateStats),
    Timeline(Vec<TrafficBucket>),
    Alerts(Vec<Alert>),
    Incidents(Vec<Incident>),
    Blocked(Vec<BlockedClient>),
    Logs(Vec<LogEntry>),
}

impl Snapshot {
    pub fn resource(&self) -> Resource {
        match self {
            Snapshot::Stats(_) => Resource::Stats,
            Snapshot::Timeline(_) => Resource::Timeline,
            Snapshot::Alerts(_) => Resource::Alerts,
            Snapshot::Incidents(_) => Resource::Incidents,
            Snapshot::Blocked(_) => Resource::Blocked,
            Snapshot::Logs(_) => Resource::Logs,
        }
    }
}

/// Payload normalizer
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    log_exclusions: LogExclusionConfig,
}

impl Normalizer {
    pub fn new(log_exclusions: LogExclusionConfig) -> Self {
        Normalizer { log_exclusions }
    }

    /// Normalize the raw body of `resource`
    ///
    /// Fails only when the payload shape is wrong as a whole (e.g. an
    /// object where a list was expected); bad records are reported, not
    /// fatal.
    pub fn normalize(
        &self,
        resource: Resource,
        body: &Value,
    ) -> Result<(Snapshot, NormalizationReport), NormalizeError> {
        match resource {
            Resource::Stats => {
                let (stats, report) = normalize_stats(body)?;
                Ok((Snapshot::Stats(stats), report))
            }
            Resource::Timeline => {
                let n = normalize_timeline(as_array(resource, body)?);
                Ok((Snapshot::Timeline(n.entities), n.report))
            }
            Resource::Alerts => {
                let n = normalize_alerts(as_array(resource, body)?);
                Ok((Snapshot::Alerts(n.entities), n.report))
            }
            Resource::Incidents => {
                let n = normalize_incidents(as_array(resource, body)?);
                Ok((Snapshot::Incidents(n.entities), n.report))
            }
            Resource::Blocked => {
                let n = normalize_blocked(as_array(resource, body)?);
                Ok((Snapshot::Blocked(n.entities), n.report))
            }
            Resource::Logs => {
                let n = normalize_logs(as_array(resource, body)?, &self.log_exclusions);
                Ok((Snapshot::Logs(n.entities), n.report))
            }
        }
    }
}

fn as_array(resource: Resource, body: &Value) -> Result<&[Value], NormalizeError> {
    body.as_array()
        .map(|v| v.as_slice())
        .ok_or(NormalizeError::NotAnArray(resource))
}

/// Shared batch driver: parse each record, drop failures and duplicate ids.
fn normalize_batch<'a, T, I, K>(
    records: I,
    parse: impl Fn(&Record<'a>) -> Result<T, NormalizeError>,
    key: impl Fn(&T) -> K,
) -> Normalized<T>
where
    I: IntoIterator<Item = (usize, &'a Value)>,
    K: std::hash::Hash + Eq + ToString,
{
    let mut report = NormalizationReport::default();
    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for (index, value) in records {
        let parsed = Record::new(value).and_then(|r| parse(&r));
        match parsed {
            Ok(entity) => {
                let k = key(&entity);
                if seen.contains(&k) {
                    report.drop_record(index, &NormalizeError::DuplicateId(k.to_string()));
                    continue;
                }
                seen.insert(k);
                entities.push(entity);
            }
            Err(e) => report.drop_record(index, &e),
        }
    }

    report.accepted = entities.len();
    Normalized { entities, report }
}

/// Normalize an alert list
pub fn normalize_alerts(records: &[Value]) -> Normalized<Alert> {
    normalize_batch(records.iter().enumerate(), parse_alert, |a| a.id)
}

fn parse_alert(r: &Record<'_>) -> Result<Alert, NormalizeError> {
    let id = r.required_u64("id", &["id"])?;
    let severity: Severity = r.required_str("severity", &["severity"])?.parse()?;
    Ok(Alert {
        id,
        source_ip: r.string_or_default(&["ip", "source_ip"]),
        api_key: r.string_or_default(&["api_key"]),
        reason: r.string_or_default(&["reason"]),
        severity,
        timestamp_ms: r.timestamp_or_default("timestamp", &["timestamp"])?,
        resolved: r.bool_or_default(&["resolved"]),
        correlation_id: r.optional_string(&["correlation_id", "correlationId"]),
    })
}

/// Normalize a request-log list
///
/// The dashboard's own traffic is excluded first; records without an `id`
/// then receive their 1-based position among the kept records.
pub fn normalize_logs(records: &[Value], exclusions: &LogExclusionConfig) -> Normalized<LogEntry> {
    let kept = records.iter().enumerate().filter(|(_, v)| {
        let path = v.get("path").and_then(Value::as_str).unwrap_or_default();
        !exclusions.is_excluded(path)
    });

    let mut position = 0u64;
    let positioned: Vec<(usize, &Value, u64)> = kept
        .map(|(i, v)| {
            position += 1;
            (i, v, position)
        })
        .collect();

    let mut report = NormalizationReport::default();
    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for (index, value, pos) in positioned {
        match Record::new(value).and_then(|r| parse_log(&r, pos)) {
            Ok(entry) => {
                if !seen.insert(entry.id) {
                    report.drop_record(index, &NormalizeError::DuplicateId(entry.id.to_string()));
                    continue;
                }
                entities.push(entry);
            }
            Err(e) => report.drop_record(index, &e),
        }
    }
    report.accepted = entities.len();
    Normalized { entities, report }
}

fn parse_log(r: &Record<'_>, position: u64) -> Result<LogEntry, NormalizeError> {
    let id = match r.get(&["id"]) {
        Some(_) => r.required_u64("id", &["id"])?,
        None => position,
    };
    let status_code = r.u64_or_default("status_code", &["status_code"])?;
    let status_code = u16::try_from(status_code).map_err(|_| NormalizeError::InvalidField {
        field: "status_code",
        value: status_code.to_string(),
    })?;
    Ok(LogEntry {
        id,
        source_ip: r.string_or_default(&["ip", "source_ip"]),
        path: r.string_or_default(&["path"]),
        method: r.string_or_default(&["method"]),
        status_code,
        latency_ms: r.f64_or_default("response_time", &["response_time", "latency_ms"])?,
        timestamp_ms: r.timestamp_or_default("timestamp", &["timestamp"])?,
        user_agent: r.string_or_default(&["user_agent"]),
        api_key: r.string_or_default(&["api_key"]),
    })
}

/// Normalize the blocked-client roster
///
/// Accepts both the monitoring roster shape (`blocked_at` / `expires_at` as
/// formatted dates) and the management list shape (`addedAt` / `expiresAt`
/// as epoch seconds). An entry without a parseable expiry is dropped since
/// its `active` state could not be derived.
pub fn normalize_blocked(records: &[Value]) -> Normalized<BlockedClient> {
    normalize_batch(records.iter().enumerate(), parse_blocked, |b| {
        b.identifier.clone()
    })
}

fn parse_blocked(r: &Record<'_>) -> Result<BlockedClient, NormalizeError> {
    let identifier = r.required_str("identifier", &["identifier"])?;
    if identifier.trim().is_empty() {
        return Err(NormalizeError::MissingField("identifier"));
    }
    Ok(BlockedClient {
        identifier: identifier.to_string(),
        reason: r.string_or_default(&["reason"]),
        blocked_at_ms: r.timestamp_or_default("blocked_at", &["blocked_at", "addedAt"])?,
        expires_at_ms: r.required_timestamp("expires_at", &["expires_at", "expiresAt"])?,
    })
}

/// Normalize the correlated-incident list
pub fn normalize_incidents(records: &[Value]) -> Normalized<Incident> {
    normalize_batch(records.iter().enumerate(), parse_incident, |i| i.id.clone())
}

fn parse_incident(r: &Record<'_>) -> Result<Incident, NormalizeError> {
    let id = r.required_id_string("id", &["id", "correlation_id"])?;
    let members: Vec<IncidentMember> = r
        .get(&["alerts", "members"])
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_member).collect())
        .unwrap_or_default();
    let member_count = match r.get(&["alert_count", "member_count"]) {
        Some(_) => r.u64_or_default("alert_count", &["alert_count", "member_count"])? as usize,
        None => members.len(),
    };
    let truncated = match r.get(&["has_more", "truncated"]) {
        Some(_) => r.bool_or_default(&["has_more", "truncated"]),
        None => member_count > members.len(),
    };
    Ok(Incident {
        id,
        description: r.string_or_default(&["description"]),
        members,
        member_count,
        truncated,
        last_activity_ms: r.timestamp_or_default("last_activity", &["last_activity"])?,
    })
}

fn parse_member(value: &Value) -> Option<IncidentMember> {
    if let Some(id) = value.as_u64() {
        return Some(IncidentMember {
            alert_id: Some(id),
            reason: String::new(),
            source_ip: String::new(),
        });
    }
    let r = Record::new(value).ok()?;
    Some(IncidentMember {
        alert_id: r.required_u64("id", &["id"]).ok(),
        reason: r.string_or_default(&["reason"]),
        source_ip: r.string_or_default(&["ip", "source_ip"]),
    })
}

/// Normalize the aggregate stats object
///
/// Malformed `top_endpoints` entries are dropped and reported.
pub fn normalize_stats(body: &Value) -> Result<(AggregateStats, NormalizationReport), NormalizeError> {
    let r = Record::new(body)?;
    let mut report = NormalizationReport::default();
    let mut top_endpoints = Vec::new();

    if let Some(items) = r.get(&["top_endpoints"]).and_then(Value::as_array) {
        for (index, item) in items.iter().enumerate() {
            let parsed = Record::new(item).and_then(|e| {
                Ok(EndpointCount {
                    path: e.required_str("path", &["path"])?.to_string(),
                    count: e.u64_or_default("count", &["count"])?,
                })
            });
            match parsed {
                Ok(endpoint) => top_endpoints.push(endpoint),
                Err(e) => report.drop_record(index, &e),
            }
        }
    }
    report.accepted = top_endpoints.len();

    let stats = AggregateStats {
        total_requests: r.u64_or_default("total_requests", &["total_requests"])?,
        failed_requests: r.u64_or_default("failed_requests", &["failed_requests"])?,
        active_alerts: r.u64_or_default("active_alerts", &["active_alerts"])?,
        blocked_clients: r.u64_or_default("blocked_clients", &["blocked_clients"])?,
        top_endpoints,
    };
    Ok((stats, report))
}

/// Normalize the per-minute traffic timeline
///
/// Buckets are keyed by their minute and returned oldest first. The
/// `time` label the server adds is derived from the timestamp and ignored.
pub fn normalize_timeline(records: &[Value]) -> Normalized<TrafficBucket> {
    let mut n = normalize_batch(records.iter().enumerate(), parse_bucket, |b| b.timestamp_ms);
    n.entities.sort_by_key(|b| b.timestamp_ms);
    n
}

fn parse_bucket(r: &Record<'_>) -> Result<TrafficBucket, NormalizeError> {
    Ok(TrafficBucket {
        timestamp_ms: r.required_timestamp("timestamp", &["timestamp"])?,
        requests: r.u64_or_default("requests", &["requests", "count"])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_scenario() {
        let raw = json!([{"id": 1, "severity": "HIGH", "timestamp": 1700000000, "ip": "10.0.0.1", "resolved": false}]);
        let n = normalize_alerts(raw.as_array().unwrap());

        assert_eq!(n.entities.len(), 1);
        let alert = &n.entities[0];
        assert_eq!(alert.id, 1);
        assert_eq!(alert.timestamp_ms, 1_700_000_000_000);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.source_ip, "10.0.0.1");
        assert!(!alert.resolved);
        assert_eq!(alert.correlation_id, None);
        assert!(n.report.is_clean());
    }

    #[test]
    fn test_bad_severity_dropped_rest_kept() {
        let raw = json!([
            {"id": 1, "severity": "HIGH", "timestamp": 1700000000},
            {"id": 2, "severity": "SEVERE", "timestamp": 1700000001},
            {"severity": "LOW", "timestamp": 1700000002},
            {"id": 4, "severity": "low", "timestamp": 1700000003.5, "correlation_id": "corr_1"}
        ]);
        let n = normalize_alerts(raw.as_array().unwrap());

        let ids: Vec<_> = n.entities.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(n.report.accepted, 2);
        assert_eq!(n.report.dropped, 2);
        assert!(n.report.samples[0].starts_with("record 1:"));
        assert!(n.report.samples[0].contains("SEVERE"));
        assert!(n.report.samples[1].contains("id"));
        assert_eq!(n.entities[1].timestamp_ms, 1_700_000_003_500);
        assert_eq!(n.entities[1].correlation_id.as_deref(), Some("corr_1"));
    }

    #[test]
    fn test_out_of_range_timestamp_drops_record() {
        let raw = json!([
            {"id": 1, "severity": "HIGH", "timestamp": -1e300},
            {"id": 2, "severity": "HIGH", "timestamp": 1e300},
            {"id": 3, "severity": "HIGH", "timestamp": 1700000000}
        ]);
        let n = normalize_alerts(raw.as_array().unwrap());

        let ids: Vec<_> = n.entities.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(n.report.dropped, 2);
        assert!(n.report.samples[0].contains("timestamp"));
    }

    #[test]
    fn test_camel_case_correlation_id() {
        let raw = json!([{"id": 9, "severity": "MEDIUM", "correlationId": "corr_9"}]);
        let n = normalize_alerts(raw.as_array().unwrap());
        assert_eq!(n.entities[0].correlation_id.as_deref(), Some("corr_9"));
    }

    #[test]
    fn test_duplicate_alert_ids_first_wins() {
        let raw = json!([
            {"id": 7, "severity": "HIGH", "reason": "first"},
            {"id": "7", "severity": "LOW", "reason": "second"}
        ]);
        let n = normalize_alerts(raw.as_array().unwrap());
        assert_eq!(n.entities.len(), 1);
        assert_eq!(n.entities[0].reason, "first");
        assert_eq!(n.report.dropped, 1);
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let raw = json!([{"id": 3, "severity": "MEDIUM", "timestamp": 1700000000}]);
        let a = normalize_alerts(raw.as_array().unwrap());
        let b = normalize_alerts(raw.as_array().unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_logs_exclude_dashboard_traffic_and_assign_ids() {
        let raw = json!([
            {"ip": "1.1.1.1", "path": "/api/monitoring/stats", "method": "GET", "status_code": 200, "response_time": 1.2, "timestamp": 1700000000, "user_agent": "ui", "api_key": null},
            {"ip": "2.2.2.2", "path": "/api/balance", "method": "GET", "status_code": 401, "response_time": 3.5, "timestamp": 1700000001, "user_agent": "curl/8", "api_key": "k1"},
            {"ip": "3.3.3.3", "path": "/static/app.js", "method": "GET", "status_code": 200, "response_time": 0.4, "timestamp": 1700000002, "user_agent": "ui"},
            {"ip": "4.4.4.4", "path": "/api/transaction", "method": "POST", "status_code": 200, "response_time": 9.0, "timestamp": 1700000003, "user_agent": "python"}
        ]);
        let n = normalize_logs(raw.as_array().unwrap(), &LogExclusionConfig::default());

        assert_eq!(n.entities.len(), 2);
        assert_eq!(n.entities[0].id, 1);
        assert_eq!(n.entities[0].path, "/api/balance");
        assert_eq!(n.entities[0].api_key, "k1");
        assert_eq!(n.entities[0].timestamp_ms, 1_700_000_001_000);
        assert_eq!(n.entities[1].id, 2);
        assert_eq!(n.entities[1].method, "POST");
        assert_eq!(n.entities[1].api_key, "");
        assert!(n.report.is_clean());
    }

    #[test]
    fn test_blocked_accepts_both_shapes() {
        let raw = json!([
            {"identifier": "10.0.0.1:manual", "reason": "abuse", "blocked_at": "2023-11-14 22:13:20", "expires_at": "2023-11-14 23:13:20"},
            {"identifier": "10.0.0.2:key", "reason": "rate", "addedAt": 1700000000, "expiresAt": 1700003600},
            {"identifier": "10.0.0.3", "reason": "no expiry"}
        ]);
        let n = normalize_blocked(raw.as_array().unwrap());

        assert_eq!(n.entities.len(), 2);
        assert_eq!(n.entities[0].blocked_at_ms, 1_700_000_000_000);
        assert_eq!(n.entities[0].expires_at_ms, 1_700_003_600_000);
        assert_eq!(n.entities[1].expires_at_ms, 1_700_003_600_000);
        assert_eq!(n.report.dropped, 1);
        assert!(n.report.samples[0].contains("expires_at"));
    }

    #[test]
    fn test_incident_members_and_truncation() {
        let raw = json!([{
            "id": "corr_10.0.0.1_1700000000",
            "description": "Burst of failed logins",
            "alerts": [
                {"id": 11, "reason": "Brute force", "ip": "10.0.0.1"},
                {"reason": "Rate limit", "ip": "10.0.0.1"},
                12
            ],
            "alert_count": 5,
            "has_more": true,
            "last_activity": 1700000500
        }]);
        let n = normalize_incidents(raw.as_array().unwrap());
        let incident = &n.entities[0];

        assert_eq!(incident.members.len(), 3);
        assert_eq!(incident.members[0].alert_id, Some(11));
        assert_eq!(incident.members[1].alert_id, None);
        assert_eq!(incident.members[2].alert_id, Some(12));
        assert_eq!(incident.member_count, 5);
        assert!(incident.truncated);
        assert_eq!(incident.last_activity_ms, 1_700_000_500_000);
    }

    #[test]
    fn test_incident_truncation_inferred() {
        let raw = json!([{"id": "i1", "alerts": [1], "alert_count": 4}]);
        let n = normalize_incidents(raw.as_array().unwrap());
        assert!(n.entities[0].truncated);
    }

    #[test]
    fn test_stats_defaults_and_bad_endpoint() {
        let body = json!({
            "total_requests": 120,
            "failed_requests": 7,
            "top_endpoints": [{"path": "/api/balance", "count": 80}, {"count": 3}]
        });
        let (stats, report) = normalize_stats(&body).unwrap();
        assert_eq!(stats.total_requests, 120);
        assert_eq!(stats.active_alerts, 0);
        assert_eq!(stats.top_endpoints.len(), 1);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn test_timeline_sorted_and_bad_buckets_dropped() {
        let records = vec![
            json!({"timestamp": 1700000060, "time": "22:14", "requests": 7}),
            json!({"timestamp": 1700000000, "time": "22:13", "requests": 3}),
            json!({"time": "22:15", "requests": 1}),
            json!({"timestamp": 1700000060, "time": "22:14", "requests": 9}),
            json!({"timestamp": 1700000120, "requests": "many"}),
        ];
        let n = normalize_timeline(&records);
        assert_eq!(
            n.entities,
            vec![
                TrafficBucket { timestamp_ms: 1_700_000_000_000, requests: 3 },
                TrafficBucket { timestamp_ms: 1_700_000_060_000, requests: 7 },
            ]
        );
        assert_eq!(n.report.accepted, 2);
        assert_eq!(n.report.dropped, 3);
    }

    #[test]
    fn test_wrong_payload_shape() {
        let normalizer = Normalizer::default();
        let err = normalizer
            .normalize(Resource::Alerts, &json!({"error": "boom"}))
            .unwrap_err();
        assert_eq!(err, NormalizeError::NotAnArray(Resource::Alerts));

        assert!(normalizer.normalize(Resource::Stats, &json!([])).is_err());
    }

    #[test]
    fn test_normalizer_dispatch() {
        let normalizer = Normalizer::default();
        let (snapshot, report) = normalizer
            .normalize(Resource::Blocked, &json!([]))
            .unwrap();
        assert_eq!(snapshot, Snapshot::Blocked(vec![]));
        assert_eq!(snapshot.resource(), Resource::Blocked);
        assert!(report.is_clean());
    }
}
