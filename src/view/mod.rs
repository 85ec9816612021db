//! Display-ready projections of the store
//!
//! Projections are computed on demand from the derived collections and the
//! filter criteria of each view; they hold no state of their own.

use std::collections::HashSet;

use serde::Serialize;

use crate::filter::{self, FilterCriteria};
use crate::models::{
    AggregateStats, Alert, BlockedClient, EndpointCount, Incident, IncidentMember, LogEntry,
    Severity, TimestampMs, TrafficBucket,
};
use crate::store::ReconcilingStore;

/// Maximum number of log rows a view carries
pub const MAX_LOG_ROWS: usize = 100;
/// Member rows shown per incident
pub const INCIDENT_MEMBER_ROWS: usize = 3;
/// Alerts shown on the dashboard
pub const RECENT_ALERTS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    fn tally<'a>(alerts: impl IntoIterator<Item = &'a Alert>) -> Self {
        let mut counts = SeverityCounts::default();
        for alert in alerts {
            match alert.severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertsView {
    pub rows: Vec<Alert>,
    pub counts: SeverityCounts,
    pub total: usize,
    pub active_filters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogsView {
    pub rows: Vec<LogEntry>,
    /// Matching entries before the row cap
    pub total: usize,
    /// Share of matching entries with status >= 400, rounded percent
    pub error_rate_pct: u32,
    pub avg_latency_ms: f64,
    pub unique_sources: usize,
    pub active_filters: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedRow {
    #[serde(flatten)]
    pub client: BlockedClient,
    pub active: bool,
    /// Shown optimistically, not yet confirmed by a roster snapshot
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedView {
    pub rows: Vec<BlockedRow>,
    pub active: usize,
    pub expired: usize,
    pub active_filters: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentRow {
    pub id: String,
    pub description: String,
    pub members: Vec<IncidentMember>,
    /// Members not shown in `members`
    pub more: usize,
    pub last_activity_ms: TimestampMs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentsView {
    pub rows: Vec<IncidentRow>,
    pub active_filters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    /// Counters from the latest stats snapshot; zero before the first one
    pub stats: AggregateStats,
    pub top_endpoints: Vec<EndpointCount>,
    /// Per-minute request counts, oldest first
    pub timeline: Vec<TrafficBucket>,
    pub recent_alerts: Vec<Alert>,
    /// Active entries of the derived roster
    pub blocked_count: usize,
    pub pending_mutations: usize,
}

pub fn alerts_view(store: &ReconcilingStore, criteria: &FilterCriteria, now_ms: TimestampMs) -> AlertsView {
    let rows = filter::apply(&store.alerts(), now_ms, criteria);
    AlertsView {
        counts: SeverityCounts::tally(&rows),
        total: rows.len(),
        rows,
        active_filters: criteria.active_count(),
    }
}

pub fn logs_view(store: &ReconcilingStore, criteria: &FilterCriteria, now_ms: TimestampMs) -> LogsView {
    let matching = filter::apply(store.logs(), now_ms, criteria);
    let total = matching.len();

    let errors = matching.iter().filter(|l| l.is_error()).count();
    let error_rate_pct = if total == 0 {
        0
    } else {
        ((errors as f64 / total as f64) * 100.0).round() as u32
    };
    let avg_latency_ms = if total == 0 {
        0.0
    } else {
        matching.iter().map(|l| l.latency_ms).sum::<f64>() / total as f64
    };
    let unique_sources = matching
        .iter()
        .map(|l| l.source_ip.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mut rows = matching;
    rows.truncate(MAX_LOG_ROWS);

    LogsView {
        rows,
        total,
        error_rate_pct,
        avg_latency_ms,
        unique_sources,
        active_filters: criteria.active_count(),
    }
}

pub fn blocked_view(store: &ReconcilingStore, criteria: &FilterCriteria, now_ms: TimestampMs) -> BlockedView {
    let rows: Vec<BlockedRow> = filter::apply(&store.blocked_clients(), now_ms, criteria)
        .into_iter()
        .map(|client| BlockedRow {
            active: client.is_active(now_ms),
            pending: store.is_placeholder(&client),
            client,
        })
        .collect();
    let active = rows.iter().filter(|r| r.active).count();

    BlockedView {
        expired: rows.len() - active,
        active,
        rows,
        active_filters: criteria.active_count(),
    }
}

pub fn incidents_view(
    store: &ReconcilingStore,
    criteria: &FilterCriteria,
    now_ms: TimestampMs,
) -> IncidentsView {
    let rows = filter::apply(store.incidents(), now_ms, criteria)
        .into_iter()
        .map(incident_row)
        .collect();
    IncidentsView {
        rows,
        active_filters: criteria.active_count(),
    }
}

fn incident_row(incident: Incident) -> IncidentRow {
    let total = incident.member_count.max(incident.members.len());
    let mut members = incident.members;
    members.truncate(INCIDENT_MEMBER_ROWS);
    IncidentRow {
        more: total - members.len(),
        id: incident.id,
        description: incident.description,
        members,
        last_activity_ms: incident.last_activity_ms,
    }
}

pub fn dashboard_view(store: &ReconcilingStore, now_ms: TimestampMs) -> DashboardView {
    let stats = store.stats().cloned().unwrap_or_default();

    let mut recent_alerts = store.alerts();
    recent_alerts.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    recent_alerts.truncate(RECENT_ALERTS);

    DashboardView {
        top_endpoints: stats.top_endpoints.clone(),
        stats,
        timeline: store.timeline().to_vec(),
        recent_alerts,
        blocked_count: store
            .blocked_clients()
            .iter()
            .filter(|c| c.is_active(now_ms))
            .count(),
        pending_mutations: store.pending_mutations().len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::StatusFilter;
    use crate::models::Resource;
    use crate::store::{MutationTarget, StoreConfig};

    const T0: i64 = 1_700_000_000_000;

    fn alert(id: u64, severity: Severity, ts: i64) -> Alert {
        Alert {
            id,
            source_ip: format!("10.0.0.{}", id),
            api_key: "key".to_string(),
            reason: "Rate limit exceeded".to_string(),
            severity,
            timestamp_ms: ts,
            resolved: false,
            correlation_id: None,
        }
    }

    fn log(id: u64, ip: &str, status: u16, latency: f64) -> LogEntry {
        LogEntry {
            id,
            source_ip: ip.to_string(),
            path: "/api/balance".to_string(),
            method: "GET".to_string(),
            status_code: status,
            latency_ms: latency,
            timestamp_ms: T0,
            user_agent: "curl/8.0".to_string(),
            api_key: String::new(),
        }
    }

    fn store() -> ReconcilingStore {
        ReconcilingStore::new(StoreConfig::default())
    }

    #[test]
    fn test_alerts_view_counts() {
        let mut store = store();
        store.merge_alerts(
            vec![
                alert(1, Severity::Critical, T0),
                alert(2, Severity::High, T0),
                alert(3, Severity::High, T0),
                alert(4, Severity::Low, T0),
            ],
            T0,
        );

        let view = alerts_view(&store, &FilterCriteria::default(), T0);
        assert_eq!(view.total, 4);
        assert_eq!(view.counts.high, 2);
        assert_eq!(view.counts.medium, 0);
        assert_eq!(view.active_filters, 0);

        let criteria = FilterCriteria::default().with_severity(Severity::High);
        let view = alerts_view(&store, &criteria, T0);
        assert_eq!(view.total, 2);
        assert_eq!(view.counts.critical, 0);
        assert_eq!(view.active_filters, 1);
    }

    #[test]
    fn test_alerts_view_reflects_pending_resolve() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, Severity::High, T0)], T0);
        store.apply_mutation(MutationTarget::ResolveAlert { alert_id: 1 }, T0);

        let active = FilterCriteria::default().with_status(StatusFilter::Active);
        assert_eq!(alerts_view(&store, &active, T0).total, 0);
    }

    #[test]
    fn test_logs_view_stats() {
        let mut store = store();
        store.merge_logs(
            vec![
                log(1, "1.1.1.1", 200, 10.0),
                log(2, "1.1.1.1", 404, 20.0),
                log(3, "2.2.2.2", 500, 30.0),
            ],
            T0,
        );

        let view = logs_view(&store, &FilterCriteria::default(), T0);
        assert_eq!(view.total, 3);
        assert_eq!(view.error_rate_pct, 67);
        assert!((view.avg_latency_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(view.unique_sources, 2);
    }

    #[test]
    fn test_logs_view_caps_rows() {
        let mut store = store();
        let logs = (1..=150).map(|i| log(i, "1.1.1.1", 200, 1.0)).collect();
        store.merge_logs(logs, T0);

        let view = logs_view(&store, &FilterCriteria::default(), T0);
        assert_eq!(view.rows.len(), MAX_LOG_ROWS);
        assert_eq!(view.total, 150);
        assert_eq!(view.rows[0].id, 1);
    }

    #[test]
    fn test_empty_logs_view() {
        let view = logs_view(&store(), &FilterCriteria::default(), T0);
        assert_eq!(view.total, 0);
        assert_eq!(view.error_rate_pct, 0);
        assert_eq!(view.avg_latency_ms, 0.0);
    }

    #[test]
    fn test_blocked_view_active_and_pending() {
        let mut store = store();
        store.merge_blocked(
            vec![
                BlockedClient {
                    identifier: "10.0.0.1:manual".to_string(),
                    reason: "abuse".to_string(),
                    blocked_at_ms: T0 - 10_000,
                    expires_at_ms: T0 + 10_000,
                },
                BlockedClient {
                    identifier: "10.0.0.2:manual".to_string(),
                    reason: "abuse".to_string(),
                    blocked_at_ms: T0 - 10_000,
                    expires_at_ms: T0 - 1,
                },
            ],
            T0,
        );
        store.apply_mutation(
            MutationTarget::Block {
                address: "10.0.0.9".to_string(),
                reason: "manual".to_string(),
                duration_secs: 60,
            },
            T0,
        );

        let view = blocked_view(&store, &FilterCriteria::default(), T0);
        assert_eq!(view.rows.len(), 3);
        assert_eq!(view.active, 2);
        assert_eq!(view.expired, 1);
        assert_eq!(view.rows[0].client.identifier, "10.0.0.9");
        assert!(view.rows[0].pending);
        assert!(!view.rows[1].pending);
    }

    #[test]
    fn test_incident_rows_truncate_members() {
        let members: Vec<IncidentMember> = (1..=5)
            .map(|i| IncidentMember {
                alert_id: Some(i),
                reason: "Rate limit exceeded".to_string(),
                source_ip: "10.0.0.1".to_string(),
            })
            .collect();
        let mut store = store();
        store.merge_incidents(
            vec![Incident {
                id: "inc-1".to_string(),
                description: "burst".to_string(),
                members,
                member_count: 7,
                truncated: true,
                last_activity_ms: T0,
            }],
            T0,
        );

        let view = incidents_view(&store, &FilterCriteria::default(), T0);
        assert_eq!(view.rows[0].members.len(), INCIDENT_MEMBER_ROWS);
        assert_eq!(view.rows[0].more, 4);
    }

    #[test]
    fn test_dashboard_view() {
        let mut store = store();
        let alerts = (1..=7)
            .map(|i| alert(i, Severity::Medium, T0 + i as i64))
            .collect();
        store.merge_alerts(alerts, T0);
        store.merge_stats(
            AggregateStats {
                total_requests: 100,
                failed_requests: 4,
                active_alerts: 7,
                blocked_clients: 0,
                top_endpoints: vec![EndpointCount {
                    path: "/api/balance".to_string(),
                    count: 60,
                }],
            },
            T0,
        );
        store.merge_timeline(
            vec![TrafficBucket {
                timestamp_ms: T0 - 60_000,
                requests: 42,
            }],
            T0,
        );
        store.apply_mutation(MutationTarget::ResolveAlert { alert_id: 2 }, T0);

        let view = dashboard_view(&store, T0);
        assert_eq!(view.timeline.len(), 1);
        assert_eq!(view.timeline[0].requests, 42);
        assert_eq!(view.recent_alerts.len(), RECENT_ALERTS);
        assert_eq!(view.recent_alerts[0].id, 7);
        assert_eq!(view.top_endpoints[0].count, 60);
        assert_eq!(view.stats.total_requests, 100);
        assert_eq!(view.pending_mutations, 1);
        assert_eq!(view.blocked_count, 0);
        assert!(store.last_merged_at(Resource::Stats).is_some());
    }
}
