//! Reconciling store
//!
//! Holds the last confirmed snapshot of every resource together with the
//! optimistic mutations that have not been corroborated yet. Readers never
//! see the confirmed collections directly: alerts and the blocked roster are
//! derived on every read by replaying pending mutation effects over the
//! confirmed data, so a mutation stays visible from the moment it is applied
//! until a snapshot either confirms it or it is rolled back.
//!
//! Rollback is therefore just "forget the pending mutation": the next read
//! shows the confirmed state again.

pub mod mutation;
pub mod notice;

pub use mutation::{ApplyOutcome, MutationId, MutationTarget, PendingMutation};
pub use notice::{Notice, NoticeKind};

use std::collections::{HashMap, VecDeque};

use crate::config::Config;
use crate::models::blocked;
use crate::models::{
    AggregateStats, Alert, BlockedClient, Incident, LogEntry, Resource, TimestampMs, TrafficBucket,
};
use crate::normalizer::{NormalizationReport, Snapshot};

/// Store tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Staleness window for mutations confirmed by the alert list
    pub alerts_staleness_ms: i64,
    /// Staleness window for mutations confirmed by the blocked roster
    pub blocked_staleness_ms: i64,
    /// Maximum number of queued notices; the oldest are discarded first
    pub notice_capacity: usize,
}

impl StoreConfig {
    pub fn from_config(config: &Config) -> Self {
        let window = |resource| {
            let w = config
                .reconciliation
                .staleness_window(config.polling.interval(resource));
            i64::try_from(w.as_millis()).unwrap_or(i64::MAX)
        };
        StoreConfig {
            alerts_staleness_ms: window(Resource::Alerts),
            blocked_staleness_ms: window(Resource::Blocked),
            notice_capacity: config.reconciliation.notice_capacity,
        }
    }

    fn staleness_ms(&self, resource: Resource) -> i64 {
        match resource {
            Resource::Alerts => self.alerts_staleness_ms,
            Resource::Blocked => self.blocked_staleness_ms,
            _ => i64::MAX,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::from_config(&Config::default())
    }
}

/// Why a pending mutation left the pending set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Confirmed,
    TimedOut,
}

pub struct ReconcilingStore {
    alerts: Vec<Alert>,
    blocked: Vec<BlockedClient>,
    incidents: Vec<Incident>,
    logs: Vec<LogEntry>,
    stats: Option<AggregateStats>,
    timeline: Vec<TrafficBucket>,
    last_merged: HashMap<Resource, TimestampMs>,
    pending: Vec<PendingMutation>,
    next_mutation_id: u64,
    notices: VecDeque<Notice>,
    config: StoreConfig,
}

impl ReconcilingStore {
    pub fn new(config: StoreConfig) -> Self {
        ReconcilingStore {
            alerts: Vec::new(),
            blocked: Vec::new(),
            incidents: Vec::new(),
            logs: Vec::new(),
            stats: None,
            timeline: Vec::new(),
            last_merged: HashMap::new(),
            pending: Vec::new(),
            next_mutation_id: 1,
            notices: VecDeque::new(),
            config,
        }
    }

    // =====================
    // Derived views
    // =====================

    /// Alerts as the operator should see them: confirmed alerts with pending
    /// resolves applied
    pub fn alerts(&self) -> Vec<Alert> {
        let mut alerts = self.alerts.clone();
        for m in &self.pending {
            if let MutationTarget::ResolveAlert { alert_id } = m.target {
                if let Some(alert) = alerts.iter_mut().find(|a| a.id == alert_id) {
                    alert.resolved = true;
                }
            }
        }
        alerts
    }

    /// Blocked roster with pending blocks and unblocks applied, in
    /// application order
    pub fn blocked_clients(&self) -> Vec<BlockedClient> {
        let mut roster = self.blocked.clone();
        for m in &self.pending {
            match &m.target {
                MutationTarget::Block { address, .. } => {
                    let covered = roster.iter().any(|c| {
                        (c.identifier == *address || c.address() == address)
                            && c.expires_at_ms > m.applied_at_ms
                    });
                    if !covered {
                        if let Some(placeholder) = m.placeholder_block() {
                            roster.insert(0, placeholder);
                        }
                    }
                }
                MutationTarget::Unblock { identifier } => {
                    roster.retain(|c| c.identifier != *identifier);
                }
                MutationTarget::ResolveAlert { .. } => {}
            }
        }
        roster
    }

    /// Whether a roster entry exists only as a pending block's placeholder
    pub fn is_placeholder(&self, client: &BlockedClient) -> bool {
        self.placeholder_owner(client).is_some()
    }

    /// Pending block whose placeholder is `client`, if it is not confirmed
    fn placeholder_owner(&self, client: &BlockedClient) -> Option<MutationId> {
        if self.blocked.contains(client) {
            return None;
        }
        self.pending
            .iter()
            .find(|m| m.placeholder_block().as_ref() == Some(client))
            .map(|m| m.id)
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn stats(&self) -> Option<&AggregateStats> {
        self.stats.as_ref()
    }

    pub fn timeline(&self) -> &[TrafficBucket] {
        &self.timeline
    }

    pub fn pending_mutations(&self) -> &[PendingMutation] {
        &self.pending
    }

    pub fn pending(&self, id: MutationId) -> Option<&PendingMutation> {
        self.pending.iter().find(|m| m.id == id)
    }

    /// When the last snapshot of `resource` was merged
    pub fn last_merged_at(&self, resource: Resource) -> Option<TimestampMs> {
        self.last_merged.get(&resource).copied()
    }

    // =====================
    // Optimistic mutations
    // =====================

    /// Apply a mutation to the derived view and record it as pending
    ///
    /// Re-applying a mutation that is already pending, or whose effect is
    /// already visible, is a no-op and yields no command to send.
    pub fn apply_mutation(&mut self, target: MutationTarget, now_ms: TimestampMs) -> ApplyOutcome {
        if let Some(existing) = self.pending.iter().find(|m| m.target.is_duplicate_of(&target)) {
            log::debug!("{} already pending as {}", target, existing.id);
            return ApplyOutcome::AlreadyPending(existing.id);
        }

        match &target {
            MutationTarget::ResolveAlert { alert_id } => {
                match self.alerts().iter().find(|a| a.id == *alert_id) {
                    None => return ApplyOutcome::UnknownEntity,
                    Some(alert) if alert.resolved => return ApplyOutcome::AlreadySatisfied,
                    Some(_) => {}
                }
            }
            MutationTarget::Block { address, .. } => {
                let unblocking = self.pending.iter().find(|m| match &m.target {
                    MutationTarget::Unblock { identifier } => {
                        identifier == address || blocked::address_of(identifier) == address
                    }
                    _ => false,
                });
                if let Some(unblock) = unblocking {
                    log::debug!("{} conflicts with pending {}", target, unblock.id);
                    return ApplyOutcome::Conflict(unblock.id);
                }
                let already = self.blocked_clients().iter().any(|c| {
                    (c.identifier == *address || c.address() == address) && c.is_active(now_ms)
                });
                if already {
                    return ApplyOutcome::AlreadySatisfied;
                }
            }
            MutationTarget::Unblock { identifier } => {
                let roster = self.blocked_clients();
                let Some(entry) = roster
                    .iter()
                    .find(|c| c.identifier == *identifier && c.is_active(now_ms))
                else {
                    return ApplyOutcome::AlreadySatisfied;
                };
                // the authority keys the block differently until it is confirmed
                if let Some(block) = self.placeholder_owner(entry) {
                    log::debug!("{} targets the placeholder of pending {}", target, block);
                    return ApplyOutcome::Conflict(block);
                }
            }
        }

        let id = MutationId(self.next_mutation_id);
        self.next_mutation_id += 1;
        log::debug!("applied {} optimistically as {}", target, id);
        self.pending.push(PendingMutation {
            id,
            target,
            applied_at_ms: now_ms,
            acknowledged: false,
        });
        ApplyOutcome::Applied(id)
    }

    /// The authority accepted the command; keep the mutation pending until a
    /// poll shows it. Returns false if the mutation is no longer pending.
    pub fn command_succeeded(&mut self, id: MutationId) -> bool {
        match self.pending.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.acknowledged = true;
                true
            }
            None => {
                log::debug!("acknowledgement for {} arrived after it was settled", id);
                false
            }
        }
    }

    /// The authority rejected the command (or could not be reached); roll
    /// the mutation back and report it
    pub fn command_failed(
        &mut self,
        id: MutationId,
        reason: &str,
        now_ms: TimestampMs,
    ) -> Option<PendingMutation> {
        let index = self.pending.iter().position(|m| m.id == id)?;
        let mutation = self.pending.remove(index);
        log::warn!("{} rejected, rolling back: {}", mutation.target, reason);
        self.push_notice(Notice {
            kind: NoticeKind::MutationRejected,
            subject: mutation.target.to_string(),
            message: reason.to_string(),
            at_ms: now_ms,
        });
        Some(mutation)
    }

    // =====================
    // Snapshot merges
    // =====================

    /// Merge any normalized snapshot
    pub fn merge(&mut self, snapshot: Snapshot, now_ms: TimestampMs) {
        match snapshot {
            Snapshot::Stats(stats) => self.merge_stats(stats, now_ms),
            Snapshot::Timeline(buckets) => self.merge_timeline(buckets, now_ms),
            Snapshot::Alerts(alerts) => self.merge_alerts(alerts, now_ms),
            Snapshot::Incidents(incidents) => self.merge_incidents(incidents, now_ms),
            Snapshot::Blocked(blocked) => self.merge_blocked(blocked, now_ms),
            Snapshot::Logs(logs) => self.merge_logs(logs, now_ms),
        }
    }

    pub fn merge_alerts(&mut self, fresh: Vec<Alert>, now_ms: TimestampMs) {
        self.alerts = fresh;
        self.last_merged.insert(Resource::Alerts, now_ms);
        self.reconcile(Resource::Alerts, now_ms);
    }

    pub fn merge_blocked(&mut self, fresh: Vec<BlockedClient>, now_ms: TimestampMs) {
        self.blocked = fresh;
        self.last_merged.insert(Resource::Blocked, now_ms);
        self.reconcile(Resource::Blocked, now_ms);
    }

    pub fn merge_incidents(&mut self, fresh: Vec<Incident>, now_ms: TimestampMs) {
        self.incidents = fresh;
        self.last_merged.insert(Resource::Incidents, now_ms);
    }

    pub fn merge_logs(&mut self, fresh: Vec<LogEntry>, now_ms: TimestampMs) {
        self.logs = fresh;
        self.last_merged.insert(Resource::Logs, now_ms);
    }

    pub fn merge_stats(&mut self, fresh: AggregateStats, now_ms: TimestampMs) {
        self.stats = Some(fresh);
        self.last_merged.insert(Resource::Stats, now_ms);
    }

    pub fn merge_timeline(&mut self, fresh: Vec<TrafficBucket>, now_ms: TimestampMs) {
        self.timeline = fresh;
        self.last_merged.insert(Resource::Timeline, now_ms);
    }

    /// Settle pending mutations without a new snapshot: retire those the
    /// confirmed data already reflects, time out the rest once stale
    pub fn sweep_stale(&mut self, now_ms: TimestampMs) {
        self.reconcile(Resource::Alerts, now_ms);
        self.reconcile(Resource::Blocked, now_ms);
    }

    fn reconcile(&mut self, resource: Resource, now_ms: TimestampMs) {
        let staleness_ms = self.config.staleness_ms(resource);
        let mut settled = Vec::new();

        for m in self.pending.iter().filter(|m| m.target.resource() == resource) {
            if self.is_corroborated(&m.target, now_ms) {
                settled.push((m.id, Resolution::Confirmed));
            } else if now_ms.saturating_sub(m.applied_at_ms) > staleness_ms {
                settled.push((m.id, Resolution::TimedOut));
            }
        }

        for (id, resolution) in settled {
            let Some(index) = self.pending.iter().position(|m| m.id == id) else {
                continue;
            };
            let mutation = self.pending.remove(index);
            match resolution {
                Resolution::Confirmed => {
                    log::debug!("{} ({}) confirmed by {} snapshot", mutation.target, id, resource);
                }
                Resolution::TimedOut => {
                    log::warn!(
                        "{} ({}) not confirmed within {}ms, rolling back",
                        mutation.target,
                        id,
                        staleness_ms
                    );
                    self.push_notice(Notice {
                        kind: NoticeKind::ReconciliationTimeout,
                        subject: mutation.target.to_string(),
                        message: format!(
                            "not confirmed by the server within {}s",
                            staleness_ms / 1000
                        ),
                        at_ms: now_ms,
                    });
                }
            }
        }
    }

    /// Whether the confirmed collections already show a mutation's effect
    fn is_corroborated(&self, target: &MutationTarget, now_ms: TimestampMs) -> bool {
        match target {
            MutationTarget::ResolveAlert { alert_id } => self
                .alerts
                .iter()
                .find(|a| a.id == *alert_id)
                .map_or(true, |a| a.resolved),
            MutationTarget::Block { address, .. } => self.blocked.iter().any(|c| {
                (c.identifier == *address || c.address() == address) && c.is_active(now_ms)
            }),
            MutationTarget::Unblock { identifier } => !self
                .blocked
                .iter()
                .any(|c| c.identifier == *identifier && c.is_active(now_ms)),
        }
    }

    // =====================
    // Failure reporting
    // =====================

    /// A poll failed; confirmed data is kept as is
    pub fn record_fetch_failure(&mut self, resource: Resource, error: &str, now_ms: TimestampMs) {
        self.push_notice(Notice {
            kind: NoticeKind::NetworkFailure,
            subject: resource.to_string(),
            message: error.to_string(),
            at_ms: now_ms,
        });
    }

    /// Report dropped records of a merged batch, if any
    pub fn record_normalization(
        &mut self,
        resource: Resource,
        report: &NormalizationReport,
        now_ms: TimestampMs,
    ) {
        if report.is_clean() {
            return;
        }
        let sample = report.samples.first().map(String::as_str).unwrap_or("");
        self.push_notice(Notice {
            kind: NoticeKind::NormalizationFailure,
            subject: resource.to_string(),
            message: format!("dropped {} record(s); {}", report.dropped, sample),
            at_ms: now_ms,
        });
    }

    /// A whole payload could not be normalized; nothing was merged
    pub fn record_payload_error(&mut self, resource: Resource, error: &str, now_ms: TimestampMs) {
        self.push_notice(Notice {
            kind: NoticeKind::NormalizationFailure,
            subject: resource.to_string(),
            message: error.to_string(),
            at_ms: now_ms,
        });
    }

    fn push_notice(&mut self, notice: Notice) {
        while self.notices.len() >= self.config.notice_capacity.max(1) {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    /// Notices not yet shown, oldest first
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    /// Take all queued notices
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }
}

impl Default for ReconcilingStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    const T0: i64 = 1_700_000_000_000;

    fn store() -> ReconcilingStore {
        ReconcilingStore::new(StoreConfig {
            alerts_staleness_ms: 30_000,
            blocked_staleness_ms: 20_000,
            notice_capacity: 8,
        })
    }

    fn alert(id: u64, resolved: bool) -> Alert {
        Alert {
            id,
            source_ip: "10.0.0.1".to_string(),
            api_key: "key".to_string(),
            reason: "Rate limit exceeded".to_string(),
            severity: Severity::High,
            timestamp_ms: T0,
            resolved,
            correlation_id: None,
        }
    }

    fn blocked(identifier: &str, expires_at_ms: i64) -> BlockedClient {
        BlockedClient {
            identifier: identifier.to_string(),
            reason: "abuse".to_string(),
            blocked_at_ms: T0 - 1_000,
            expires_at_ms,
        }
    }

    fn resolve(alert_id: u64) -> MutationTarget {
        MutationTarget::ResolveAlert { alert_id }
    }

    fn unblock(identifier: &str) -> MutationTarget {
        MutationTarget::Unblock {
            identifier: identifier.to_string(),
        }
    }

    fn block(address: &str) -> MutationTarget {
        MutationTarget::Block {
            address: address.to_string(),
            reason: "Blocked from dashboard".to_string(),
            duration_secs: 3600,
        }
    }

    #[test]
    fn test_resolve_visible_before_any_response() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, false)], T0);

        let outcome = store.apply_mutation(resolve(1), T0 + 10);
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));
        assert!(store.alerts()[0].resolved);
        assert_eq!(store.pending_mutations().len(), 1);
    }

    #[test]
    fn test_idempotent_resolve() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, false)], T0);

        let first = store.apply_mutation(resolve(1), T0);
        let second = store.apply_mutation(resolve(1), T0 + 5);

        let id = first.issued().unwrap();
        assert_eq!(second, ApplyOutcome::AlreadyPending(id));
        assert_eq!(second.issued(), None);
        assert_eq!(store.pending_mutations().len(), 1);
    }

    #[test]
    fn test_resolve_already_resolved_or_unknown() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, true)], T0);

        assert_eq!(store.apply_mutation(resolve(1), T0), ApplyOutcome::AlreadySatisfied);
        assert_eq!(store.apply_mutation(resolve(99), T0), ApplyOutcome::UnknownEntity);
        assert!(store.pending_mutations().is_empty());
    }

    #[test]
    fn test_block_rejection_restores_roster() {
        let mut store = store();
        store.merge_blocked(vec![blocked("10.0.0.9:manual", T0 + 60_000)], T0);
        let before = store.blocked_clients();

        let id = store.apply_mutation(block("10.0.0.1"), T0).issued().unwrap();
        assert_eq!(store.blocked_clients().len(), 2);
        assert_eq!(store.blocked_clients()[0].identifier, "10.0.0.1");

        let rolled_back = store.command_failed(id, "HTTP 500", T0 + 100);
        assert!(rolled_back.is_some());
        assert_eq!(store.blocked_clients(), before);

        let notices = store.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::MutationRejected);
        assert!(notices[0].subject.contains("10.0.0.1"));
    }

    #[test]
    fn test_merge_retires_confirmed_unblock() {
        let mut store = store();
        store.merge_blocked(
            vec![
                blocked("10.0.0.1:manual", T0 + 60_000),
                blocked("10.0.0.2:manual", T0 + 60_000),
            ],
            T0,
        );

        let id = store.apply_mutation(unblock("10.0.0.1:manual"), T0).issued().unwrap();
        assert!(store.command_succeeded(id));
        assert_eq!(store.blocked_clients().len(), 1);
        assert!(store.pending(id).unwrap().acknowledged);

        store.merge_blocked(vec![blocked("10.0.0.2:manual", T0 + 60_000)], T0 + 5_000);

        let roster = store.blocked_clients();
        assert_eq!(roster.len(), 1);
        assert!(roster.iter().all(|c| c.identifier != "10.0.0.1:manual"));
        assert!(store.pending_mutations().is_empty());
        assert!(store.drain_notices().is_empty());
    }

    #[test]
    fn test_snapshot_started_before_mutation_does_not_undo_it() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, false), alert(2, false)], T0);
        store.apply_mutation(resolve(1), T0 + 1_000);

        // a poll that was in flight when the resolve happened
        store.merge_alerts(vec![alert(1, false), alert(2, false)], T0 + 2_000);

        assert!(store.alerts()[0].resolved);
        assert_eq!(store.pending_mutations().len(), 1);

        store.merge_alerts(vec![alert(1, true), alert(2, false)], T0 + 15_000);
        assert!(store.alerts()[0].resolved);
        assert!(store.pending_mutations().is_empty());
    }

    #[test]
    fn test_stale_mutation_rolled_back_on_merge() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, false)], T0);
        let id = store.apply_mutation(resolve(1), T0).issued().unwrap();
        store.command_succeeded(id);

        store.merge_alerts(vec![alert(1, false)], T0 + 30_001);

        assert!(!store.alerts()[0].resolved);
        assert!(store.pending_mutations().is_empty());
        let notices = store.drain_notices();
        assert_eq!(notices[0].kind, NoticeKind::ReconciliationTimeout);
    }

    #[test]
    fn test_sweep_times_out_without_any_poll() {
        let mut store = store();
        store.merge_blocked(vec![blocked("10.0.0.1:manual", T0 + 600_000)], T0);
        store.apply_mutation(unblock("10.0.0.1:manual"), T0);

        store.sweep_stale(T0 + 20_000);
        assert!(store.blocked_clients().is_empty(), "still inside the window");

        store.sweep_stale(T0 + 20_001);
        assert_eq!(store.blocked_clients().len(), 1);
        assert_eq!(store.drain_notices()[0].kind, NoticeKind::ReconciliationTimeout);
    }

    #[test]
    fn test_block_corroborated_by_composite_identifier() {
        let mut store = store();
        store.merge_blocked(vec![], T0);
        store.apply_mutation(block("10.0.0.1"), T0);

        let placeholder = &store.blocked_clients()[0];
        assert_eq!(placeholder.expires_at_ms, T0 + 3_600_000);

        store.merge_blocked(vec![blocked("10.0.0.1:manual", T0 + 3_600_000)], T0 + 1_000);
        let roster = store.blocked_clients();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].identifier, "10.0.0.1:manual");
        assert!(store.pending_mutations().is_empty());
    }

    #[test]
    fn test_block_of_already_blocked_address() {
        let mut store = store();
        store.merge_blocked(vec![blocked("10.0.0.1:key", T0 + 60_000)], T0);
        assert_eq!(store.apply_mutation(block("10.0.0.1"), T0), ApplyOutcome::AlreadySatisfied);

        // expired entries do not count
        assert!(matches!(
            store.apply_mutation(block("10.0.0.1"), T0 + 60_000),
            ApplyOutcome::Applied(_)
        ));
    }

    #[test]
    fn test_unblock_of_unconfirmed_block_conflicts() {
        let mut store = store();
        store.merge_blocked(vec![], T0);
        let block_id = store.apply_mutation(block("10.0.0.9"), T0).issued().unwrap();

        let outcome = store.apply_mutation(unblock("10.0.0.9"), T0 + 100);
        assert_eq!(outcome, ApplyOutcome::Conflict(block_id));
        assert_eq!(outcome.issued(), None);
        assert_eq!(store.pending_mutations().len(), 1);
        assert_eq!(store.blocked_clients()[0].identifier, "10.0.0.9");

        // once confirmed, the server identifier can be unblocked
        store.merge_blocked(vec![blocked("10.0.0.9:manual", T0 + 3_600_000)], T0 + 1_000);
        assert!(store.pending_mutations().is_empty());
        let unblock_id = store
            .apply_mutation(unblock("10.0.0.9:manual"), T0 + 2_000)
            .issued()
            .unwrap();
        assert!(store.blocked_clients().is_empty());

        // a still-active entry keeps the unblock pending instead of retiring it
        store.merge_blocked(vec![blocked("10.0.0.9:manual", T0 + 3_600_000)], T0 + 3_000);
        assert!(store.pending(unblock_id).is_some());
        store.merge_blocked(vec![], T0 + 4_000);
        assert!(store.pending(unblock_id).is_none());
        assert!(store.drain_notices().is_empty());
    }

    #[test]
    fn test_block_while_unblock_pending_conflicts() {
        let mut store = store();
        store.merge_blocked(vec![blocked("10.0.0.1:manual", T0 + 60_000)], T0);
        let unblock_id = store
            .apply_mutation(unblock("10.0.0.1:manual"), T0)
            .issued()
            .unwrap();

        assert_eq!(
            store.apply_mutation(block("10.0.0.1"), T0 + 10),
            ApplyOutcome::Conflict(unblock_id)
        );
        assert!(store.blocked_clients().is_empty());
    }

    #[test]
    fn test_unblock_of_absent_identifier_is_noop() {
        let mut store = store();
        store.merge_blocked(vec![], T0);
        assert_eq!(
            store.apply_mutation(unblock("10.0.0.1:manual"), T0),
            ApplyOutcome::AlreadySatisfied
        );
    }

    #[test]
    fn test_late_ack_after_confirmation_is_ignored() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, false)], T0);
        let id = store.apply_mutation(resolve(1), T0).issued().unwrap();
        store.merge_alerts(vec![alert(1, true)], T0 + 1_000);

        assert!(!store.command_succeeded(id));
        assert!(store.command_failed(id, "late", T0 + 2_000).is_none());
        assert!(store.drain_notices().is_empty());
    }

    #[test]
    fn test_fetch_failure_keeps_confirmed_data() {
        let mut store = store();
        store.merge_alerts(vec![alert(1, false)], T0);
        store.record_fetch_failure(Resource::Alerts, "connection refused", T0 + 1);

        assert_eq!(store.alerts().len(), 1);
        let notices = store.drain_notices();
        assert_eq!(notices[0].kind, NoticeKind::NetworkFailure);
        assert_eq!(notices[0].subject, "alerts");
    }

    #[test]
    fn test_notice_queue_is_bounded() {
        let mut store = store();
        for i in 0..20 {
            store.record_fetch_failure(Resource::Logs, &format!("error {}", i), T0 + i);
        }
        let notices = store.drain_notices();
        assert_eq!(notices.len(), 8);
        assert_eq!(notices[0].message, "error 12");
    }

    #[test]
    fn test_merge_dispatch_and_last_merged() {
        let mut store = store();
        assert_eq!(store.last_merged_at(Resource::Stats), None);
        store.merge(Snapshot::Stats(AggregateStats::default()), T0);
        store.merge(Snapshot::Logs(vec![]), T0 + 1);
        let bucket = TrafficBucket { timestamp_ms: T0, requests: 4 };
        store.merge(Snapshot::Timeline(vec![bucket.clone()]), T0 + 2);

        assert!(store.stats().is_some());
        assert_eq!(store.timeline(), &[bucket][..]);
        assert_eq!(store.last_merged_at(Resource::Timeline), Some(T0 + 2));
        assert_eq!(store.last_merged_at(Resource::Stats), Some(T0));
        assert_eq!(store.last_merged_at(Resource::Logs), Some(T0 + 1));
    }
}
