//! Sync engine
//!
//! The engine exclusively owns the reconciling store. Every state change
//! (poll completion, command completion, staleness sweep, operator command)
//! runs on `&mut self`, one at a time; network calls happen in spawned
//! tasks that only report back over channels.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::client::MonitoringApi;
use crate::config::{Config, PollingConfig};
use crate::filter::FilterCriteria;
use crate::models::{now_ms, AlertId, Resource, TimestampMs};
use crate::normalizer::{NormalizationReport, Normalizer};
use crate::scheduler::{Generation, PollOutcome, PollScheduler};
use crate::store::{ApplyOutcome, MutationId, MutationTarget, Notice, ReconcilingStore, StoreConfig};
use crate::view::{self, AlertsView, BlockedView, DashboardView, IncidentsView, LogsView};

/// Reason sent with a block when the operator gives none
pub const DEFAULT_BLOCK_REASON: &str = "Manual block from dashboard";

/// Wall-clock source in epoch milliseconds
pub type Clock = Arc<dyn Fn() -> TimestampMs + Send + Sync>;

/// Result of a command sent for an optimistic mutation
#[derive(Debug)]
pub struct CommandCompletion {
    pub mutation_id: MutationId,
    pub target: MutationTarget,
    pub result: Result<(), String>,
}

/// What the engine did with one event
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A snapshot was merged into the store
    Merged {
        resource: Resource,
        report: NormalizationReport,
    },
    /// The fetch failed; confirmed data is unchanged
    PollFailed { resource: Resource, error: String },
    /// The payload could not be normalized as a whole; nothing was merged
    PayloadRejected { resource: Resource, error: String },
    /// Result of a stopped or restarted poll task
    Discarded {
        resource: Resource,
        generation: Generation,
    },
    CommandAccepted(MutationId),
    CommandRejected(MutationId),
    Swept,
}

/// Filter criteria of each filterable view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilters {
    pub alerts: FilterCriteria,
    pub logs: FilterCriteria,
    pub blocked: FilterCriteria,
    pub incidents: FilterCriteria,
}

pub struct SyncEngine {
    store: ReconcilingStore,
    scheduler: PollScheduler,
    poll_results: mpsc::Receiver<PollOutcome>,
    completions_tx: mpsc::UnboundedSender<CommandCompletion>,
    completions_rx: mpsc::UnboundedReceiver<CommandCompletion>,
    api: Arc<dyn MonitoringApi>,
    normalizer: Normalizer,
    polling: PollingConfig,
    default_block_secs: u64,
    sweep: Interval,
    filters: ViewFilters,
    clock: Clock,
}

impl SyncEngine {
    /// Create an engine; must be called within a tokio runtime
    pub fn new(config: &Config, api: Arc<dyn MonitoringApi>) -> Self {
        let (scheduler, poll_results) = PollScheduler::new(api.clone());
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut sweep = interval(Duration::from_millis(
            config.reconciliation.sweep_interval_ms,
        ));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        SyncEngine {
            store: ReconcilingStore::new(StoreConfig::from_config(config)),
            scheduler,
            poll_results,
            completions_tx,
            completions_rx,
            api,
            normalizer: Normalizer::new(config.logs.clone()),
            polling: config.polling.clone(),
            default_block_secs: config.reconciliation.default_block_secs,
            sweep,
            filters: ViewFilters::default(),
            clock: Arc::new(now_ms),
        }
    }

    /// Replace the wall clock used for timestamps and staleness
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> TimestampMs {
        (self.clock)()
    }

    // =====================
    // Polling control
    // =====================

    /// Start polling every resource at its configured interval
    pub fn start(&mut self) {
        for resource in Resource::ALL {
            self.start_resource(resource);
        }
    }

    pub fn start_resource(&mut self, resource: Resource) -> Generation {
        self.scheduler.start(resource, self.polling.interval(resource))
    }

    pub fn stop_resource(&mut self, resource: Resource) -> bool {
        self.scheduler.stop(resource)
    }

    /// Fetch a resource now (coalesced with any fetch in flight)
    pub fn refresh(&self, resource: Resource) -> bool {
        self.scheduler.trigger_now(resource)
    }

    pub fn pause(&self) {
        self.scheduler.pause_all();
    }

    pub fn resume(&self) {
        self.scheduler.resume_all();
    }

    pub fn is_polling(&self, resource: Resource) -> bool {
        self.scheduler.is_running(resource)
    }

    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        log::info!("Sync engine stopped");
    }

    // =====================
    // Operator commands
    // =====================

    pub fn resolve_alert(&mut self, alert_id: AlertId) -> ApplyOutcome {
        self.issue(MutationTarget::ResolveAlert { alert_id })
    }

    /// Block an address; reason and duration fall back to the defaults
    pub fn block(
        &mut self,
        address: &str,
        reason: Option<&str>,
        duration_secs: Option<u64>,
    ) -> ApplyOutcome {
        self.issue(MutationTarget::Block {
            address: address.trim().to_string(),
            reason: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(DEFAULT_BLOCK_REASON)
                .to_string(),
            duration_secs: duration_secs.unwrap_or(self.default_block_secs),
        })
    }

    pub fn unblock(&mut self, identifier: &str) -> ApplyOutcome {
        self.issue(MutationTarget::Unblock {
            identifier: identifier.to_string(),
        })
    }

    /// Apply locally, then send the command in the background
    fn issue(&mut self, target: MutationTarget) -> ApplyOutcome {
        let now = self.now();
        let outcome = self.store.apply_mutation(target.clone(), now);

        let Some(mutation_id) = outcome.issued() else {
            if let ApplyOutcome::Conflict(pending) = &outcome {
                log::warn!("{}: waiting on {} to settle", target, pending);
            } else {
                log::debug!("{}: nothing to send ({:?})", target, outcome);
            }
            return outcome;
        };

        log::info!("Sending {} ({})", target, mutation_id);
        let api = self.api.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.execute(&target).await.map_err(|e| e.to_string());
            // engine may be gone by now
            let _ = tx.send(CommandCompletion {
                mutation_id,
                target,
                result,
            });
        });
        outcome
    }

    // =====================
    // Event loop
    // =====================

    /// Wait for the next event and process it
    pub async fn next_event(&mut self) -> EngineEvent {
        tokio::select! {
            Some(outcome) = self.poll_results.recv() => self.handle_poll(outcome),
            Some(done) = self.completions_rx.recv() => self.handle_completion(done),
            _ = self.sweep.tick() => {
                self.sweep_stale();
                EngineEvent::Swept
            }
        }
    }

    pub fn handle_poll(&mut self, outcome: PollOutcome) -> EngineEvent {
        let PollOutcome {
            resource,
            generation,
            result,
        } = outcome;

        if !self.scheduler.is_current(resource, generation) {
            log::debug!(
                "Discarding {} result from stopped poll task (generation {})",
                resource,
                generation
            );
            return EngineEvent::Discarded {
                resource,
                generation,
            };
        }

        let now = self.now();
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Polling {} failed: {}", resource, e);
                let error = e.to_string();
                self.store.record_fetch_failure(resource, &error, now);
                return EngineEvent::PollFailed { resource, error };
            }
        };

        match self.normalizer.normalize(resource, &body) {
            Ok((snapshot, report)) => {
                if !report.is_clean() {
                    log::warn!(
                        "Dropped {} malformed {} record(s): {}",
                        report.dropped,
                        resource,
                        report.samples.join("; ")
                    );
                }
                self.store.record_normalization(resource, &report, now);
                self.store.merge(snapshot, now);
                EngineEvent::Merged { resource, report }
            }
            Err(e) => {
                log::warn!("Rejected {} payload: {}", resource, e);
                let error = e.to_string();
                self.store.record_payload_error(resource, &error, now);
                EngineEvent::PayloadRejected { resource, error }
            }
        }
    }

    pub fn handle_completion(&mut self, done: CommandCompletion) -> EngineEvent {
        match done.result {
            Ok(()) => {
                if self.store.command_succeeded(done.mutation_id) {
                    log::info!("{} accepted ({})", done.target, done.mutation_id);
                    self.refresh_confirming(&done.target);
                }
                EngineEvent::CommandAccepted(done.mutation_id)
            }
            Err(reason) => {
                let now = self.now();
                self.store.command_failed(done.mutation_id, &reason, now);
                EngineEvent::CommandRejected(done.mutation_id)
            }
        }
    }

    /// Poll the resources an accepted command changes, so confirmation does
    /// not wait for the next regular tick
    fn refresh_confirming(&self, target: &MutationTarget) {
        self.scheduler.trigger_now(target.resource());
        // resolving also lifts the matching block server-side
        if let MutationTarget::ResolveAlert { .. } = target {
            self.scheduler.trigger_now(Resource::Blocked);
        }
        self.scheduler.trigger_now(Resource::Stats);
    }

    /// Time out stale pending mutations without waiting for a merge
    pub fn sweep_stale(&mut self) {
        let now = self.now();
        self.store.sweep_stale(now);
    }

    // =====================
    // Views
    // =====================

    pub fn store(&self) -> &ReconcilingStore {
        &self.store
    }

    pub fn filters(&self) -> &ViewFilters {
        &self.filters
    }

    /// Views pick up changed criteria on the next read
    pub fn filters_mut(&mut self) -> &mut ViewFilters {
        &mut self.filters
    }

    pub fn clear_filters(&mut self) {
        self.filters = ViewFilters::default();
    }

    pub fn alerts_view(&self) -> AlertsView {
        view::alerts_view(&self.store, &self.filters.alerts, self.now())
    }

    pub fn logs_view(&self) -> LogsView {
        view::logs_view(&self.store, &self.filters.logs, self.now())
    }

    pub fn blocked_view(&self) -> BlockedView {
        view::blocked_view(&self.store, &self.filters.blocked, self.now())
    }

    pub fn incidents_view(&self) -> IncidentsView {
        view::incidents_view(&self.store, &self.filters.incidents, self.now())
    }

    pub fn dashboard(&self) -> DashboardView {
        view::dashboard_view(&self.store, self.now())
    }

    /// Take the notices raised since the last call
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.store.drain_notices()
    }
}
