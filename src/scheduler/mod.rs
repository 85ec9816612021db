//! Per-resource poll scheduler
//!
//! Each polled resource gets its own tokio task with its own timer, so a
//! slow or failing endpoint never delays the others. A task never has
//! more than one fetch in flight; the next tick is scheduled one interval
//! after the previous fetch completes. Results are sent to the engine over
//! a channel tagged with the task's generation so the engine can drop
//! results from a task that has since been stopped or restarted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::client::{ApiError, MonitoringApi};
use crate::models::Resource;

/// Identifies one run of a resource's poll task
pub type Generation = u64;

/// Completed fetch, successful or not
#[derive(Debug)]
pub struct PollOutcome {
    pub resource: Resource,
    pub generation: Generation,
    pub result: Result<Value, ApiError>,
}

struct PollTask {
    generation: Generation,
    interval: Duration,
    trigger: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the poll tasks of all resources
pub struct PollScheduler {
    api: Arc<dyn MonitoringApi>,
    outcomes: mpsc::Sender<PollOutcome>,
    tasks: HashMap<Resource, PollTask>,
    paused: watch::Sender<bool>,
    next_generation: Generation,
}

impl PollScheduler {
    /// Create a scheduler and the receiver its poll results arrive on
    pub fn new(api: Arc<dyn MonitoringApi>) -> (Self, mpsc::Receiver<PollOutcome>) {
        let (tx, rx) = mpsc::channel(64);
        let (paused, _) = watch::channel(false);
        let scheduler = PollScheduler {
            api,
            outcomes: tx,
            tasks: HashMap::new(),
            paused,
            next_generation: 1,
        };
        (scheduler, rx)
    }

    /// Start polling a resource, fetching immediately
    ///
    /// Restarts the task if the resource is already being polled.
    pub fn start(&mut self, resource: Resource, interval: Duration) -> Generation {
        self.stop(resource);

        let generation = self.next_generation;
        self.next_generation += 1;

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_poll_task(
            resource,
            generation,
            interval,
            self.api.clone(),
            trigger_rx,
            self.paused.subscribe(),
            self.outcomes.clone(),
        ));

        log::info!(
            "Polling {} every {:?} (generation {})",
            resource,
            interval,
            generation
        );
        self.tasks.insert(
            resource,
            PollTask {
                generation,
                interval,
                trigger: trigger_tx,
                handle,
            },
        );
        generation
    }

    /// Stop polling a resource
    ///
    /// An in-flight fetch is abandoned; a result already queued for the
    /// engine is no longer current and will be discarded.
    pub fn stop(&mut self, resource: Resource) -> bool {
        match self.tasks.remove(&resource) {
            Some(task) => {
                task.handle.abort();
                log::info!("Stopped polling {} (generation {})", resource, task.generation);
                true
            }
            None => false,
        }
    }

    /// Request an immediate fetch of a resource
    ///
    /// Coalesces with a fetch already in flight or already requested.
    /// Returns false if the resource is not being polled.
    pub fn trigger_now(&self, resource: Resource) -> bool {
        match self.tasks.get(&resource) {
            Some(task) => {
                if task.trigger.try_send(()).is_err() {
                    log::debug!("Refresh of {} coalesced with pending fetch", resource);
                }
                true
            }
            None => false,
        }
    }

    /// Suspend all polling; in-flight fetches still complete
    pub fn pause_all(&self) {
        self.paused.send_replace(true);
        log::info!("Polling paused");
    }

    pub fn resume_all(&self) {
        self.paused.send_replace(false);
        log::info!("Polling resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Whether results of `generation` should still be merged
    pub fn is_current(&self, resource: Resource, generation: Generation) -> bool {
        self.tasks
            .get(&resource)
            .map_or(false, |task| task.generation == generation)
    }

    pub fn is_running(&self, resource: Resource) -> bool {
        self.tasks.contains_key(&resource)
    }

    /// Configured interval of a running resource
    pub fn interval(&self, resource: Resource) -> Option<Duration> {
        self.tasks.get(&resource).map(|task| task.interval)
    }

    /// Stop every poll task
    pub fn shutdown(&mut self) {
        for resource in Resource::ALL {
            self.stop(resource);
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.handle.abort();
        }
    }
}

async fn run_poll_task(
    resource: Resource,
    generation: Generation,
    interval: Duration,
    api: Arc<dyn MonitoringApi>,
    mut trigger: mpsc::Receiver<()>,
    mut paused: watch::Receiver<bool>,
    outcomes: mpsc::Sender<PollOutcome>,
) {
    let mut next_due = Instant::now();

    loop {
        tokio::select! {
            _ = sleep_until(next_due) => {}
            msg = trigger.recv() => {
                if msg.is_none() {
                    break;
                }
            }
        }

        // hold the tick until polling is resumed
        loop {
            let is_paused = *paused.borrow_and_update();
            if !is_paused {
                break;
            }
            if paused.changed().await.is_err() {
                return;
            }
        }

        let result = api.fetch(resource).await;

        // refresh requests that arrived during the fetch are satisfied by it
        while trigger.try_recv().is_ok() {}

        if let Err(e) = &result {
            log::debug!("Fetch of {} failed: {}", resource, e);
        }

        let outcome = PollOutcome {
            resource,
            generation,
            result,
        };
        if outcomes.send(outcome).await.is_err() {
            break;
        }

        next_due = Instant::now() + interval;
    }

    log::debug!("Poll task for {} (generation {}) exited", resource, generation);
}
