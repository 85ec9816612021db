use serde::Serialize;
use std::fmt;

use crate::models::{AlertId, BlockedClient, Resource, TimestampMs};

/// Identifier of one optimistic mutation, unique per store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MutationId(pub u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// What an operator command changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationTarget {
    ResolveAlert {
        alert_id: AlertId,
    },
    Block {
        address: String,
        reason: String,
        duration_secs: u64,
    },
    Unblock {
        identifier: String,
    },
}

impl MutationTarget {
    /// Resource whose snapshots confirm or refute this mutation
    pub fn resource(&self) -> Resource {
        match self {
            MutationTarget::ResolveAlert { .. } => Resource::Alerts,
            MutationTarget::Block { .. } | MutationTarget::Unblock { .. } => Resource::Blocked,
        }
    }

    /// Two targets are duplicates when they act on the same entity the same
    /// way; block parameters do not matter.
    pub fn is_duplicate_of(&self, other: &MutationTarget) -> bool {
        match (self, other) {
            (
                MutationTarget::ResolveAlert { alert_id: a },
                MutationTarget::ResolveAlert { alert_id: b },
            ) => a == b,
            (MutationTarget::Block { address: a, .. }, MutationTarget::Block { address: b, .. }) => {
                a == b
            }
            (
                MutationTarget::Unblock { identifier: a },
                MutationTarget::Unblock { identifier: b },
            ) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MutationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationTarget::ResolveAlert { alert_id } => write!(f, "resolve alert #{}", alert_id),
            MutationTarget::Block { address, .. } => write!(f, "block {}", address),
            MutationTarget::Unblock { identifier } => write!(f, "unblock {}", identifier),
        }
    }
}

/// A mutation applied locally and not yet corroborated by a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMutation {
    pub id: MutationId,
    pub target: MutationTarget,
    pub applied_at_ms: TimestampMs,
    /// The authority accepted the command; waiting for a poll to show it
    pub acknowledged: bool,
}

impl PendingMutation {
    /// Placeholder roster entry shown while a block is pending
    pub(crate) fn placeholder_block(&self) -> Option<BlockedClient> {
        match &self.target {
            MutationTarget::Block {
                address,
                reason,
                duration_secs,
            } => {
                let duration_ms = i64::try_from(duration_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
                Some(BlockedClient {
                    identifier: address.clone(),
                    reason: reason.clone(),
                    blocked_at_ms: self.applied_at_ms,
                    expires_at_ms: self.applied_at_ms.saturating_add(duration_ms),
                })
            }
            _ => None,
        }
    }
}

/// Result of asking the store to apply a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Applied locally; the caller must issue the network command
    Applied(MutationId),
    /// The same mutation is already pending; nothing to send
    AlreadyPending(MutationId),
    /// The visible state already shows the effect; nothing to send
    AlreadySatisfied,
    /// The target entity is not in the visible collection
    UnknownEntity,
    /// Another pending mutation on the same entity must settle first
    Conflict(MutationId),
}

impl ApplyOutcome {
    /// Mutation id whose command must go out, if any
    pub fn issued(&self) -> Option<MutationId> {
        match self {
            ApplyOutcome::Applied(id) => Some(*id),
            _ => None,
        }
    }
}
