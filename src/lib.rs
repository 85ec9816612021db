pub mod client;
pub mod config;
pub mod engine;
pub mod filter;
pub mod models;
pub mod normalizer;
pub mod output;
pub mod scheduler;
pub mod store;
pub mod view;

// Re-export commonly used types
pub use client::{ApiError, HttpMonitoringClient, MonitoringApi};
pub use config::{Config, ConfigError};
pub use engine::{EngineEvent, SyncEngine};
pub use filter::{FilterCriteria, StatusFilter};
pub use models::{Alert, BlockedClient, Incident, LogEntry, Resource, Severity};
pub use normalizer::{NormalizeError, Normalizer};
pub use scheduler::PollScheduler;
pub use store::{ApplyOutcome, Notice, NoticeKind, ReconcilingStore};
