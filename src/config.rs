use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::models::Resource;

/// Errors raised while loading, saving or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the sync daemon and CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Monitoring API location and endpoint paths
    pub api: ApiConfig,
    /// Poll interval per resource
    pub polling: PollingConfig,
    /// Optimistic mutation bookkeeping
    pub reconciliation: ReconciliationConfig,
    /// Request-log exclusion rules
    pub logs: LogExclusionConfig,
    /// Output configuration
    pub output: OutputConfig,
}

/// Monitoring API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the monitored service, e.g. "http://127.0.0.1:5000"
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Endpoint paths, relative to `base_url`
    pub endpoints: EndpointPaths,
}

/// REST surface of the monitoring backend
///
/// `resolve_alert` must contain the `{id}` placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointPaths {
    pub stats: String,
    /// Per-minute request counts; absent in older config files
    #[serde(default = "default_timeline_path")]
    pub timeline: String,
    pub alerts: String,
    pub incidents: String,
    pub blocked: String,
    pub logs: String,
    pub resolve_alert: String,
    pub block: String,
    pub unblock: String,
}

/// Poll intervals in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub stats_ms: u64,
    #[serde(default = "default_timeline_ms")]
    pub timeline_ms: u64,
    pub alerts_ms: u64,
    pub incidents_ms: u64,
    pub blocked_ms: u64,
    pub logs_ms: u64,
}

/// Reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Staleness window as a multiple of the confirming resource's poll interval
    pub staleness_multiplier: u32,
    /// Lower bound for the staleness window in milliseconds
    pub min_staleness_ms: u64,
    /// Maximum number of undelivered notices kept for the UI
    pub notice_capacity: usize,
    /// How often pending mutations are checked for staleness between merges
    pub sweep_interval_ms: u64,
    /// Default block duration in seconds when the operator gives none
    pub default_block_secs: u64,
}

/// Paths that belong to the dashboard itself and must not show up as
/// monitored traffic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogExclusionConfig {
    pub excluded_prefixes: Vec<String>,
    pub excluded_paths: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "json", "jsonl", or "console"
    pub format: String,
    /// Output file path (if format is not "console")
    pub file_path: Option<PathBuf>,
    /// How often the daemon writes the dashboard view, in seconds
    pub render_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: ApiConfig {
                base_url: "http://127.0.0.1:5000".to_string(),
                timeout_secs: 10,
                endpoints: EndpointPaths::default(),
            },
            polling: PollingConfig {
                stats_ms: 10_000,
                timeline_ms: default_timeline_ms(),
                alerts_ms: 15_000,
                incidents_ms: 15_000,
                blocked_ms: 10_000,
                logs_ms: 5_000,
            },
            reconciliation: ReconciliationConfig {
                staleness_multiplier: 2,
                min_staleness_ms: 10_000,
                notice_capacity: 64,
                sweep_interval_ms: 1_000,
                default_block_secs: 3600,
            },
            logs: LogExclusionConfig::default(),
            output: OutputConfig {
                format: "console".to_string(),
                file_path: None,
                render_interval_secs: 10,
            },
        }
    }
}

impl Default for EndpointPaths {
    fn default() -> Self {
        EndpointPaths {
            stats: "/api/monitoring/stats".to_string(),
            timeline: default_timeline_path(),
            alerts: "/api/monitoring/alerts".to_string(),
            incidents: "/api/monitoring/correlated-incidents".to_string(),
            blocked: "/api/monitoring/blocked".to_string(),
            logs: "/api/monitoring/logs".to_string(),
            resolve_alert: "/api/monitoring/alert/{id}/resolve".to_string(),
            block: "/api/monitoring/block-ip".to_string(),
            unblock: "/api/monitoring/unblock".to_string(),
        }
    }
}

fn default_timeline_path() -> String {
    "/api/monitoring/timeline".to_string()
}

fn default_timeline_ms() -> u64 {
    10_000
}

impl Default for LogExclusionConfig {
    fn default() -> Self {
        LogExclusionConfig {
            excluded_prefixes: vec!["/api/monitoring".to_string(), "/static".to_string()],
            excluded_paths: [
                "/",
                "/logs",
                "/logs.html",
                "/index",
                "/index.html",
                "/alerts",
                "/alerts.html",
                "/favicon.ico",
                "/api/ip-management/list",
                "/ip-management/",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

impl PollingConfig {
    /// Poll interval of a resource
    pub fn interval(&self, resource: Resource) -> Duration {
        let ms = match resource {
            Resource::Stats => self.stats_ms,
            Resource::Timeline => self.timeline_ms,
            Resource::Alerts => self.alerts_ms,
            Resource::Incidents => self.incidents_ms,
            Resource::Blocked => self.blocked_ms,
            Resource::Logs => self.logs_ms,
        };
        Duration::from_millis(ms)
    }
}

impl ReconciliationConfig {
    /// Staleness window for a resource polled every `interval`
    pub fn staleness_window(&self, interval: Duration) -> Duration {
        let scaled = interval.saturating_mul(self.staleness_multiplier);
        scaled.max(Duration::from_millis(self.min_staleness_ms))
    }
}

impl LogExclusionConfig {
    /// Whether a request path is the dashboard's own traffic
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.excluded_paths.iter().any(|p| p == path)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api.base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api.base_url must start with http:// or https://, got '{}'",
                base
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::Invalid("api.timeout_secs must be > 0".to_string()));
        }
        if !self.api.endpoints.resolve_alert.contains("{id}") {
            return Err(ConfigError::Invalid(
                "api.endpoints.resolve_alert must contain the {id} placeholder".to_string(),
            ));
        }
        for resource in Resource::ALL {
            if self.polling.interval(resource).is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "polling interval for {} must be > 0",
                    resource
                )));
            }
        }
        if self.reconciliation.staleness_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.staleness_multiplier must be > 0".to_string(),
            ));
        }
        if self.reconciliation.notice_capacity == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.notice_capacity must be > 0".to_string(),
            ));
        }
        if self.reconciliation.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconciliation.sweep_interval_ms must be > 0".to_string(),
            ));
        }
        if self.output.render_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "output.render_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
