//! Monitoring API client
//!
//! The engine talks to the monitoring backend only through the
//! [`MonitoringApi`] trait, so tests can swap in scripted implementations.
//! [`HttpMonitoringClient`] is the reqwest-backed production client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{ApiConfig, EndpointPaths};
use crate::models::{AlertId, Resource};
use crate::store::MutationTarget;

/// Errors that can occur talking to the monitoring API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },
}

/// REST surface of the monitoring backend
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// GET the raw payload of a polled resource
    async fn fetch(&self, resource: Resource) -> Result<Value, ApiError>;

    async fn resolve_alert(&self, alert_id: AlertId) -> Result<(), ApiError>;

    async fn block(&self, address: &str, reason: &str, duration_secs: u64) -> Result<(), ApiError>;

    async fn unblock(&self, identifier: &str) -> Result<(), ApiError>;

    /// Send the command that corresponds to an optimistic mutation
    async fn execute(&self, target: &MutationTarget) -> Result<(), ApiError> {
        match target {
            MutationTarget::ResolveAlert { alert_id } => self.resolve_alert(*alert_id).await,
            MutationTarget::Block {
                address,
                reason,
                duration_secs,
            } => self.block(address, reason, *duration_secs).await,
            MutationTarget::Unblock { identifier } => self.unblock(identifier).await,
        }
    }
}

/// reqwest implementation of [`MonitoringApi`]
pub struct HttpMonitoringClient {
    base_url: String,
    endpoints: EndpointPaths,
    client: Client,
}

impl HttpMonitoringClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(HttpMonitoringClient {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoints: config.endpoints.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Full URL of a polled resource
    pub fn resource_url(&self, resource: Resource) -> String {
        let path = match resource {
            Resource::Stats => &self.endpoints.stats,
            Resource::Timeline => &self.endpoints.timeline,
            Resource::Alerts => &self.endpoints.alerts,
            Resource::Incidents => &self.endpoints.incidents,
            Resource::Blocked => &self.endpoints.blocked,
            Resource::Logs => &self.endpoints.logs,
        };
        self.url(path)
    }

    pub fn resolve_url(&self, alert_id: AlertId) -> String {
        self.url(&self.endpoints.resolve_alert.replace("{id}", &alert_id.to_string()))
    }

    async fn post(&self, url: String, body: Value) -> Result<(), ApiError> {
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("POST {} returned non-success status: {}", url, status);
            return Err(ApiError::Status {
                endpoint: url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MonitoringApi for HttpMonitoringClient {
    async fn fetch(&self, resource: Resource) -> Result<Value, ApiError> {
        let url = self.resource_url(resource);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: url,
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn resolve_alert(&self, alert_id: AlertId) -> Result<(), ApiError> {
        self.post(self.resolve_url(alert_id), json!({})).await
    }

    async fn block(&self, address: &str, reason: &str, duration_secs: u64) -> Result<(), ApiError> {
        let body = json!({
            "ip": address,
            "reason": reason,
            "duration": duration_secs,
        });
        self.post(self.url(&self.endpoints.block), body).await
    }

    async fn unblock(&self, identifier: &str) -> Result<(), ApiError> {
        self.post(self.url(&self.endpoints.unblock), json!({ "identifier": identifier }))
            .await
    }
}
