//! Replica health document and the probe used by the uptime daemon.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Online,
    InProgress,
    Error,
}

/// Body of `GET /health` and `POST /lifecycle`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: HealthStatus,
    #[serde(default)]
    pub message: String,
    /// Webhook urls this replica registered.
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub ssl: String,
}

impl HealthDto {
    /// Whether every registered webhook url belongs to `base_url`.
    pub fn is_owned_by(&self, base_url: &str) -> bool {
        self.urls.iter().all(|u| u.contains(base_url))
    }
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Ping `{base_url}/health`.
    async fn probe(&self, base_url: &str) -> Result<HealthDto>;
}

#[derive(Clone, Debug)]
pub struct HttpHealthProbe {
    http: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("health probe client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, base_url: &str) -> Result<HealthDto> {
        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let resp = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("health probe {url}"))
            } else {
                Error::External(format!("health probe {url}: {e}"))
            }
        })?;

        if !resp.status().is_success() {
            return Err(Error::External(format!(
                "health probe {url}: status {}",
                resp.status()
            )));
        }

        resp.json::<HealthDto>()
            .await
            .map_err(|e| Error::External(format!("health probe {url}: invalid body: {e}")))
    }
}
