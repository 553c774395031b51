//! HTTP health probing of a deployed application.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{KdeployError, Result, ToolError};

use super::EndpointProber;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Outcome of a single probe.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProbeResult {
    /// Probed URL.
    pub url: String,
    /// Whether the endpoint answered with a non-error status.
    pub healthy: bool,
    /// HTTP status code, if a response arrived.
    pub status_code: Option<u16>,
    /// Response time in milliseconds.
    pub response_time_ms: Option<u64>,
    /// Error message, if any.
    pub error: Option<String>,
}

/// HTTP prober for application endpoints.
#[derive(Debug, Clone)]
pub struct HttpProber {
    /// HTTP client.
    client: Client,
}

impl HttpProber {
    /// Creates a prober with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a prober with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                KdeployError::Tool(ToolError::Http {
                    message: format!("Failed to create HTTP client: {e}"),
                })
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointProber for HttpProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        let start = Instant::now();

        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let elapsed = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let healthy = !status.is_client_error() && !status.is_server_error();
                debug!("Probe {url}: {status} in {elapsed}ms");

                ProbeResult {
                    url: url.to_string(),
                    healthy,
                    status_code: Some(status.as_u16()),
                    response_time_ms: Some(elapsed),
                    error: (!healthy).then(|| format!("HTTP {status}")),
                }
            }
            Err(e) => {
                warn!("Probe {url} failed: {e}");
                ProbeResult {
                    url: url.to_string(),
                    healthy: false,
                    status_code: None,
                    response_time_ms: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
