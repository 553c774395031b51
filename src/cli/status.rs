//! Read-only views over recorded deployments for `status` and `list`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Result, StateError};
use crate::orchestrator::DeployPhase;
use crate::state::{ApplicationInfo, DeploymentStatus, HistoryEntry, StateStore};
use crate::tools::{EndpointProber, ProbeResult};

/// Recorded status of one deployment, optionally with a live probe.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Deployment name.
    pub name: String,
    /// Lifecycle status.
    pub status: DeploymentStatus,
    /// Last phase entered.
    pub phase: Option<DeployPhase>,
    /// Installed application.
    pub application: Option<ApplicationInfo>,
    /// Last update of the record.
    pub updated_at: DateTime<Utc>,
    /// Most recent run.
    pub last_run: Option<HistoryEntry>,
    /// Probe of the application URL.
    pub health: Option<ProbeResult>,
}

impl StatusReport {
    /// Builds the report for a deployment.
    ///
    /// The URL is probed only when a prober is given and the deployment is
    /// running with a recorded URL.
    ///
    /// # Errors
    ///
    /// Returns an error if no state is recorded for the deployment or it
    /// cannot be read.
    pub async fn gather<S: StateStore>(
        store: &S,
        name: &str,
        prober: Option<&dyn EndpointProber>,
    ) -> Result<Self> {
        let state = store
            .load(name)
            .await?
            .ok_or_else(|| StateError::UnknownDeployment {
                name: name.to_string(),
            })?;

        let url = state.application.as_ref().and_then(|a| a.url.as_deref());
        let health = match (prober, url) {
            (Some(prober), Some(url)) if state.status == DeploymentStatus::Running => {
                Some(prober.probe(url).await)
            }
            (Some(_), _) => {
                debug!("Skipping probe for {name}: not running or no URL recorded");
                None
            }
            _ => None,
        };

        Ok(Self {
            name: state.name.clone(),
            status: state.status,
            phase: state.phase,
            last_run: state.history.last().cloned(),
            updated_at: state.updated_at,
            application: state.application,
            health,
        })
    }
}

/// One row of `kdeploy list`.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentSummary {
    /// Deployment name.
    pub name: String,
    /// Lifecycle status.
    pub status: DeploymentStatus,
    /// Public URL, if installed.
    pub url: Option<String>,
    /// Last update of the record.
    pub updated_at: DateTime<Utc>,
}

impl DeploymentSummary {
    /// Summarizes every recorded deployment, sorted by name.
    ///
    /// Records that cannot be read are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployments directory cannot be listed.
    pub async fn gather_all<S: StateStore>(store: &S) -> Result<Vec<Self>> {
        let mut names = store.list().await?;
        names.sort();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            match store.load(&name).await {
                Ok(Some(state)) => summaries.push(Self {
                    url: state.application.as_ref().and_then(|a| a.url.clone()),
                    name: state.name,
                    status: state.status,
                    updated_at: state.updated_at,
                }),
                Ok(None) => {}
                Err(e) => warn!("Skipping {name}: {e}"),
            }
        }

        Ok(summaries)
    }
}
