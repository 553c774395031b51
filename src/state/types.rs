//! State types for tracking a deployment's lifecycle.
//!
//! One `DeploymentState` record exists per named deployment. Its `status`
//! is the single source of truth for which lifecycle phase the deployment is
//! in; only the orchestrator and the destroy reconciler write it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::namespace_for;
use crate::orchestrator::DeployPhase;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept per deployment.
const MAX_HISTORY: usize = 50;

/// The persisted record of one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Deployment name.
    pub name: String,
    /// State format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: DeploymentStatus,
    /// Installed application, populated once installation succeeds.
    #[serde(default)]
    pub application: Option<ApplicationInfo>,
    /// Last orchestrator phase entered.
    #[serde(default)]
    pub phase: Option<DeployPhase>,
    /// Hash of the config used by the last successful deploy.
    #[serde(default)]
    pub config_hash: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
    /// Recent deploy and destroy runs.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    /// Record created, nothing attempted yet.
    #[default]
    Pending,
    /// A deploy run is in progress.
    Deploying,
    /// Installed without TLS, waiting for DNS records.
    WaitingDns,
    /// Installed and serving.
    Running,
    /// The last run failed.
    Failed,
    /// Torn down.
    Destroyed,
}

/// The installed application recorded after a successful install.
///
/// Every field is optional on read so older or hand-edited records still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationInfo {
    /// Application version reported by the release.
    #[serde(default)]
    pub app_version: Option<String>,
    /// Version of the bundled HPS component.
    #[serde(default)]
    pub hps_version: Option<String>,
    /// Installed chart version.
    #[serde(default)]
    pub chart_version: Option<String>,
    /// Namespace the release lives in.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Public URL of the application.
    #[serde(default)]
    pub url: Option<String>,
    /// Helm release name.
    #[serde(default)]
    pub release_name: Option<String>,
    /// Whether TLS has been enabled.
    #[serde(default)]
    pub tls_enabled: bool,
}

/// A single deploy or destroy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: Operation,
    /// Whether the run succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of lifecycle operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Deploy run.
    Deploy,
    /// Partial-infrastructure cleanup after a failed deploy.
    Cleanup,
    /// Destroy run.
    Destroy,
}

fn default_version() -> String {
    STATE_VERSION.to_string()
}

impl DeploymentState {
    /// Creates a new pending deployment record.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            version: STATE_VERSION.to_string(),
            status: DeploymentStatus::Pending,
            application: None,
            phase: None,
            config_hash: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// Updates the status.
    pub fn set_status(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.touch();
    }

    /// Records the phase the orchestrator just entered.
    pub fn set_phase(&mut self, phase: DeployPhase) {
        self.phase = Some(phase);
        self.touch();
    }

    /// Records the installed application.
    pub fn set_application(&mut self, application: ApplicationInfo) {
        self.application = Some(application);
        self.touch();
    }

    /// Returns the namespace, falling back to derivation from the name.
    #[must_use]
    pub fn namespace(&self) -> String {
        self.application
            .as_ref()
            .and_then(|a| a.namespace.clone())
            .unwrap_or_else(|| namespace_for(&self.name))
    }

    /// Returns the release name, falling back to the deployment name.
    #[must_use]
    pub fn release_name(&self) -> String {
        self.application
            .as_ref()
            .and_then(|a| a.release_name.clone())
            .unwrap_or_else(|| self.name.clone())
    }

    /// Returns true if TLS has been enabled for the installed application.
    #[must_use]
    pub fn tls_enabled(&self) -> bool {
        self.application.as_ref().is_some_and(|a| a.tls_enabled)
    }

    /// Adds a history entry, dropping the oldest beyond the retention limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
        self.touch();
    }

    /// Updates the modification timestamp.
    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl HistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn succeeded(run_id: Uuid, operation: Operation) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            operation,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(run_id: Uuid, operation: Operation, error: &str) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            operation,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::WaitingDns => "waiting-dns",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Destroyed => "destroyed",
        };
        write!(f, "{status}")
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Deploy => "deploy",
            Self::Cleanup => "cleanup",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
