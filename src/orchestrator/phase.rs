//! Deployment phases and the transition table between them.

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

/// A phase of a deploy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployPhase {
    /// Loading the config and persisted state.
    Loading,
    /// Checking tools and cluster access.
    Preflight,
    /// Copying IaC templates into the workspace.
    InfraSetup,
    /// Initializing the IaC workspace.
    InfraInit,
    /// Computing the infrastructure plan.
    InfraPlan,
    /// Applying the infrastructure plan.
    InfraApply,
    /// Fetching credentials for the new cluster.
    Kubeconfig,
    /// Installing the release.
    HelmInstall,
    /// Waiting for DNS records to propagate.
    DnsWait,
    /// Upgrading the release to serve TLS.
    HelmUpgradeTls,
    /// Finished successfully.
    Complete,
    /// Finished with an error.
    Error,
    /// Asking whether to destroy partially created infrastructure.
    CleanupPrompt,
    /// Destroying partially created infrastructure.
    CleanupRunning,
    /// Cleanup attempt finished.
    CleanupComplete,
}

impl DeployPhase {
    /// Returns true if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::CleanupComplete)
    }

    /// Returns true if the phase belongs to failure handling.
    #[must_use]
    pub const fn is_failure_handling(self) -> bool {
        matches!(
            self,
            Self::Error | Self::CleanupPrompt | Self::CleanupRunning | Self::CleanupComplete
        )
    }

    /// Returns true if the run may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use DeployPhase::{
            CleanupComplete, CleanupPrompt, CleanupRunning, Complete, DnsWait, Error,
            HelmInstall, HelmUpgradeTls, InfraApply, InfraInit, InfraPlan, InfraSetup,
            Kubeconfig, Loading, Preflight,
        };

        if !self.is_failure_handling()
            && !matches!(self, Complete)
            && matches!(next, Error | CleanupPrompt)
        {
            return true;
        }

        matches!(
            (self, next),
            (Loading, Preflight)
                | (Preflight, InfraSetup | InfraInit | HelmInstall | DnsWait)
                | (InfraSetup, InfraInit)
                | (InfraInit, InfraPlan)
                | (InfraPlan, InfraApply)
                | (InfraApply, Kubeconfig)
                | (Kubeconfig, HelmInstall)
                | (HelmInstall, Complete | DnsWait)
                | (DnsWait, HelmUpgradeTls | Complete)
                | (HelmUpgradeTls, Complete)
                | (CleanupPrompt, CleanupRunning | Error)
                | (CleanupRunning, CleanupComplete)
        )
    }

    /// Returns true if the phase touches infrastructure.
    #[must_use]
    pub const fn is_infra(self) -> bool {
        matches!(
            self,
            Self::InfraSetup | Self::InfraInit | Self::InfraPlan | Self::InfraApply | Self::Kubeconfig
        )
    }
}

impl std::fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            Self::Loading => "loading",
            Self::Preflight => "preflight",
            Self::InfraSetup => "infra-setup",
            Self::InfraInit => "infra-init",
            Self::InfraPlan => "infra-plan",
            Self::InfraApply => "infra-apply",
            Self::Kubeconfig => "kubeconfig",
            Self::HelmInstall => "helm-install",
            Self::DnsWait => "dns-wait",
            Self::HelmUpgradeTls => "helm-upgrade-tls",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::CleanupPrompt => "cleanup-prompt",
            Self::CleanupRunning => "cleanup-running",
            Self::CleanupComplete => "cleanup-complete",
        };
        write!(f, "{phase}")
    }
}

/// Tracks the current phase and every phase entered during a run.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    /// Current phase.
    current: DeployPhase,
    /// Phases entered so far, starting with `Loading`.
    trace: Vec<DeployPhase>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    /// Creates a machine in the `Loading` phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: DeployPhase::Loading,
            trace: vec![DeployPhase::Loading],
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn current(&self) -> DeployPhase {
        self.current
    }

    /// Returns every phase entered so far.
    #[must_use]
    pub fn trace(&self) -> &[DeployPhase] {
        &self.trace
    }

    /// Moves to the next phase.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the table forbids the move.
    pub fn advance(&mut self, next: DeployPhase) -> Result<()> {
        if !self.current.can_transition_to(next) {
            return Err(DeployError::InvalidTransition {
                from: self.current.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.current = next;
        self.trace.push(next);
        Ok(())
    }
}
