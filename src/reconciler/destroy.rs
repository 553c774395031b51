//! Destroy reconciler.
//!
//! Tears down whatever a deployment still owns, in dependency order. Every
//! step is attempted independently; a failed step is recorded and the next
//! one still runs.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{DeploymentConfig, DeploymentLayout, namespace_for};
use crate::error::{KdeployError, Result};
use crate::state::{DeploymentState, DeploymentStatus, HistoryEntry, Operation, StateStore};
use crate::tools::{InfraProvisioner, Toolchain, UninstallOptions};

use super::scope::{DeploymentIdentity, DeploymentScope};

/// What the operator asked to remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyRequest {
    /// Also destroy the cloud infrastructure.
    pub destroy_infra: bool,
    /// Also delete the deployment directory and state record.
    pub delete_local: bool,
    /// Skip confirmation.
    pub force: bool,
}

/// The confirmation a destroy needs before it may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "phrase", rename_all = "snake_case")]
pub enum Confirmation {
    /// A single yes/no answer.
    YesNo,
    /// The operator must type this exact phrase.
    Phrase(String),
}

impl Confirmation {
    /// Picks the confirmation for a request against a scope.
    ///
    /// Destroying existing infrastructure needs the typed phrase
    /// `destroy <name>`; anything else needs a yes/no answer.
    #[must_use]
    pub fn for_request(name: &str, scope: &DeploymentScope, request: &DestroyRequest) -> Self {
        if request.destroy_infra && scope.has_infrastructure {
            Self::Phrase(format!("destroy {name}"))
        } else {
            Self::YesNo
        }
    }

    /// Returns true if the operator's answer confirms.
    #[must_use]
    pub fn accepts(&self, answer: Option<&str>) -> bool {
        let Some(answer) = answer.map(str::trim) else {
            return false;
        };
        match self {
            Self::YesNo => answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"),
            Self::Phrase(phrase) => answer == phrase,
        }
    }
}

/// Teardown steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStepKind {
    /// Uninstall the release.
    UninstallRelease,
    /// Delete persistent volume claims.
    DeleteVolumes,
    /// Delete the namespace.
    DeleteNamespace,
    /// Destroy cloud infrastructure.
    DestroyInfrastructure,
    /// Delete local files.
    DeleteLocalFiles,
}

impl std::fmt::Display for TeardownStepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let step = match self {
            Self::UninstallRelease => "Uninstall release",
            Self::DeleteVolumes => "Delete volume claims",
            Self::DeleteNamespace => "Delete namespace",
            Self::DestroyInfrastructure => "Destroy infrastructure",
            Self::DeleteLocalFiles => "Delete local files",
        };
        write!(f, "{step}")
    }
}

/// Result of one teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step ran and succeeded.
    Success,
    /// The step ran and failed.
    Error,
    /// The step did not run.
    Skipped,
}

/// One teardown step and what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownStep {
    /// Which step.
    pub step: TeardownStepKind,
    /// Outcome.
    pub status: StepStatus,
    /// Error or skip reason.
    pub message: Option<String>,
}

impl TeardownStep {
    fn success(step: TeardownStepKind) -> Self {
        Self {
            step,
            status: StepStatus::Success,
            message: None,
        }
    }

    fn skipped(step: TeardownStepKind, reason: &str) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            message: Some(reason.to_string()),
        }
    }

    fn from_result(step: TeardownStepKind, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::success(step),
            Err(e) => {
                error!("{step} failed: {e}");
                Self {
                    step,
                    status: StepStatus::Error,
                    message: Some(e.to_string()),
                }
            }
        }
    }
}

/// How a destroy run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyOutcome {
    /// Nothing existed that the request would remove.
    NothingToDestroy,
    /// The operator did not confirm; nothing was touched.
    Cancelled,
    /// Teardown ran.
    Completed,
}

/// Summary of a destroy run.
#[derive(Debug, Clone, Serialize)]
pub struct DestroyReport {
    /// Deployment identity used for cluster queries.
    pub identity: DeploymentIdentity,
    /// What existed before teardown.
    pub scope: DeploymentScope,
    /// How the run ended.
    pub outcome: DestroyOutcome,
    /// Steps in the order they ran.
    pub steps: Vec<TeardownStep>,
}

impl DestroyReport {
    /// Returns true if any step failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Error)
    }
}

/// Receives progress from a destroy run and answers its confirmation.
#[async_trait]
pub trait DestroyOperator: Send + Sync {
    /// Called once the live scope is known.
    fn scope_discovered(&self, identity: &DeploymentIdentity, scope: &DeploymentScope);

    /// Asks for confirmation. `None` means no answer was given.
    async fn confirm(&self, confirmation: &Confirmation) -> Option<String>;

    /// Called after every teardown step.
    fn step_finished(&self, step: &TeardownStep);
}

/// Destroys a deployment's resources based on what exists right now.
pub struct DestroyReconciler<'a, S: StateStore> {
    /// Deployment name.
    name: &'a str,
    /// Deployment config, when it is still on disk.
    config: Option<&'a DeploymentConfig>,
    /// Locations of deployment files.
    layout: &'a DeploymentLayout,
    /// State store.
    store: &'a S,
    /// External tools.
    tools: Toolchain<'a>,
    /// Progress sink and confirmation source.
    operator: &'a dyn DestroyOperator,
}

impl<'a, S: StateStore> DestroyReconciler<'a, S> {
    /// Creates a new destroy reconciler.
    #[must_use]
    pub const fn new(
        name: &'a str,
        layout: &'a DeploymentLayout,
        store: &'a S,
        tools: Toolchain<'a>,
        operator: &'a dyn DestroyOperator,
    ) -> Self {
        Self {
            name,
            config: None,
            layout,
            store,
            tools,
            operator,
        }
    }

    /// Uses the deployment config to name resources the state never recorded.
    #[must_use]
    pub const fn with_config(mut self, config: Option<&'a DeploymentConfig>) -> Self {
        self.config = config;
        self
    }

    /// Runs one destroy.
    ///
    /// # Errors
    ///
    /// Returns an error if the state record cannot be read. Teardown
    /// failures are reported per step instead.
    pub async fn run(&self, request: &DestroyRequest) -> Result<DestroyReport> {
        let run_id = Uuid::new_v4();
        let state = self.store.load(self.name).await?;
        let identity = self.identity(state.as_ref());

        info!(
            "Discovering resources for {} (namespace {}, release {})",
            identity.name, identity.namespace, identity.release
        );
        let scope = DeploymentScope::discover(self.tools, self.layout, &identity).await;
        self.operator.scope_discovered(&identity, &scope);

        let report = |outcome: DestroyOutcome, steps: Vec<TeardownStep>| DestroyReport {
            identity: identity.clone(),
            scope,
            outcome,
            steps,
        };

        if scope.is_empty_for(request.destroy_infra, request.delete_local) {
            info!("Nothing to destroy for {}", self.name);
            return Ok(report(DestroyOutcome::NothingToDestroy, Vec::new()));
        }

        if !request.force {
            let confirmation = Confirmation::for_request(self.name, &scope, request);
            let answer = self.operator.confirm(&confirmation).await;
            if !confirmation.accepts(answer.as_deref()) {
                warn!("Destroy of {} not confirmed; nothing was changed", self.name);
                return Ok(report(DestroyOutcome::Cancelled, Vec::new()));
            }
        }

        let steps = self.teardown(&identity, &scope, request).await;
        let report = report(DestroyOutcome::Completed, steps);

        let local_kept = !report.steps.iter().any(|s| {
            s.step == TeardownStepKind::DeleteLocalFiles && s.status == StepStatus::Success
        });
        if local_kept && let Some(mut state) = state {
            self.record(&mut state, &report, run_id).await;
        }

        Ok(report)
    }

    /// Runs the teardown steps in dependency order.
    async fn teardown(
        &self,
        identity: &DeploymentIdentity,
        scope: &DeploymentScope,
        request: &DestroyRequest,
    ) -> Vec<TeardownStep> {
        let mut steps = Vec::with_capacity(5);
        let ns = identity.namespace.as_str();
        let cluster = self.tools.cluster;

        let step = if !scope.cluster_accessible {
            TeardownStep::skipped(TeardownStepKind::UninstallRelease, "cluster unreachable")
        } else if scope.has_helm_release && scope.has_namespace {
            info!("Uninstalling release {} from {ns}", identity.release);
            TeardownStep::from_result(
                TeardownStepKind::UninstallRelease,
                self.tools
                    .release
                    .uninstall(&identity.release, ns, &UninstallOptions::default())
                    .await,
            )
        } else {
            TeardownStep::skipped(TeardownStepKind::UninstallRelease, "release not installed")
        };
        self.finish(&mut steps, step);

        let step = if !scope.cluster_accessible {
            TeardownStep::skipped(TeardownStepKind::DeleteVolumes, "cluster unreachable")
        } else if scope.has_namespace {
            TeardownStep::from_result(TeardownStepKind::DeleteVolumes, cluster.delete_pvcs(ns).await)
        } else {
            TeardownStep::skipped(TeardownStepKind::DeleteVolumes, "namespace not found")
        };
        self.finish(&mut steps, step);

        let step = if !scope.cluster_accessible {
            TeardownStep::skipped(TeardownStepKind::DeleteNamespace, "cluster unreachable")
        } else if scope.has_namespace {
            if let Err(e) = cluster.remove_scaler_finalizers(ns).await {
                warn!("Could not remove ScaledObject finalizers in {ns}: {e}");
            }
            TeardownStep::from_result(
                TeardownStepKind::DeleteNamespace,
                cluster.delete_namespace(ns).await,
            )
        } else {
            TeardownStep::skipped(TeardownStepKind::DeleteNamespace, "namespace not found")
        };
        self.finish(&mut steps, step);

        let step = if !request.destroy_infra {
            TeardownStep::skipped(TeardownStepKind::DestroyInfrastructure, "not requested")
        } else if scope.has_infrastructure {
            TeardownStep::from_result(
                TeardownStepKind::DestroyInfrastructure,
                destroy_infrastructure(self.tools.infra, self.name).await,
            )
        } else {
            TeardownStep::skipped(TeardownStepKind::DestroyInfrastructure, "no infrastructure")
        };
        self.finish(&mut steps, step);

        let step = if !request.delete_local {
            TeardownStep::skipped(TeardownStepKind::DeleteLocalFiles, "not requested")
        } else if scope.has_local_files {
            let dir = self.layout.deployment_dir(self.name);
            info!("Deleting {}", dir.display());
            TeardownStep::from_result(
                TeardownStepKind::DeleteLocalFiles,
                tokio::fs::remove_dir_all(&dir).await.map_err(KdeployError::from),
            )
        } else {
            TeardownStep::skipped(TeardownStepKind::DeleteLocalFiles, "no local files")
        };
        self.finish(&mut steps, step);

        steps
    }

    fn finish(&self, steps: &mut Vec<TeardownStep>, step: TeardownStep) {
        self.operator.step_finished(&step);
        steps.push(step);
    }

    /// Resolves the namespace and release from state, then config, then the name.
    fn identity(&self, state: Option<&DeploymentState>) -> DeploymentIdentity {
        let recorded = state.and_then(|s| s.application.as_ref());

        let namespace = recorded
            .and_then(|a| a.namespace.clone())
            .or_else(|| self.config.map(DeploymentConfig::namespace))
            .unwrap_or_else(|| namespace_for(self.name));
        let release = recorded
            .and_then(|a| a.release_name.clone())
            .or_else(|| self.config.map(DeploymentConfig::release_name))
            .unwrap_or_else(|| self.name.to_string());

        DeploymentIdentity {
            name: self.name.to_string(),
            namespace,
            release,
        }
    }

    /// Records the run in state; marks `destroyed` only if nothing failed.
    async fn record(&self, state: &mut DeploymentState, report: &DestroyReport, run_id: Uuid) {
        if report.has_errors() {
            let failed: Vec<String> = report
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Error)
                .map(|s| s.step.to_string())
                .collect();
            state.add_history(HistoryEntry::failed(
                run_id,
                Operation::Destroy,
                &format!("failed steps: {}", failed.join(", ")),
            ));
        } else {
            state.set_status(DeploymentStatus::Destroyed);
            state.add_history(HistoryEntry::succeeded(run_id, Operation::Destroy));
        }

        if let Err(e) = self.store.save(state).await {
            error!("Failed to save state after destroy: {e}");
        }
    }
}

/// Destroys a deployment's infrastructure.
///
/// `init` runs first so a workspace whose providers were never downloaded can
/// still be destroyed; an `init` failure is logged and the destroy still runs.
///
/// # Errors
///
/// Returns the destroy error.
pub async fn destroy_infrastructure(infra: &dyn InfraProvisioner, name: &str) -> Result<()> {
    if let Err(e) = infra.init(name).await {
        warn!("terraform init before destroy failed, continuing: {e}");
    }
    infra.destroy(name).await
}
