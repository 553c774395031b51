//! The deploy run.
//!
//! A run walks the phase table from `loading` to a terminal phase and saves
//! the state record after every transition, so an interrupted run leaves an
//! accurate record behind. With hand-managed DNS the release is installed
//! twice: once without TLS, then upgraded in place once the records resolve.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigHasher, DeploymentConfig, DeploymentLayout};
use crate::dns::{
    DEFAULT_POLL_INTERVAL, DnsRecord, DnsVerifier, DnsWaitOutcome, required_records,
};
use crate::error::{DeployError, KdeployError, Result};
use crate::reconciler::destroy_infrastructure;
use crate::state::{
    ApplicationInfo, DeploymentState, DeploymentStatus, HistoryEntry, Operation, StateStore,
};
use crate::tools::{
    DEFAULT_RELEASE_TIMEOUT, LoadBalancerAddress, ReleaseInfo, ReleaseManager, ReleaseOptions,
    Toolchain,
};

use super::operator::{CleanupDecision, CleanupPolicy, DeployOperator};
use super::phase::{DeployPhase, PhaseMachine};
use super::preflight::{ToolReport, ensure_cluster_access};

/// Default number of load balancer polls.
const DEFAULT_LB_ATTEMPTS: u32 = 60;

/// Default delay between load balancer polls.
const DEFAULT_LB_INTERVAL: Duration = Duration::from_secs(10);

/// Options for one deploy run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Do not provision infrastructure even in `provision` mode.
    pub skip_infra: bool,
    /// Do not wait for DNS; finish without TLS.
    pub skip_dns: bool,
    /// What to do with partial infrastructure after a failure.
    pub cleanup: CleanupPolicy,
    /// Cancelling this token skips the DNS wait.
    pub cancel: CancellationToken,
    /// Delay between DNS polls.
    pub dns_poll_interval: Duration,
    /// Number of load balancer polls.
    pub lb_attempts: u32,
    /// Delay between load balancer polls.
    pub lb_poll_interval: Duration,
    /// Helm wait timeout.
    pub release_timeout: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            skip_infra: false,
            skip_dns: false,
            cleanup: CleanupPolicy::Prompt,
            cancel: CancellationToken::new(),
            dns_poll_interval: DEFAULT_POLL_INTERVAL,
            lb_attempts: DEFAULT_LB_ATTEMPTS,
            lb_poll_interval: DEFAULT_LB_INTERVAL,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }
}

/// What happened to partial infrastructure after a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// No infrastructure was touched by this run.
    NotNeeded,
    /// Infrastructure was destroyed.
    Destroyed,
    /// Destroy was attempted and failed.
    DestroyFailed {
        /// Why the destroy failed.
        error: String,
    },
    /// The operator chose to keep the infrastructure.
    Kept,
    /// No decision was made.
    Abandoned,
}

/// How a deploy run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// Installed and serving.
    Complete {
        /// Whether TLS is enabled.
        tls_enabled: bool,
    },
    /// Installed, but DNS was skipped so TLS is still off.
    DeployedWithoutTls,
    /// The run failed.
    Failed {
        /// Error that ended the run.
        error: String,
        /// What happened to partial infrastructure.
        cleanup: CleanupOutcome,
    },
}

/// Summary of a deploy run.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    /// Deployment name.
    pub name: String,
    /// Run identifier recorded in history.
    pub run_id: Uuid,
    /// How the run ended.
    #[serde(flatten)]
    pub outcome: DeployOutcome,
    /// Phases entered, in order.
    pub phases: Vec<DeployPhase>,
    /// Public URL, once installed.
    pub url: Option<String>,
    /// DNS records the run waited on.
    pub dns_records: Vec<DnsRecord>,
}

impl DeployReport {
    /// Returns true if the run did not fail.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        !matches!(self.outcome, DeployOutcome::Failed { .. })
    }
}

/// Values carried between phases of one run.
#[derive(Debug, Default)]
struct RunContext {
    /// Set the instant the first infrastructure step begins.
    infra_started: bool,
    /// Records the run is waiting on.
    records: Vec<DnsRecord>,
}

/// Drives a deployment from its config to a running application.
pub struct Orchestrator<'a, S: StateStore> {
    /// Deployment configuration.
    config: &'a DeploymentConfig,
    /// Locations of deployment files.
    layout: &'a DeploymentLayout,
    /// State store.
    store: &'a S,
    /// External tools.
    tools: Toolchain<'a>,
    /// Progress sink and question answerer.
    operator: &'a dyn DeployOperator,
}

impl<'a, S: StateStore> Orchestrator<'a, S> {
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(
        config: &'a DeploymentConfig,
        layout: &'a DeploymentLayout,
        store: &'a S,
        tools: Toolchain<'a>,
        operator: &'a dyn DeployOperator,
    ) -> Self {
        Self {
            config,
            layout,
            store,
            tools,
            operator,
        }
    }

    /// Runs one deploy.
    ///
    /// Failures of the deployment itself are reported in the returned
    /// [`DeployReport`] after the state has been marked `failed`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the state record cannot be loaded or saved
    /// while handling a failure.
    pub async fn run(&self, opts: &DeployOptions) -> Result<DeployReport> {
        let name = self.config.name.as_str();
        let run_id = Uuid::new_v4();
        info!("Starting deploy of {name} (run {run_id})");

        let mut machine = PhaseMachine::new();
        let mut state = self
            .store
            .load(name)
            .await?
            .unwrap_or_else(|| DeploymentState::new(name));
        state.set_phase(DeployPhase::Loading);
        self.operator.phase_changed(DeployPhase::Loading);

        let mut ctx = RunContext::default();
        let result = self.drive(&mut machine, &mut state, &mut ctx, opts).await;

        let outcome = match result {
            Ok(outcome) => {
                state.config_hash = Some(ConfigHasher::new().hash_config(self.config));
                state.add_history(HistoryEntry::succeeded(run_id, Operation::Deploy));
                self.store.save(&state).await?;
                info!("Deploy of {name} finished: {}", state.status);
                outcome
            }
            Err(err) => {
                self.handle_failure(&mut machine, &mut state, &ctx, run_id, err, opts)
                    .await?
            }
        };

        Ok(DeployReport {
            name: name.to_string(),
            run_id,
            outcome,
            phases: machine.trace().to_vec(),
            url: state.application.as_ref().and_then(|a| a.url.clone()),
            dns_records: ctx.records,
        })
    }

    /// Walks the phases of a successful run.
    async fn drive(
        &self,
        machine: &mut PhaseMachine,
        state: &mut DeploymentState,
        ctx: &mut RunContext,
        opts: &DeployOptions,
    ) -> Result<DeployOutcome> {
        let resuming = state.status == DeploymentStatus::WaitingDns;
        let provision =
            !resuming && self.config.provisions_infrastructure() && !opts.skip_infra;

        if !resuming {
            state.set_status(DeploymentStatus::Deploying);
        }
        self.enter(machine, state, DeployPhase::Preflight).await?;

        ToolReport::probe(self.tools).await.require(provision)?;
        if !provision {
            ensure_cluster_access(self.tools, self.config, true).await?;
        }

        if resuming {
            info!("Resuming {}: waiting for DNS records", self.config.name);
            self.suspend_for_dns(machine, state).await?;
            return self.wait_and_enable_tls(machine, state, ctx, opts).await;
        }

        if provision {
            self.provision(machine, state, ctx).await?;
        }

        self.enter(machine, state, DeployPhase::HelmInstall).await?;
        let external_dns = self.config.external_dns_enabled();
        self.install(state, external_dns, opts).await?;

        if external_dns {
            state.set_status(DeploymentStatus::Running);
            self.enter(machine, state, DeployPhase::Complete).await?;
            return Ok(DeployOutcome::Complete { tls_enabled: true });
        }

        self.suspend_for_dns(machine, state).await?;
        self.wait_and_enable_tls(machine, state, ctx, opts).await
    }

    /// Persists `waiting-dns` so an interrupted run resumes without reinstalling.
    async fn suspend_for_dns(
        &self,
        machine: &mut PhaseMachine,
        state: &mut DeploymentState,
    ) -> Result<()> {
        state.set_status(DeploymentStatus::WaitingDns);
        self.enter(machine, state, DeployPhase::DnsWait).await
    }

    /// Provisions infrastructure and fetches credentials for the new cluster.
    async fn provision(
        &self,
        machine: &mut PhaseMachine,
        state: &mut DeploymentState,
        ctx: &mut RunContext,
    ) -> Result<()> {
        let name = self.config.name.as_str();
        let infra = self.tools.infra;

        let has_workspace = infra
            .has_workspace(name)
            .await
            .map_err(|e| DeployError::infra("setup", e))?;

        ctx.infra_started = true;
        if has_workspace {
            info!("Terraform workspace for {name} already exists; skipping template setup");
        } else {
            self.enter(machine, state, DeployPhase::InfraSetup).await?;
            infra
                .setup_workspace(name, self.config.infrastructure.provider)
                .await
                .map_err(|e| DeployError::infra("setup", e))?;
        }

        self.enter(machine, state, DeployPhase::InfraInit).await?;
        infra
            .init(name)
            .await
            .map_err(|e| DeployError::infra("init", e))?;

        self.enter(machine, state, DeployPhase::InfraPlan).await?;
        let plan = infra
            .plan(name)
            .await
            .map_err(|e| DeployError::infra("plan", e))?;

        self.enter(machine, state, DeployPhase::InfraApply).await?;
        infra
            .apply(name, plan)
            .await
            .map_err(|e| DeployError::infra("apply", e))?;

        self.enter(machine, state, DeployPhase::Kubeconfig).await?;
        let cfg = &self.config.infrastructure;
        self.tools
            .cluster
            .update_credentials(
                cfg.provider,
                &cfg.cluster_name,
                &cfg.region,
                self.config.credential_extra(),
            )
            .await
            .map_err(|e| DeployError::infra("kubeconfig", e))?;
        ensure_cluster_access(self.tools, self.config, false)
            .await
            .map_err(|e| DeployError::infra("kubeconfig", e))?;

        Ok(())
    }

    /// Runs `helm upgrade --install` and records the installed application.
    async fn install(
        &self,
        state: &mut DeploymentState,
        tls_enabled: bool,
        opts: &DeployOptions,
    ) -> Result<()> {
        let release = self.config.release_name();
        let release_opts = release_options(self.config, self.layout, tls_enabled, opts);

        self.tools
            .release
            .install_or_upgrade(&release, &release_opts)
            .await
            .map_err(|e| DeployError::install(&release, e))?;

        let info = application_info(self.tools.release, self.config, tls_enabled).await;
        state.set_application(info);
        self.store.save(state).await
    }

    /// Waits for DNS, then upgrades the release to serve TLS.
    ///
    /// Runs inside the `dns-wait` phase, so the load balancer lookup happens
    /// after `waiting-dns` is persisted.
    async fn wait_and_enable_tls(
        &self,
        machine: &mut PhaseMachine,
        state: &mut DeploymentState,
        ctx: &mut RunContext,
        opts: &DeployOptions,
    ) -> Result<DeployOutcome> {
        let address = self.wait_for_load_balancer(opts).await?;
        info!("Ingress load balancer address: {address}");
        ctx.records = required_records(self.config, &address);
        self.operator.dns_progress(&ctx.records);

        let outcome = if opts.skip_dns {
            DnsWaitOutcome::Skipped
        } else {
            DnsVerifier::new(self.tools.dns)
                .with_poll_interval(opts.dns_poll_interval)
                .wait_for_propagation(&mut ctx.records, &opts.cancel, |records| {
                    self.operator.dns_progress(records);
                })
                .await
        };

        if outcome == DnsWaitOutcome::Skipped {
            warn!("DNS validation skipped; {} stays on plain HTTP", self.config.domain);
            let mut app = state.application.clone().unwrap_or_default();
            app.tls_enabled = false;
            app.url = Some(public_url(self.config, false));
            state.set_application(app);
            state.set_status(DeploymentStatus::Running);
            self.enter(machine, state, DeployPhase::Complete).await?;
            return Ok(DeployOutcome::DeployedWithoutTls);
        }

        self.enter(machine, state, DeployPhase::HelmUpgradeTls).await?;
        let release = self.config.release_name();
        let release_opts = release_options(self.config, self.layout, true, opts);
        self.tools
            .release
            .upgrade(&release, &release_opts)
            .await
            .map_err(|e| DeployError::install(&release, e))?;

        let info = application_info(self.tools.release, self.config, true).await;
        state.set_application(info);
        state.set_status(DeploymentStatus::Running);
        self.enter(machine, state, DeployPhase::Complete).await?;
        Ok(DeployOutcome::Complete { tls_enabled: true })
    }

    /// Polls the ingress service until it has an external address.
    async fn wait_for_load_balancer(&self, opts: &DeployOptions) -> Result<LoadBalancerAddress> {
        let ingress = &self.config.ingress;
        let attempts = opts.lb_attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .tools
                .cluster
                .load_balancer_address(&ingress.namespace, &ingress.service)
                .await
            {
                Ok(Some(address)) => return Ok(address),
                Ok(None) => debug!("Load balancer pending ({attempt}/{attempts})"),
                Err(e) => warn!("Load balancer query failed ({attempt}/{attempts}): {e}"),
            }

            if attempt < attempts {
                tokio::time::sleep(opts.lb_poll_interval).await;
            }
        }

        Err(DeployError::LoadBalancerUnavailable {
            namespace: ingress.namespace.clone(),
            service: ingress.service.clone(),
            attempts,
        }
        .into())
    }

    /// Marks the run failed and deals with partial infrastructure.
    async fn handle_failure(
        &self,
        machine: &mut PhaseMachine,
        state: &mut DeploymentState,
        ctx: &RunContext,
        run_id: Uuid,
        err: KdeployError,
        opts: &DeployOptions,
    ) -> Result<DeployOutcome> {
        let name = self.config.name.as_str();
        error!("Deploy of {name} failed in {}: {err}", machine.current());

        state.set_status(DeploymentStatus::Failed);
        state.add_history(HistoryEntry::failed(run_id, Operation::Deploy, &err.to_string()));

        if !ctx.infra_started {
            self.enter(machine, state, DeployPhase::Error).await?;
            return Ok(DeployOutcome::Failed {
                error: err.to_string(),
                cleanup: CleanupOutcome::NotNeeded,
            });
        }

        self.enter(machine, state, DeployPhase::CleanupPrompt).await?;
        let decision = match opts.cleanup {
            CleanupPolicy::Destroy => CleanupDecision::Destroy,
            CleanupPolicy::Keep => CleanupDecision::Keep,
            CleanupPolicy::Prompt => self.operator.confirm_cleanup(name, &err).await,
        };

        let cleanup = match decision {
            CleanupDecision::Destroy => {
                self.enter(machine, state, DeployPhase::CleanupRunning).await?;
                let cleanup = match destroy_infrastructure(self.tools.infra, name).await {
                    Ok(()) => {
                        info!("Partial infrastructure for {name} destroyed");
                        state.set_status(DeploymentStatus::Destroyed);
                        state.add_history(HistoryEntry::succeeded(run_id, Operation::Cleanup));
                        CleanupOutcome::Destroyed
                    }
                    Err(e) => {
                        error!("Cleanup of {name} failed: {e}");
                        state.add_history(HistoryEntry::failed(
                            run_id,
                            Operation::Cleanup,
                            &e.to_string(),
                        ));
                        CleanupOutcome::DestroyFailed {
                            error: e.to_string(),
                        }
                    }
                };
                self.enter(machine, state, DeployPhase::CleanupComplete).await?;
                cleanup
            }
            CleanupDecision::Keep => {
                info!("Keeping partial infrastructure for {name}");
                self.enter(machine, state, DeployPhase::Error).await?;
                CleanupOutcome::Kept
            }
            CleanupDecision::Abandon => {
                warn!("No cleanup decision for {name}; infrastructure left in place");
                self.store.save(state).await?;
                CleanupOutcome::Abandoned
            }
        };

        Ok(DeployOutcome::Failed {
            error: err.to_string(),
            cleanup,
        })
    }

    /// Moves to the next phase, persists the record and notifies the operator.
    async fn enter(
        &self,
        machine: &mut PhaseMachine,
        state: &mut DeploymentState,
        phase: DeployPhase,
    ) -> Result<()> {
        machine.advance(phase)?;
        debug!("Entering phase {phase}");
        state.set_phase(phase);
        self.store.save(state).await?;
        self.operator.phase_changed(phase);
        Ok(())
    }
}

/// Returns the application URL for the given scheme.
#[must_use]
pub fn public_url(config: &DeploymentConfig, tls_enabled: bool) -> String {
    let scheme = if tls_enabled { "https" } else { "http" };
    format!("{scheme}://{}", config.domain)
}

/// Builds the release options for one install or upgrade.
fn release_options(
    config: &DeploymentConfig,
    layout: &DeploymentLayout,
    tls_enabled: bool,
    opts: &DeployOptions,
) -> ReleaseOptions {
    let values = layout.values_path(&config.name);
    ReleaseOptions {
        chart: config.application.chart.clone(),
        chart_version: config.application.chart_version.clone(),
        namespace: config.namespace(),
        domain: config.domain.clone(),
        values_files: if values.exists() { vec![values] } else { Vec::new() },
        tls_enabled,
        external_dns: config.external_dns_enabled(),
        wait: true,
        timeout: opts.release_timeout,
    }
}

/// Describes the installed application, querying versions best-effort.
async fn application_info(
    release: &dyn ReleaseManager,
    config: &DeploymentConfig,
    tls_enabled: bool,
) -> ApplicationInfo {
    let release_name = config.release_name();
    let namespace = config.namespace();

    let installed = match release.get_installed_version(&release_name, &namespace).await {
        Ok(info) => info.unwrap_or_default(),
        Err(e) => {
            warn!("Could not read installed version of {release_name}: {e}");
            ReleaseInfo::default()
        }
    };

    ApplicationInfo {
        app_version: installed.app_version,
        hps_version: config.application.hps_version.clone(),
        chart_version: installed
            .chart_version
            .or_else(|| config.application.chart_version.clone()),
        namespace: Some(namespace),
        url: Some(public_url(config, tls_enabled)),
        release_name: Some(release_name),
        tls_enabled,
    }
}
