//! In-memory adapters and a scripted operator for end-to-end lifecycle tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use kdeploy::config::{CloudProvider, ConfigParser, DeploymentConfig, DeploymentLayout};
use kdeploy::dns::DnsRecord;
use kdeploy::error::{DnsError, KdeployError, Result, ToolError};
use kdeploy::orchestrator::{CleanupDecision, DeployOperator, DeployOptions, DeployPhase};
use kdeploy::reconciler::{
    Confirmation, DeploymentIdentity, DeploymentScope, DestroyOperator, TeardownStep,
};
use kdeploy::state::LocalStateStore;
use kdeploy::tools::{
    ClusterClient, DnsResolver, InfraProvisioner, LoadBalancerAddress, PlanArtifact, RecordKind,
    ReleaseInfo, ReleaseManager, ReleaseOptions, ResolverServer, Toolchain, UninstallOptions,
};

/// Load balancer IP handed out by the fake cluster.
pub const LB_IP: &str = "203.0.113.10";

/// Builds a config for `name` with the given infrastructure mode and DNS setup.
pub fn config(name: &str, mode: &str, dns_provider: &str, auto_manage: bool) -> DeploymentConfig {
    let yaml = format!(
        r"
name: {name}
domain: shop.example.com
infrastructure:
  mode: {mode}
  provider: aws
  region: us-east-1
  cluster_name: {name}-eks
dns:
  provider: {dns_provider}
  auto_manage: {auto_manage}
application:
  chart: acme/shop
  chart_version: 1.4.0
"
    );
    ConfigParser::new()
        .parse_yaml(&yaml, None)
        .expect("valid test config")
}

/// Options with fast polling for tests.
pub fn fast_options() -> DeployOptions {
    DeployOptions {
        dns_poll_interval: Duration::from_millis(1),
        lb_attempts: 3,
        lb_poll_interval: Duration::from_millis(1),
        ..DeployOptions::default()
    }
}

/// A temporary kdeploy home with a local state store.
pub struct Workspace {
    /// Keeps the directory alive.
    _dir: TempDir,
    /// Layout rooted in the temporary directory.
    pub layout: DeploymentLayout,
    /// State store over the layout.
    pub store: LocalStateStore,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let layout = DeploymentLayout::new(dir.path());
        let store = LocalStateStore::new(layout.clone());
        Self {
            _dir: dir,
            layout,
            store,
        }
    }

    /// Creates the deployment directory, as the setup wizard would.
    pub fn create_deployment_dir(&self, name: &str) {
        std::fs::create_dir_all(self.layout.deployment_dir(name)).expect("create dir");
    }
}

/// All fakes for one test.
#[derive(Default)]
pub struct Fakes {
    pub infra: FakeInfra,
    pub release: FakeRelease,
    pub cluster: FakeCluster,
    pub dns: FakeDns,
}

impl Fakes {
    pub fn new() -> Self {
        let fakes = Self::default();
        fakes.cluster.accessible.store(true, Ordering::SeqCst);
        fakes.cluster.set_load_balancer(Some(LB_IP));
        fakes
    }

    pub fn toolchain(&self) -> Toolchain<'_> {
        Toolchain {
            infra: &self.infra,
            release: &self.release,
            cluster: &self.cluster,
            dns: &self.dns,
        }
    }
}

fn command_failed(tool: &str, command: &str) -> KdeployError {
    KdeployError::Tool(ToolError::CommandFailed {
        tool: tool.to_string(),
        command: command.to_string(),
        exit_code: Some(1),
        stdout: String::new(),
        stderr: format!("Error: {command} failed"),
    })
}

/// Terraform stand-in that records every call.
#[derive(Default)]
pub struct FakeInfra {
    pub calls: Mutex<Vec<String>>,
    pub workspaces: Mutex<HashSet<String>>,
    pub resources: Mutex<HashSet<String>>,
    pub fail_step: Mutex<Option<&'static str>>,
}

impl FakeInfra {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn fail_on(&self, step: &'static str) {
        *self.fail_step.lock().expect("lock") = Some(step);
    }

    pub fn add_workspace(&self, name: &str) {
        self.workspaces.lock().expect("lock").insert(name.to_string());
    }

    /// A workspace whose infrastructure has been applied.
    pub fn add_provisioned(&self, name: &str) {
        self.add_workspace(name);
        self.resources.lock().expect("lock").insert(name.to_string());
    }

    pub fn workspace_exists(&self, name: &str) -> bool {
        self.workspaces.lock().expect("lock").contains(name)
    }

    pub fn resources_exist(&self, name: &str) -> bool {
        self.resources.lock().expect("lock").contains(name)
    }

    fn step(&self, step: &str) -> Result<()> {
        self.calls.lock().expect("lock").push(step.to_string());
        if *self.fail_step.lock().expect("lock") == Some(step) {
            return Err(command_failed("terraform", &format!("terraform {step}")));
        }
        Ok(())
    }
}

#[async_trait]
impl InfraProvisioner for FakeInfra {
    async fn is_available(&self) -> bool {
        true
    }

    async fn has_workspace(&self, name: &str) -> Result<bool> {
        self.calls.lock().expect("lock").push(String::from("has_workspace"));
        Ok(self.workspace_exists(name))
    }

    async fn has_resources(&self, name: &str) -> Result<bool> {
        self.calls.lock().expect("lock").push(String::from("has_resources"));
        Ok(self.resources_exist(name))
    }

    async fn setup_workspace(&self, name: &str, _provider: CloudProvider) -> Result<()> {
        self.step("setup")?;
        self.add_workspace(name);
        Ok(())
    }

    async fn init(&self, _name: &str) -> Result<()> {
        self.step("init")
    }

    async fn plan(&self, name: &str) -> Result<PlanArtifact> {
        self.step("plan")?;
        Ok(PlanArtifact::new(name, "tfplan"))
    }

    async fn apply(&self, name: &str, plan: PlanArtifact) -> Result<()> {
        assert_eq!(plan.deployment(), name, "apply must consume this deployment's plan");
        self.step("apply")?;
        self.resources.lock().expect("lock").insert(name.to_string());
        Ok(())
    }

    /// Like `terraform destroy`, this empties the state but keeps the workspace.
    async fn destroy(&self, name: &str) -> Result<()> {
        self.step("destroy")?;
        self.resources.lock().expect("lock").remove(name);
        Ok(())
    }
}

/// One release call observed by [`FakeRelease`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCall {
    pub action: &'static str,
    pub release: String,
    pub tls_enabled: bool,
}

/// Helm stand-in keeping installed releases in memory.
#[derive(Default)]
pub struct FakeRelease {
    pub calls: Mutex<Vec<ReleaseCall>>,
    pub installed: Mutex<HashSet<(String, String)>>,
    pub fail_install: AtomicBool,
}

impl FakeRelease {
    pub fn calls(&self) -> Vec<ReleaseCall> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn install(&self, release: &str, namespace: &str) {
        self.installed
            .lock()
            .expect("lock")
            .insert((release.to_string(), namespace.to_string()));
    }

    fn record(&self, action: &'static str, release: &str, opts: &ReleaseOptions) {
        self.calls.lock().expect("lock").push(ReleaseCall {
            action,
            release: release.to_string(),
            tls_enabled: opts.tls_enabled,
        });
    }
}

#[async_trait]
impl ReleaseManager for FakeRelease {
    async fn is_available(&self) -> bool {
        true
    }

    async fn install_or_upgrade(&self, release: &str, opts: &ReleaseOptions) -> Result<()> {
        self.record("install", release, opts);
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(command_failed("helm", "helm upgrade --install"));
        }
        self.install(release, &opts.namespace);
        Ok(())
    }

    async fn upgrade(&self, release: &str, opts: &ReleaseOptions) -> Result<()> {
        self.record("upgrade", release, opts);
        Ok(())
    }

    async fn uninstall(
        &self,
        release: &str,
        namespace: &str,
        _opts: &UninstallOptions,
    ) -> Result<()> {
        self.installed
            .lock()
            .expect("lock")
            .remove(&(release.to_string(), namespace.to_string()));
        self.calls.lock().expect("lock").push(ReleaseCall {
            action: "uninstall",
            release: release.to_string(),
            tls_enabled: false,
        });
        Ok(())
    }

    async fn get_installed_version(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>> {
        let installed = self
            .installed
            .lock()
            .expect("lock")
            .contains(&(release.to_string(), namespace.to_string()));
        Ok(installed.then(|| ReleaseInfo {
            chart_version: Some(String::from("1.4.0")),
            app_version: Some(String::from("3.2.0")),
        }))
    }
}

/// Cluster stand-in with in-memory namespaces.
#[derive(Default)]
pub struct FakeCluster {
    pub accessible: AtomicBool,
    pub namespaces: Mutex<HashSet<String>>,
    pub load_balancer: Mutex<Option<LoadBalancerAddress>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.namespaces
            .lock()
            .expect("lock")
            .insert(namespace.to_string());
    }

    pub fn remove_namespace(&self, namespace: &str) {
        self.namespaces.lock().expect("lock").remove(namespace);
    }

    pub fn set_load_balancer(&self, raw: Option<&str>) {
        *self.load_balancer.lock().expect("lock") = raw.and_then(LoadBalancerAddress::parse);
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("lock").push(call);
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn is_available(&self) -> bool {
        true
    }

    async fn is_cluster_accessible(&self) -> bool {
        self.accessible.load(Ordering::SeqCst)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.lock().expect("lock").contains(namespace))
    }

    async fn delete_pvcs(&self, namespace: &str) -> Result<()> {
        self.record(format!("delete_pvcs {namespace}"));
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.record(format!("delete_namespace {namespace}"));
        self.remove_namespace(namespace);
        Ok(())
    }

    async fn remove_scaler_finalizers(&self, namespace: &str) -> Result<()> {
        self.record(format!("remove_finalizers {namespace}"));
        Ok(())
    }

    async fn update_credentials(
        &self,
        provider: CloudProvider,
        cluster: &str,
        region: &str,
        _extra: Option<&str>,
    ) -> Result<()> {
        self.record(format!("update_credentials {provider} {cluster} {region}"));
        self.accessible.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn load_balancer_address(
        &self,
        _namespace: &str,
        _service: &str,
    ) -> Result<Option<LoadBalancerAddress>> {
        Ok(self.load_balancer.lock().expect("lock").clone())
    }
}

/// DNS stand-in answering from a table once `ready` is set.
#[derive(Default)]
pub struct FakeDns {
    pub ready: Arc<AtomicBool>,
    pub answers: Mutex<HashMap<(String, RecordKind), Vec<String>>>,
    pub queries: AtomicUsize,
}

impl FakeDns {
    pub fn answer(&self, host: &str, kind: RecordKind, values: &[&str]) {
        self.answers.lock().expect("lock").insert(
            (host.to_string(), kind),
            values.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsResolver for FakeDns {
    async fn resolve(
        &self,
        hostname: &str,
        kind: RecordKind,
        _servers: &[ResolverServer],
    ) -> Result<Vec<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let no_records = || {
            KdeployError::Dns(DnsError::NoRecords {
                hostname: hostname.to_string(),
                record_type: kind.to_string(),
            })
        };

        if !self.ready.load(Ordering::SeqCst) {
            return Err(no_records());
        }
        self.answers
            .lock()
            .expect("lock")
            .get(&(hostname.to_string(), kind))
            .cloned()
            .ok_or_else(no_records)
    }
}

/// Operator that records progress and answers from a script.
pub struct ScriptedOperator {
    pub phases: Mutex<Vec<DeployPhase>>,
    pub dns_updates: AtomicUsize,
    pub cleanup: CleanupDecision,
    pub cleanup_asked: AtomicUsize,
    /// Sets this flag once this many DNS updates were seen.
    pub dns_ready_after: Option<(usize, Arc<AtomicBool>)>,
    /// Answer given to destroy confirmations.
    pub answer: Option<String>,
    pub confirmations: Mutex<Vec<Confirmation>>,
    pub scopes: Mutex<Vec<DeploymentScope>>,
    pub steps: Mutex<Vec<TeardownStep>>,
}

impl Default for ScriptedOperator {
    fn default() -> Self {
        Self {
            phases: Mutex::new(Vec::new()),
            dns_updates: AtomicUsize::new(0),
            cleanup: CleanupDecision::Abandon,
            cleanup_asked: AtomicUsize::new(0),
            dns_ready_after: None,
            answer: None,
            confirmations: Mutex::new(Vec::new()),
            scopes: Mutex::new(Vec::new()),
            steps: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedOperator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            ..Self::default()
        }
    }

    pub fn phases(&self) -> Vec<DeployPhase> {
        self.phases.lock().expect("lock").clone()
    }

    pub fn confirmations(&self) -> Vec<Confirmation> {
        self.confirmations.lock().expect("lock").clone()
    }
}

#[async_trait]
impl DeployOperator for ScriptedOperator {
    fn phase_changed(&self, phase: DeployPhase) {
        self.phases.lock().expect("lock").push(phase);
    }

    fn dns_progress(&self, _records: &[DnsRecord]) {
        let seen = self.dns_updates.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, flag)) = &self.dns_ready_after
            && seen >= *after
        {
            flag.store(true, Ordering::SeqCst);
        }
    }

    async fn confirm_cleanup(&self, _deployment: &str, _error: &KdeployError) -> CleanupDecision {
        self.cleanup_asked.fetch_add(1, Ordering::SeqCst);
        self.cleanup
    }
}

#[async_trait]
impl DestroyOperator for ScriptedOperator {
    fn scope_discovered(&self, _identity: &DeploymentIdentity, scope: &DeploymentScope) {
        self.scopes.lock().expect("lock").push(*scope);
    }

    async fn confirm(&self, confirmation: &Confirmation) -> Option<String> {
        self.confirmations
            .lock()
            .expect("lock")
            .push(confirmation.clone());
        self.answer.clone()
    }

    fn step_finished(&self, step: &TeardownStep) {
        self.steps.lock().expect("lock").push(step.clone());
    }
}
