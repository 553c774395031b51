//! External tool adapters.
//!
//! The orchestrator and the destroy reconciler never spawn processes or open
//! sockets themselves. Everything they need from the outside world goes
//! through the traits in this module:
//! - [`InfraProvisioner`]: Terraform workspaces, plan and apply
//! - [`ReleaseManager`]: Helm releases
//! - [`ClusterClient`]: kubectl and the cloud credential helpers
//! - [`DnsResolver`]: record lookups against a chosen resolver
//! - [`EndpointProber`]: HTTP health probes

mod dns;
mod health;
mod helm;
mod kubectl;
mod process;
mod terraform;

use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::CloudProvider;
use crate::error::Result;

pub use dns::HickoryResolver;
pub use health::{HttpProber, ProbeResult};
pub use helm::HelmCli;
pub use kubectl::KubectlCli;
pub use process::{CommandOutput, CommandSpec};
pub use terraform::TerraformCli;

/// Default Helm timeout for install and upgrade.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default Helm timeout for uninstall.
pub const DEFAULT_UNINSTALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Output of a successful `plan`, consumed by the matching `apply`.
#[derive(Debug)]
pub struct PlanArtifact {
    /// Deployment the plan was computed for.
    deployment: String,
    /// Saved plan file.
    path: PathBuf,
}

impl PlanArtifact {
    /// Creates a plan artifact for a deployment.
    #[must_use]
    pub fn new(deployment: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            deployment: deployment.into(),
            path: path.into(),
        }
    }

    /// Returns the deployment the plan belongs to.
    #[must_use]
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    /// Returns the saved plan file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Options for a Helm install or upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOptions {
    /// Chart reference.
    pub chart: String,
    /// Chart version, latest when absent.
    pub chart_version: Option<String>,
    /// Target namespace.
    pub namespace: String,
    /// Public domain passed to the chart.
    pub domain: String,
    /// Values files passed through untouched.
    pub values_files: Vec<PathBuf>,
    /// Whether the ingress serves TLS.
    pub tls_enabled: bool,
    /// Whether the chart's external-DNS controller is enabled.
    pub external_dns: bool,
    /// Wait for resources to become ready.
    pub wait: bool,
    /// How long to wait.
    pub timeout: Duration,
}

/// Options for a Helm uninstall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UninstallOptions {
    /// Wait for resources to be deleted.
    pub wait: bool,
    /// How long to wait.
    pub timeout: Duration,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            wait: true,
            timeout: DEFAULT_UNINSTALL_TIMEOUT,
        }
    }
}

/// Installed release versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Installed chart version.
    pub chart_version: Option<String>,
    /// Application version reported by the chart.
    pub app_version: Option<String>,
}

/// Externally reachable address of a `LoadBalancer` service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum LoadBalancerAddress {
    /// An IP address (most GCP and Azure load balancers).
    Ip(IpAddr),
    /// A hostname (AWS ELB/NLB).
    Hostname(String),
}

impl LoadBalancerAddress {
    /// Classifies a raw address reported by the cluster.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_end_matches('.');
        if raw.is_empty() {
            return None;
        }
        Some(
            raw.parse::<IpAddr>()
                .map_or_else(|_| Self::Hostname(raw.to_ascii_lowercase()), Self::Ip),
        )
    }
}

impl fmt::Display for LoadBalancerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{ip}"),
            Self::Hostname(host) => write!(f, "{host}"),
        }
    }
}

/// DNS record types the verifier queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordKind {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
    /// Canonical name record.
    Cname,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
        };
        write!(f, "{kind}")
    }
}

/// A resolver the verifier can direct a query at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverServer {
    /// The host's configured resolver.
    System,
    /// A specific public resolver.
    Custom(IpAddr),
}

impl ResolverServer {
    /// Google public DNS.
    pub const GOOGLE: Self = Self::Custom(IpAddr::V4(std::net::Ipv4Addr::new(8, 8, 8, 8)));

    /// Cloudflare public DNS.
    pub const CLOUDFLARE: Self = Self::Custom(IpAddr::V4(std::net::Ipv4Addr::new(1, 1, 1, 1)));

    /// Resolver chain walked for every verification query.
    pub const DEFAULT_CHAIN: [Self; 3] = [Self::System, Self::GOOGLE, Self::CLOUDFLARE];
}

impl fmt::Display for ResolverServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Custom(ip) => write!(f, "{ip}"),
        }
    }
}

/// The adapters one deploy or destroy run works through.
#[derive(Clone, Copy)]
pub struct Toolchain<'a> {
    /// Infrastructure provisioner.
    pub infra: &'a dyn InfraProvisioner,
    /// Release manager.
    pub release: &'a dyn ReleaseManager,
    /// Cluster client.
    pub cluster: &'a dyn ClusterClient,
    /// DNS resolver.
    pub dns: &'a dyn DnsResolver,
}

/// Provisions cluster infrastructure for a deployment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InfraProvisioner: Send + Sync {
    /// Returns true if the tool is installed.
    async fn is_available(&self) -> bool;

    /// Returns true if the deployment's IaC workspace has been set up.
    async fn has_workspace(&self, name: &str) -> Result<bool>;

    /// Returns true if the workspace's state still holds provisioned resources.
    ///
    /// A workspace whose infrastructure was destroyed reports false.
    async fn has_resources(&self, name: &str) -> Result<bool>;

    /// Copies the provider templates into the deployment's workspace.
    async fn setup_workspace(&self, name: &str, provider: CloudProvider) -> Result<()>;

    /// Initializes the workspace.
    async fn init(&self, name: &str) -> Result<()>;

    /// Computes a plan.
    async fn plan(&self, name: &str) -> Result<PlanArtifact>;

    /// Applies the plan returned by the preceding `plan`.
    async fn apply(&self, name: &str, plan: PlanArtifact) -> Result<()>;

    /// Destroys all infrastructure in the workspace.
    async fn destroy(&self, name: &str) -> Result<()>;
}

/// Manages the application's package release.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseManager: Send + Sync {
    /// Returns true if the tool is installed.
    async fn is_available(&self) -> bool;

    /// Installs the release, or upgrades it if it already exists.
    async fn install_or_upgrade(&self, release: &str, opts: &ReleaseOptions) -> Result<()>;

    /// Upgrades an existing release in place.
    async fn upgrade(&self, release: &str, opts: &ReleaseOptions) -> Result<()>;

    /// Removes the release.
    async fn uninstall(&self, release: &str, namespace: &str, opts: &UninstallOptions)
    -> Result<()>;

    /// Returns the installed versions, or `None` if the release does not exist.
    async fn get_installed_version(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>>;
}

/// Talks to the Kubernetes cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Returns true if the tool is installed.
    async fn is_available(&self) -> bool;

    /// Returns true if the cluster API answers.
    async fn is_cluster_accessible(&self) -> bool;

    /// Returns true if the namespace exists.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// Deletes every persistent volume claim in the namespace.
    async fn delete_pvcs(&self, namespace: &str) -> Result<()>;

    /// Deletes the namespace.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    /// Strips finalizers from autoscaler objects that would block namespace deletion.
    async fn remove_scaler_finalizers(&self, namespace: &str) -> Result<()>;

    /// Regenerates cluster credentials with the provider's CLI.
    ///
    /// `extra` is the GCP project or Azure resource group.
    async fn update_credentials(
        &self,
        provider: CloudProvider,
        cluster: &str,
        region: &str,
        extra: Option<&str>,
    ) -> Result<()>;

    /// Returns the service's load balancer address, if one was assigned.
    async fn load_balancer_address(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Option<LoadBalancerAddress>>;
}

/// Resolves DNS records against a chosen resolver.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Returns the record values for a hostname, asking the given servers.
    ///
    /// An empty server list means the system resolver. Absence of records is
    /// reported as `DnsError::NoRecords`.
    async fn resolve(
        &self,
        hostname: &str,
        kind: RecordKind,
        servers: &[ResolverServer],
    ) -> Result<Vec<String>>;
}

/// Probes a public application endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EndpointProber: Send + Sync {
    /// Sends a request to the URL and reports the outcome.
    async fn probe(&self, url: &str) -> ProbeResult;
}
