//! Configuration specification types for a deployment.
//!
//! These structs map to the `config.yaml` file the setup wizard writes into
//! each deployment directory. kdeploy only ever reads them.

use serde::{Deserialize, Serialize};

/// DNS providers the in-cluster external-DNS controller can manage.
pub const SUPPORTED_DNS_PROVIDERS: &[&str] = &["route53", "cloudflare", "google", "azure"];

/// Default ingress controller namespace.
pub const DEFAULT_INGRESS_NAMESPACE: &str = "ingress-nginx";

/// Default ingress controller service name.
pub const DEFAULT_INGRESS_SERVICE: &str = "ingress-nginx-controller";

/// Default subdomain for a self-hosted database endpoint.
pub const DEFAULT_DATABASE_SUBDOMAIN: &str = "db";

/// The root configuration for a named deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentConfig {
    /// Deployment name. Also keys the state record and local files.
    pub name: String,
    /// Public base domain the application is served from.
    pub domain: String,
    /// Infrastructure settings.
    pub infrastructure: InfrastructureConfig,
    /// DNS settings.
    #[serde(default)]
    pub dns: DnsConfig,
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Chart and release settings.
    pub application: ApplicationConfig,
    /// Ingress controller that fronts the application.
    #[serde(default)]
    pub ingress: IngressConfig,
}

/// Infrastructure configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfrastructureConfig {
    /// Whether kdeploy provisions the cluster or targets an existing one.
    pub mode: InfrastructureMode,
    /// Cloud provider hosting the cluster.
    pub provider: CloudProvider,
    /// Cloud region.
    pub region: String,
    /// Kubernetes cluster name.
    pub cluster_name: String,
    /// GCP project id.
    #[serde(default)]
    pub project: Option<String>,
    /// Azure resource group.
    #[serde(default)]
    pub resource_group: Option<String>,
}

/// Infrastructure modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InfrastructureMode {
    /// Provision the cluster with Terraform.
    Provision,
    /// Use a cluster that already exists.
    #[default]
    Existing,
}

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    /// Amazon Web Services (EKS).
    Aws,
    /// Google Cloud (GKE).
    Gcp,
    /// Microsoft Azure (AKS).
    Azure,
}

/// DNS configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsConfig {
    /// DNS provider hosting the zone (e.g. `route53`, `cloudflare`, `manual`).
    #[serde(default = "default_dns_provider")]
    pub provider: String,
    /// Whether records should be managed by the in-cluster controller.
    #[serde(default)]
    pub auto_manage: bool,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Whether the chart runs its own database exposed on a subdomain.
    #[serde(default)]
    pub self_hosted: bool,
    /// Subdomain used for the database endpoint.
    #[serde(default = "default_database_subdomain")]
    pub subdomain: String,
}

/// Chart and release configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Chart reference (repo/chart, OCI URL or local path).
    pub chart: String,
    /// Chart version to install.
    #[serde(default)]
    pub chart_version: Option<String>,
    /// Release name, defaults to the deployment name.
    #[serde(default)]
    pub release_name: Option<String>,
    /// Target namespace, derived from the deployment name when absent.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Version of the bundled HPS component, recorded in state.
    #[serde(default)]
    pub hps_version: Option<String>,
}

/// Ingress controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngressConfig {
    /// Namespace of the ingress controller service.
    #[serde(default = "default_ingress_namespace")]
    pub namespace: String,
    /// Name of the ingress controller `LoadBalancer` service.
    #[serde(default = "default_ingress_service")]
    pub service: String,
}

fn default_dns_provider() -> String {
    String::from("manual")
}

fn default_database_subdomain() -> String {
    String::from(DEFAULT_DATABASE_SUBDOMAIN)
}

fn default_ingress_namespace() -> String {
    String::from(DEFAULT_INGRESS_NAMESPACE)
}

fn default_ingress_service() -> String {
    String::from(DEFAULT_INGRESS_SERVICE)
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            provider: default_dns_provider(),
            auto_manage: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            self_hosted: false,
            subdomain: default_database_subdomain(),
        }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            namespace: default_ingress_namespace(),
            service: default_ingress_service(),
        }
    }
}

/// Returns true if the external-DNS controller supports the provider.
#[must_use]
pub fn is_supported_dns_provider(provider: &str) -> bool {
    SUPPORTED_DNS_PROVIDERS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(provider))
}

/// Derives a Kubernetes namespace from a deployment name.
///
/// The result is a valid DNS label: lowercase alphanumerics and hyphens, at
/// most 63 characters, never starting or ending with a hyphen.
#[must_use]
pub fn namespace_for(name: &str) -> String {
    let mut ns = String::with_capacity(name.len());
    let mut last_hyphen = true;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            ns.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            ns.push('-');
            last_hyphen = true;
        }
    }

    ns.truncate(63);
    let ns = ns.trim_end_matches('-').to_string();

    if ns.is_empty() {
        String::from("default-app")
    } else {
        ns
    }
}

impl DeploymentConfig {
    /// Returns true if records are created by the in-cluster DNS controller.
    #[must_use]
    pub fn external_dns_enabled(&self) -> bool {
        self.dns.auto_manage && is_supported_dns_provider(&self.dns.provider)
    }

    /// Returns true if this deployment provisions its own infrastructure.
    #[must_use]
    pub fn provisions_infrastructure(&self) -> bool {
        self.infrastructure.mode == InfrastructureMode::Provision
    }

    /// Returns the Helm release name.
    #[must_use]
    pub fn release_name(&self) -> String {
        self.application
            .release_name
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }

    /// Returns the target namespace.
    #[must_use]
    pub fn namespace(&self) -> String {
        self.application
            .namespace
            .clone()
            .unwrap_or_else(|| namespace_for(&self.name))
    }

    /// Returns the database hostname when the database is self-hosted.
    #[must_use]
    pub fn database_hostname(&self) -> Option<String> {
        self.database
            .self_hosted
            .then(|| format!("{}.{}", self.database.subdomain, self.domain))
    }

    /// Returns the provider-specific extra credential argument.
    #[must_use]
    pub fn credential_extra(&self) -> Option<&str> {
        match self.infrastructure.provider {
            CloudProvider::Gcp => self.infrastructure.project.as_deref(),
            CloudProvider::Azure => self.infrastructure.resource_group.as_deref(),
            CloudProvider::Aws => None,
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
        };
        write!(f, "{provider}")
    }
}

impl std::fmt::Display for InfrastructureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            Self::Provision => "provision",
            Self::Existing => "existing",
        };
        write!(f, "{mode}")
    }
}
