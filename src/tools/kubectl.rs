//! kubectl adapter, plus the cloud CLIs that write cluster credentials.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CloudProvider;
use crate::error::{KdeployError, Result, ToolError};

use super::process::CommandSpec;
use super::{ClusterClient, LoadBalancerAddress};

/// Tool name used in errors.
const TOOL: &str = "kubectl";

/// Timeout for the reachability probe.
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout for read-only queries.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for PVC deletion.
const PVC_DELETE_TIMEOUT: Duration = Duration::from_secs(180);

/// Timeout for namespace deletion.
const NAMESPACE_DELETE_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for cloud credential commands.
const CREDENTIALS_TIMEOUT: Duration = Duration::from_secs(120);

/// Autoscaler resource whose finalizers block namespace deletion.
const SCALED_OBJECT_RESOURCE: &str = "scaledobjects.keda.sh";

/// kubectl adapter.
#[derive(Debug, Clone)]
pub struct KubectlCli {
    /// kubectl binary.
    binary: String,
}

impl KubectlCli {
    /// Creates a new kubectl adapter.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(TOOL, &self.binary)
    }
}

#[async_trait]
impl ClusterClient for KubectlCli {
    async fn is_available(&self) -> bool {
        self.command()
            .args(["version", "--client"])
            .timeout(QUERY_TIMEOUT)
            .succeeds()
            .await
    }

    async fn is_cluster_accessible(&self) -> bool {
        self.command()
            .args(["cluster-info", "--request-timeout=15s"])
            .timeout(REACHABILITY_TIMEOUT)
            .succeeds()
            .await
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let result = self
            .command()
            .args(["get", "namespace", namespace, "--output", "name"])
            .timeout(QUERY_TIMEOUT)
            .run()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete_pvcs(&self, namespace: &str) -> Result<()> {
        info!("Deleting persistent volume claims in {namespace}");
        self.command()
            .args(["delete", "pvc", "--all", "--namespace", namespace])
            .args(["--ignore-not-found", "--timeout=150s"])
            .timeout(PVC_DELETE_TIMEOUT)
            .run()
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        info!("Deleting namespace {namespace}");
        self.command()
            .args(["delete", "namespace", namespace])
            .args(["--ignore-not-found", "--timeout=540s"])
            .timeout(NAMESPACE_DELETE_TIMEOUT)
            .run()
            .await?;
        Ok(())
    }

    async fn remove_scaler_finalizers(&self, namespace: &str) -> Result<()> {
        let listed = self
            .command()
            .args(["get", SCALED_OBJECT_RESOURCE, "--namespace", namespace])
            .args(["--output", "name"])
            .timeout(QUERY_TIMEOUT)
            .run()
            .await;

        let output = match listed {
            Ok(output) => output,
            Err(e) if is_missing_resource_type(&e) => {
                debug!("No ScaledObject CRD installed; nothing to patch");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for object in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!("Removing finalizers from {object}");
            self.command()
                .args(["patch", object, "--namespace", namespace, "--type=merge"])
                .args(["--patch", r#"{"metadata":{"finalizers":null}}"#])
                .timeout(QUERY_TIMEOUT)
                .run()
                .await?;
        }

        Ok(())
    }

    async fn update_credentials(
        &self,
        provider: CloudProvider,
        cluster: &str,
        region: &str,
        extra: Option<&str>,
    ) -> Result<()> {
        info!("Refreshing {provider} credentials for cluster {cluster}");
        credentials_command(provider, cluster, region, extra)?
            .timeout(CREDENTIALS_TIMEOUT)
            .run()
            .await?;
        Ok(())
    }

    async fn load_balancer_address(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Option<LoadBalancerAddress>> {
        let result = self
            .command()
            .args(["get", "service", service, "--namespace", namespace])
            .args(["--output", "json"])
            .timeout(QUERY_TIMEOUT)
            .run()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if is_not_found(&e) => {
                warn!("Service {namespace}/{service} does not exist yet");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        parse_load_balancer(&output.stdout)
    }
}

/// Builds the provider CLI invocation that writes kubeconfig credentials.
fn credentials_command(
    provider: CloudProvider,
    cluster: &str,
    region: &str,
    extra: Option<&str>,
) -> Result<CommandSpec> {
    let command = match provider {
        CloudProvider::Aws => CommandSpec::new("aws", "aws").args([
            "eks",
            "update-kubeconfig",
            "--name",
            cluster,
            "--region",
            region,
        ]),
        CloudProvider::Gcp => {
            let project = require_extra("gcloud", extra, "GCP project")?;
            CommandSpec::new("gcloud", "gcloud").args([
                "container",
                "clusters",
                "get-credentials",
                cluster,
                "--region",
                region,
                "--project",
                project,
            ])
        }
        CloudProvider::Azure => {
            let group = require_extra("az", extra, "Azure resource group")?;
            CommandSpec::new("az", "az").args([
                "aks",
                "get-credentials",
                "--name",
                cluster,
                "--resource-group",
                group,
                "--overwrite-existing",
            ])
        }
    };
    Ok(command)
}

fn require_extra<'a>(tool: &str, extra: Option<&'a str>, what: &str) -> Result<&'a str> {
    extra.filter(|v| !v.is_empty()).ok_or_else(|| {
        KdeployError::Tool(ToolError::MissingInput {
            tool: tool.to_string(),
            message: format!("{what} is required to fetch cluster credentials"),
        })
    })
}

/// Extracts the first ingress address from a service JSON document.
fn parse_load_balancer(json: &str) -> Result<Option<LoadBalancerAddress>> {
    let service: Value = serde_json::from_str(json).map_err(|e| {
        KdeployError::Tool(ToolError::InvalidOutput {
            tool: TOOL.to_string(),
            message: format!("cannot parse service: {e}"),
        })
    })?;

    let Some(ingress) = service
        .pointer("/status/loadBalancer/ingress")
        .and_then(Value::as_array)
    else {
        return Ok(None);
    };

    Ok(ingress.iter().find_map(|entry| {
        entry
            .get("ip")
            .or_else(|| entry.get("hostname"))
            .and_then(Value::as_str)
            .and_then(LoadBalancerAddress::parse)
    }))
}

/// Returns true if kubectl reported a missing object.
fn is_not_found(err: &KdeployError) -> bool {
    matches!(
        err,
        KdeployError::Tool(ToolError::CommandFailed { stderr, .. })
            if stderr.contains("NotFound") || stderr.contains("not found")
    )
}

/// Returns true if kubectl reported an unknown resource type.
fn is_missing_resource_type(err: &KdeployError) -> bool {
    matches!(
        err,
        KdeployError::Tool(ToolError::CommandFailed { stderr, .. })
            if stderr.contains("doesn't have a resource type")
    )
}
