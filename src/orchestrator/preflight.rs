//! Preflight checks run before anything is changed.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DeploymentConfig;
use crate::error::{DeployError, Result};
use crate::tools::Toolchain;

/// Which external tools were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolReport {
    /// Terraform is installed.
    pub terraform: bool,
    /// Helm is installed.
    pub helm: bool,
    /// kubectl is installed.
    pub kubectl: bool,
}

impl ToolReport {
    /// Probes all tools concurrently.
    pub async fn probe(tools: Toolchain<'_>) -> Self {
        let (terraform, helm, kubectl) = tokio::join!(
            tools.infra.is_available(),
            tools.release.is_available(),
            tools.cluster.is_available(),
        );
        debug!("Tools found: terraform={terraform} helm={helm} kubectl={kubectl}");
        Self {
            terraform,
            helm,
            kubectl,
        }
    }

    /// Fails if a tool this run needs is missing.
    ///
    /// Terraform is only needed when infrastructure will be provisioned.
    ///
    /// # Errors
    ///
    /// Returns `ToolMissing` naming the first missing tool.
    pub fn require(&self, needs_infra: bool) -> Result<()> {
        let missing = if !self.helm {
            Some("helm")
        } else if !self.kubectl {
            Some("kubectl")
        } else if needs_infra && !self.terraform {
            Some("terraform")
        } else {
            None
        };

        match missing {
            Some(tool) => Err(DeployError::ToolMissing {
                tool: tool.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Makes sure the cluster answers, regenerating credentials once if allowed.
///
/// # Errors
///
/// Returns `ClusterUnreachable` if the cluster still does not answer.
pub async fn ensure_cluster_access(
    tools: Toolchain<'_>,
    config: &DeploymentConfig,
    allow_repair: bool,
) -> Result<()> {
    if tools.cluster.is_cluster_accessible().await {
        return Ok(());
    }

    if !allow_repair {
        return Err(DeployError::ClusterUnreachable {
            message: String::from("kubectl cannot reach the cluster"),
        }
        .into());
    }

    let infra = &config.infrastructure;
    info!(
        "Cluster unreachable, refreshing credentials for {} ({})",
        infra.cluster_name, infra.provider
    );

    if let Err(e) = tools
        .cluster
        .update_credentials(
            infra.provider,
            &infra.cluster_name,
            &infra.region,
            config.credential_extra(),
        )
        .await
    {
        warn!("Credential refresh failed: {e}");
        return Err(DeployError::ClusterUnreachable {
            message: format!("credential refresh failed: {e}"),
        }
        .into());
    }

    if tools.cluster.is_cluster_accessible().await {
        info!("Cluster reachable after credential refresh");
        Ok(())
    } else {
        Err(DeployError::ClusterUnreachable {
            message: format!(
                "cluster {} is still unreachable after refreshing credentials",
                infra.cluster_name
            ),
        }
        .into())
    }
}
