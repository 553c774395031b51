//! Live discovery of what a deployment still owns.
//!
//! Nothing here is read from the state record. Each field is the answer to a
//! query made when destroy runs, so a namespace deleted by hand since the
//! last deploy is reported as absent.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DeploymentLayout;
use crate::error::Result;
use crate::tools::Toolchain;

/// Timeout for the reachability probe.
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the namespace lookup.
const NAMESPACE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the release lookup.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(60);

/// What exists for a deployment right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentScope {
    /// The deployment directory exists.
    pub has_local_files: bool,
    /// The release is installed in an existing namespace.
    pub has_helm_release: bool,
    /// The namespace exists.
    pub has_namespace: bool,
    /// Terraform state holds provisioned resources.
    pub has_infrastructure: bool,
    /// The cluster answered.
    pub cluster_accessible: bool,
}

/// Names that identify a deployment's cluster resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentIdentity {
    /// Deployment name.
    pub name: String,
    /// Namespace holding the release.
    pub namespace: String,
    /// Release name.
    pub release: String,
}

impl DeploymentScope {
    /// Queries every source of truth for the deployment.
    ///
    /// Namespace and release lookups run concurrently; a release reported in
    /// a namespace that does not exist counts as absent.
    pub async fn discover(
        tools: Toolchain<'_>,
        layout: &DeploymentLayout,
        identity: &DeploymentIdentity,
    ) -> Self {
        let has_local_files = layout.deployment_dir(&identity.name).is_dir();

        let has_infrastructure = match tools.infra.has_resources(&identity.name).await {
            Ok(present) => present,
            Err(e) => {
                warn!("Could not read Terraform state: {e}");
                false
            }
        };

        let cluster_accessible =
            tokio::time::timeout(REACHABILITY_TIMEOUT, tools.cluster.is_cluster_accessible())
                .await
                .unwrap_or(false);

        let (has_namespace, has_release) = if cluster_accessible {
            tokio::join!(
                bounded(
                    "namespace lookup",
                    NAMESPACE_TIMEOUT,
                    tools.cluster.namespace_exists(&identity.namespace),
                ),
                bounded(
                    "release lookup",
                    RELEASE_TIMEOUT,
                    async {
                        tools
                            .release
                            .get_installed_version(&identity.release, &identity.namespace)
                            .await
                            .map(|r| r.is_some())
                    },
                ),
            )
        } else {
            debug!("Cluster unreachable; treating namespace and release as absent");
            (false, false)
        };

        Self {
            has_local_files,
            has_helm_release: has_release && has_namespace,
            has_namespace,
            has_infrastructure,
            cluster_accessible,
        }
    }

    /// Returns true if the request would not remove anything.
    #[must_use]
    pub const fn is_empty_for(&self, destroy_infra: bool, delete_local: bool) -> bool {
        !self.has_helm_release
            && !self.has_namespace
            && !(destroy_infra && self.has_infrastructure)
            && !(delete_local && self.has_local_files)
    }
}

/// Awaits a boolean query under a timeout; failures and timeouts read as false.
async fn bounded<F>(what: &str, limit: Duration, query: F) -> bool
where
    F: Future<Output = Result<bool>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => {
            warn!("{what} failed: {e}");
            false
        }
        Err(_) => {
            warn!("{what} timed out after {}s", limit.as_secs());
            false
        }
    }
}
