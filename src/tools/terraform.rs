//! Terraform adapter for infrastructure provisioning.
//!
//! Each deployment gets its own Terraform workspace under the deployment
//! directory. Templates are copied in once per deployment. The workspace
//! outlives `terraform destroy`, so whether infrastructure exists is read
//! from the Terraform state, not from the files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{CloudProvider, DeploymentLayout};
use crate::error::{KdeployError, Result, ToolError};

use super::process::CommandSpec;
use super::{InfraProvisioner, PlanArtifact};

/// Tool name used in errors.
const TOOL: &str = "terraform";

/// Plan file written by `plan` and consumed by `apply`.
const PLAN_FILE: &str = "tfplan";

/// Variables file the config wizard writes into the workspace.
const VARS_FILE: &str = "terraform.tfvars";

/// Local state file.
const STATE_FILE: &str = "terraform.tfstate";

/// Timeout for `terraform version`.
const VERSION_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for `terraform state list` against a remote backend.
const STATE_LIST_TIMEOUT: Duration = Duration::from_secs(60);

/// The part of a `terraform.tfstate` document needed to count resources.
#[derive(Debug, Deserialize)]
struct LocalState {
    #[serde(default)]
    resources: Vec<StateResource>,
}

/// One resource block of the state document.
#[derive(Debug, Deserialize)]
struct StateResource {
    #[serde(default)]
    mode: String,
    #[serde(default)]
    instances: Vec<serde_json::Value>,
}

impl LocalState {
    /// Returns true if any managed resource still has an instance.
    fn has_managed_resources(&self) -> bool {
        self.resources
            .iter()
            .any(|r| r.mode != "data" && !r.instances.is_empty())
    }
}

/// Terraform CLI adapter.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    /// Terraform binary.
    binary: String,
    /// Layout used to locate workspaces and templates.
    layout: DeploymentLayout,
}

impl TerraformCli {
    /// Creates a new Terraform adapter.
    #[must_use]
    pub fn new(binary: impl Into<String>, layout: DeploymentLayout) -> Self {
        Self {
            binary: binary.into(),
            layout,
        }
    }

    /// Builds a terraform command running in the deployment's workspace.
    fn command(&self, name: &str) -> CommandSpec {
        CommandSpec::new(TOOL, &self.binary)
            .current_dir(self.layout.terraform_dir(name))
            .env("TF_IN_AUTOMATION", "1")
    }

    /// Returns `-var-file` arguments when the wizard wrote a variables file.
    fn var_file_args(&self, name: &str) -> Vec<String> {
        if self.layout.terraform_dir(name).join(VARS_FILE).exists() {
            vec![format!("-var-file={VARS_FILE}")]
        } else {
            Vec::new()
        }
    }

    /// Fails with a structured error when the workspace is missing.
    fn require_workspace(&self, name: &str) -> Result<PathBuf> {
        let dir = self.layout.terraform_dir(name);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(KdeployError::Tool(ToolError::MissingInput {
                tool: TOOL.to_string(),
                message: format!("no Terraform workspace at {}", dir.display()),
            }))
        }
    }
}

#[async_trait]
impl InfraProvisioner for TerraformCli {
    async fn is_available(&self) -> bool {
        CommandSpec::new(TOOL, &self.binary)
            .args(["version"])
            .timeout(VERSION_TIMEOUT)
            .succeeds()
            .await
    }

    async fn has_workspace(&self, name: &str) -> Result<bool> {
        let dir = self.layout.terraform_dir(name);
        if !dir.is_dir() {
            return Ok(false);
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.ends_with(".tf")
                || file_name.starts_with("terraform.tfstate")
                || file_name == ".terraform"
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn has_resources(&self, name: &str) -> Result<bool> {
        let dir = self.layout.terraform_dir(name);
        if !dir.is_dir() {
            return Ok(false);
        }

        match tokio::fs::read_to_string(dir.join(STATE_FILE)).await {
            Ok(content) => {
                let state = parse_local_state(&content)?;
                debug!("{name}: {} resource block(s) in local state", state.resources.len());
                Ok(state.has_managed_resources())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // No local state: either never applied or a remote backend.
                if !dir.join(".terraform").exists() {
                    return Ok(false);
                }
                let output = self
                    .command(name)
                    .args(["state", "list", "-no-color"])
                    .timeout(STATE_LIST_TIMEOUT)
                    .run()
                    .await?;
                Ok(output.stdout.lines().any(|line| !line.trim().is_empty()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn setup_workspace(&self, name: &str, provider: CloudProvider) -> Result<()> {
        let source = self.layout.templates_dir().join(provider.to_string());
        let target = self.layout.terraform_dir(name);

        if !source.is_dir() {
            return Err(KdeployError::Tool(ToolError::MissingInput {
                tool: TOOL.to_string(),
                message: format!("no Terraform templates for {provider} at {}", source.display()),
            }));
        }

        info!(
            "Copying {provider} templates from {} to {}",
            source.display(),
            target.display()
        );
        copy_dir(&source, &target).await
    }

    async fn init(&self, name: &str) -> Result<()> {
        self.require_workspace(name)?;
        info!("Running terraform init for {name}");
        self.command(name)
            .args(["init", "-input=false", "-no-color"])
            .run()
            .await?;
        Ok(())
    }

    async fn plan(&self, name: &str) -> Result<PlanArtifact> {
        let dir = self.require_workspace(name)?;
        info!("Running terraform plan for {name}");
        self.command(name)
            .args(["plan", "-input=false", "-no-color"])
            .arg(format!("-out={PLAN_FILE}"))
            .args(self.var_file_args(name))
            .run()
            .await?;

        Ok(PlanArtifact::new(name, dir.join(PLAN_FILE)))
    }

    async fn apply(&self, name: &str, plan: PlanArtifact) -> Result<()> {
        if plan.deployment() != name || !plan.path().exists() {
            return Err(KdeployError::Tool(ToolError::MissingInput {
                tool: TOOL.to_string(),
                message: format!("plan artifact {} is not valid for {name}", plan.path().display()),
            }));
        }

        info!("Running terraform apply for {name}");
        self.command(name)
            .args(["apply", "-input=false", "-no-color", "-auto-approve"])
            .arg(plan.path().display().to_string())
            .run()
            .await?;

        if let Err(e) = tokio::fs::remove_file(plan.path()).await {
            debug!("Could not remove applied plan file: {e}");
        }
        Ok(())
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        self.require_workspace(name)?;
        warn!("Running terraform destroy for {name}");
        self.command(name)
            .args(["destroy", "-input=false", "-no-color", "-auto-approve"])
            .args(self.var_file_args(name))
            .run()
            .await?;
        Ok(())
    }
}

/// Parses a local state document.
fn parse_local_state(content: &str) -> Result<LocalState> {
    serde_json::from_str(content).map_err(|e| {
        KdeployError::Tool(ToolError::InvalidOutput {
            tool: TOOL.to_string(),
            message: format!("unreadable {STATE_FILE}: {e}"),
        })
    })
}

/// Recursively copies a directory, skipping files that already exist.
async fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    let mut pending = vec![(source.to_path_buf(), target.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;

        while let Some(entry) = entries.next_entry().await? {
            let dest = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), dest));
            } else if !dest.exists() {
                tokio::fs::copy(entry.path(), &dest).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn adapter(temp: &TempDir) -> TerraformCli {
        TerraformCli::new("terraform", DeploymentLayout::new(temp.path()))
    }

    #[tokio::test]
    async fn test_has_workspace_requires_terraform_files() {
        let temp = TempDir::new().expect("temp dir");
        let tf = adapter(&temp);

        assert!(!tf.has_workspace("prod").await.expect("has_workspace"));

        let dir = temp.path().join("deployments/prod/terraform");
        std::fs::create_dir_all(&dir).expect("create dir");
        assert!(!tf.has_workspace("prod").await.expect("has_workspace"));

        std::fs::write(dir.join("main.tf"), "").expect("write file");
        assert!(tf.has_workspace("prod").await.expect("has_workspace"));
    }

    #[tokio::test]
    async fn test_destroyed_state_has_no_resources() {
        let temp = TempDir::new().expect("temp dir");
        let tf = adapter(&temp);
        let dir = temp.path().join("deployments/prod/terraform");
        std::fs::create_dir_all(&dir).expect("create dir");
        std::fs::write(dir.join("main.tf"), "").expect("write file");

        assert!(!tf.has_resources("prod").await.expect("has_resources"));

        std::fs::write(dir.join(STATE_FILE), r#"{"version":4,"resources":[]}"#).expect("write");
        assert!(tf.has_workspace("prod").await.expect("has_workspace"));
        assert!(!tf.has_resources("prod").await.expect("has_resources"));
    }

    #[tokio::test]
    async fn test_applied_state_has_resources() {
        let temp = TempDir::new().expect("temp dir");
        let tf = adapter(&temp);
        let dir = temp.path().join("deployments/prod/terraform");
        std::fs::create_dir_all(&dir).expect("create dir");

        let applied = r#"{
            "version": 4,
            "resources": [
                {"mode": "data", "type": "aws_region", "name": "current", "instances": [{}]},
                {"mode": "managed", "type": "aws_eks_cluster", "name": "main", "instances": [{}]}
            ]
        }"#;
        std::fs::write(dir.join(STATE_FILE), applied).expect("write");
        assert!(tf.has_resources("prod").await.expect("has_resources"));

        let data_only = r#"{"resources": [{"mode": "data", "instances": [{}]}]}"#;
        std::fs::write(dir.join(STATE_FILE), data_only).expect("write");
        assert!(!tf.has_resources("prod").await.expect("has_resources"));
    }

    #[tokio::test]
    async fn test_corrupt_state_is_an_error() {
        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().join("deployments/prod/terraform");
        std::fs::create_dir_all(&dir).expect("create dir");
        std::fs::write(dir.join(STATE_FILE), "{not json").expect("write");

        let result = adapter(&temp).has_resources("prod").await;
        assert!(matches!(
            result,
            Err(KdeployError::Tool(ToolError::InvalidOutput { .. }))
        ));
    }

    #[tokio::test]
    async fn test_setup_workspace_copies_templates() {
        let temp = TempDir::new().expect("temp dir");
        let templates = temp.path().join("templates/aws/modules/eks");
        std::fs::create_dir_all(&templates).expect("create dir");
        std::fs::write(temp.path().join("templates/aws/main.tf"), "root").expect("write");
        std::fs::write(templates.join("eks.tf"), "module").expect("write");

        let tf = adapter(&temp);
        tf.setup_workspace("prod", CloudProvider::Aws)
            .await
            .expect("setup should succeed");

        let workspace = temp.path().join("deployments/prod/terraform");
        assert!(workspace.join("main.tf").exists());
        assert!(workspace.join("modules/eks/eks.tf").exists());
        assert!(tf.has_workspace("prod").await.expect("has_workspace"));
    }

    #[tokio::test]
    async fn test_setup_workspace_without_templates_fails() {
        let temp = TempDir::new().expect("temp dir");
        let result = adapter(&temp)
            .setup_workspace("prod", CloudProvider::Gcp)
            .await;
        assert!(matches!(
            result,
            Err(KdeployError::Tool(ToolError::MissingInput { .. }))
        ));
    }

    #[tokio::test]
    async fn test_apply_rejects_foreign_plan() {
        let temp = TempDir::new().expect("temp dir");
        let plan = PlanArtifact::new("staging", temp.path().join("tfplan"));
        let result = adapter(&temp).apply("prod", plan).await;
        assert!(matches!(
            result,
            Err(KdeployError::Tool(ToolError::MissingInput { .. }))
        ));
    }
}
