//! On-disk layout of deployment files.
//!
//! Every deployment owns one directory under `<home>/deployments/<name>`
//! holding the wizard's config, generated values, the Terraform workspace and
//! the persisted state record.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Name of the kdeploy home directory under the user's home.
const HOME_DIR: &str = ".kdeploy";

/// Directory holding one sub-directory per deployment.
const DEPLOYMENTS_DIR: &str = "deployments";

/// Directory holding Terraform templates, one sub-directory per provider.
const TEMPLATES_DIR: &str = "templates";

/// Deployment configuration file name.
pub const CONFIG_FILE: &str = "config.yaml";

/// Chart values file name.
pub const VALUES_FILE: &str = "values.yaml";

/// State file name.
pub const STATE_FILE: &str = "state.json";

/// Terraform workspace directory name.
pub const TERRAFORM_DIR: &str = "terraform";

/// Resolves paths for deployments under a kdeploy home directory.
#[derive(Debug, Clone)]
pub struct DeploymentLayout {
    /// Root of all kdeploy files.
    home: PathBuf,
}

impl DeploymentLayout {
    /// Creates a layout rooted at the given home directory.
    #[must_use]
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Creates a layout rooted at `~/.kdeploy`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user's home directory cannot be determined.
    pub fn from_user_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(Self::new(home.join(HOME_DIR)))
    }

    /// Returns the kdeploy home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Returns the directory containing all deployments.
    #[must_use]
    pub fn deployments_dir(&self) -> PathBuf {
        self.home.join(DEPLOYMENTS_DIR)
    }

    /// Returns the directory owned by one deployment.
    #[must_use]
    pub fn deployment_dir(&self, name: &str) -> PathBuf {
        self.deployments_dir().join(name)
    }

    /// Returns the deployment's config file path.
    #[must_use]
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.deployment_dir(name).join(CONFIG_FILE)
    }

    /// Returns the deployment's chart values file path.
    #[must_use]
    pub fn values_path(&self, name: &str) -> PathBuf {
        self.deployment_dir(name).join(VALUES_FILE)
    }

    /// Returns the deployment's state file path.
    #[must_use]
    pub fn state_path(&self, name: &str) -> PathBuf {
        self.deployment_dir(name).join(STATE_FILE)
    }

    /// Returns the deployment's Terraform workspace.
    #[must_use]
    pub fn terraform_dir(&self, name: &str) -> PathBuf {
        self.deployment_dir(name).join(TERRAFORM_DIR)
    }

    /// Returns the Terraform templates directory.
    #[must_use]
    pub fn templates_dir(&self) -> PathBuf {
        self.home.join(TEMPLATES_DIR)
    }
}
