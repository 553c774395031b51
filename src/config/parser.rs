//! Loading of wizard-authored deployment configs.
//!
//! A deployment's config lives in its directory next to an optional `.env`
//! file. Values from `.env` and the process environment can override a few
//! fields through `KDEPLOY_*` variables.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, KdeployError, Result};

use super::layout::DeploymentLayout;
use super::spec::DeploymentConfig;

/// Sets one config field from an environment value.
type Override = fn(&mut DeploymentConfig, String);

/// Environment variables that override config fields.
const ENV_OVERRIDES: [(&str, Override); 4] = [
    ("KDEPLOY_DOMAIN", |c, v| c.domain = v),
    ("KDEPLOY_REGION", |c, v| c.infrastructure.region = v),
    ("KDEPLOY_CLUSTER_NAME", |c, v| c.infrastructure.cluster_name = v),
    ("KDEPLOY_CHART_VERSION", |c, v| c.application.chart_version = Some(v)),
];

/// Reads deployment configs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigParser;

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Loads the config of the named deployment.
    ///
    /// The deployment's `.env` is loaded first (existing variables win), then
    /// the YAML is parsed and `KDEPLOY_*` overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if the deployment has no config, a parse error
    /// for unreadable YAML or `.env`, and a validation error if the config
    /// names a different deployment.
    pub fn load(&self, layout: &DeploymentLayout, name: &str) -> Result<DeploymentConfig> {
        load_dotenv(&layout.deployment_dir(name).join(".env"))?;

        let path = layout.config_path(name);
        info!("Loading configuration from: {}", path.display());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound { path }.into());
            }
            Err(e) => {
                return Err(ConfigError::ParseError {
                    message: format!("Failed to read file: {e}"),
                    location: Some(path.display().to_string()),
                }
                .into());
            }
        };

        let mut config = self.parse_yaml(&content, Some(path.as_path()))?;
        apply_env_overrides(&mut config);

        if config.name != name {
            return Err(ConfigError::validation(
                format!(
                    "Config in {} is for deployment '{}', not '{name}'",
                    path.display(),
                    config.name
                ),
                "name",
            )
            .into());
        }

        Ok(config)
    }

    /// Parses a config from YAML text.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the YAML does not describe a deployment.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeploymentConfig> {
        serde_yaml::from_str(content).map_err(|e| {
            KdeployError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }
}

/// Applies `KDEPLOY_*` overrides present in the environment.
fn apply_env_overrides(config: &mut DeploymentConfig) {
    for (var, apply) in ENV_OVERRIDES {
        if let Ok(value) = std::env::var(var) {
            debug!("Overriding config from {var}");
            apply(config, value);
        }
    }
}

/// Loads a `.env` file into the process environment if it exists.
fn load_dotenv(path: &Path) -> Result<()> {
    if !path.exists() {
        debug!("No .env at {}", path.display());
        return Ok(());
    }

    debug!("Loading environment from {}", path.display());
    dotenvy::from_path(path).map_err(|e| {
        KdeployError::Config(ConfigError::ParseError {
            message: format!("Failed to load .env file: {e}"),
            location: Some(path.display().to_string()),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{CloudProvider, InfrastructureMode};
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
name: staging
domain: app.example.com
infrastructure:
  mode: existing
  provider: aws
  region: eu-west-1
  cluster_name: staging-eks
application:
  chart: oci://registry.example.com/charts/app
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("config should parse");

        assert_eq!(config.name, "staging");
        assert_eq!(config.infrastructure.mode, InfrastructureMode::Existing);
        assert_eq!(config.infrastructure.provider, CloudProvider::Aws);
        assert_eq!(config.dns.provider, "manual");
        assert!(!config.external_dns_enabled());
        assert_eq!(config.ingress.service, "ingress-nginx-controller");
        assert_eq!(config.release_name(), "staging");
        assert_eq!(config.namespace(), "staging");
        assert!(config.database_hostname().is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
name: prod
domain: app.example.com
infrastructure:
  mode: provision
  provider: gcp
  region: europe-west1
  cluster_name: prod-gke
  project: acme-prod
dns:
  provider: cloudflare
  auto_manage: true
database:
  self_hosted: true
application:
  chart: acme/app
  chart_version: 2.4.1
  release_name: acme
  namespace: acme-prod
  hps_version: 1.9.0
ingress:
  namespace: ingress
  service: edge
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("config should parse");

        assert!(config.provisions_infrastructure());
        assert!(config.external_dns_enabled());
        assert_eq!(config.release_name(), "acme");
        assert_eq!(config.namespace(), "acme-prod");
        assert_eq!(config.credential_extra(), Some("acme-prod"));
        assert_eq!(
            config.database_hostname().as_deref(),
            Some("db.app.example.com")
        );
    }

    #[test]
    fn test_parse_rejects_unknown_provider() {
        let yaml = r"
name: prod
domain: app.example.com
infrastructure:
  mode: provision
  provider: openstack
  region: r1
  cluster_name: c1
application:
  chart: acme/app
";
        let result = ConfigParser::new().parse_yaml(yaml, None);
        assert!(matches!(
            result,
            Err(KdeployError::Config(ConfigError::ParseError { .. }))
        ));
    }

    const STAGING: &str = r"
name: staging
domain: app.example.com
infrastructure:
  mode: existing
  provider: aws
  region: eu-west-1
  cluster_name: staging-eks
application:
  chart: acme/app
  chart_version: 1.0.0
";

    fn layout_with(name: &str, config: &str) -> (TempDir, DeploymentLayout) {
        let temp = TempDir::new().expect("temp dir");
        let layout = DeploymentLayout::new(temp.path());
        std::fs::create_dir_all(layout.deployment_dir(name)).expect("create dir");
        std::fs::write(layout.config_path(name), config).expect("write config");
        (temp, layout)
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().expect("temp dir");
        let layout = DeploymentLayout::new(temp.path());

        let result = ConfigParser::new().load(&layout, "staging");
        assert!(matches!(
            result,
            Err(KdeployError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_load_rejects_config_for_another_deployment() {
        let (_temp, layout) = layout_with("prod", STAGING);

        let result = ConfigParser::new().load(&layout, "prod");
        assert!(matches!(
            result,
            Err(KdeployError::Config(ConfigError::ValidationError { .. }))
        ));
    }

    #[test]
    fn test_load_applies_dotenv_overrides() {
        let (_temp, layout) = layout_with("staging", STAGING);
        std::fs::write(
            layout.deployment_dir("staging").join(".env"),
            "KDEPLOY_CHART_VERSION=1.1.0\n",
        )
        .expect("write .env");

        let config = ConfigParser::new()
            .load(&layout, "staging")
            .expect("config should load");
        assert_eq!(config.application.chart_version.as_deref(), Some("1.1.0"));
        assert_eq!(config.domain, "app.example.com");
    }
}
