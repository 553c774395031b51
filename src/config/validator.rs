//! Configuration validation for deployment configs.
//!
//! Checks the values the orchestrator relies on before any external tool is
//! touched, so a typo fails fast instead of halfway through a provision.

use crate::error::{ConfigError, KdeployError, Result};
use tracing::debug;

use super::spec::{CloudProvider, DeploymentConfig, is_supported_dns_provider};

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &DeploymentConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_identity(config, &mut result);
        Self::validate_infrastructure(config, &mut result);
        Self::validate_dns(config, &mut result);
        Self::validate_application(config, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(KdeployError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates the deployment name and domain.
    fn validate_identity(config: &DeploymentConfig, result: &mut ValidationResult) {
        if !is_valid_name(&config.name) {
            result.errors.push(ValidationError {
                field: String::from("name"),
                message: format!(
                    "Deployment name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.name
                ),
            });
        }

        if !is_valid_domain(&config.domain) {
            result.errors.push(ValidationError {
                field: String::from("domain"),
                message: format!("Domain '{}' is not a valid hostname", config.domain),
            });
        }
    }

    /// Validates infrastructure settings.
    fn validate_infrastructure(config: &DeploymentConfig, result: &mut ValidationResult) {
        let infra = &config.infrastructure;

        if infra.region.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("infrastructure.region"),
                message: String::from("Region cannot be empty"),
            });
        }

        if infra.cluster_name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("infrastructure.cluster_name"),
                message: String::from("Cluster name cannot be empty"),
            });
        }

        match infra.provider {
            CloudProvider::Gcp if infra.project.is_none() => {
                result.errors.push(ValidationError {
                    field: String::from("infrastructure.project"),
                    message: String::from("GCP deployments require a project id"),
                });
            }
            CloudProvider::Azure if infra.resource_group.is_none() => {
                result.errors.push(ValidationError {
                    field: String::from("infrastructure.resource_group"),
                    message: String::from("Azure deployments require a resource group"),
                });
            }
            _ => {}
        }
    }

    /// Validates DNS settings.
    fn validate_dns(config: &DeploymentConfig, result: &mut ValidationResult) {
        if config.dns.auto_manage && !is_supported_dns_provider(&config.dns.provider) {
            result.warnings.push(format!(
                "dns.provider: '{}' cannot be managed automatically; DNS records must be created manually",
                config.dns.provider
            ));
        }

        if config.database.self_hosted && !is_valid_label(&config.database.subdomain) {
            result.errors.push(ValidationError {
                field: String::from("database.subdomain"),
                message: format!(
                    "Database subdomain '{}' is not a valid DNS label",
                    config.database.subdomain
                ),
            });
        }
    }

    /// Validates chart settings.
    fn validate_application(config: &DeploymentConfig, result: &mut ValidationResult) {
        if config.application.chart.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("application.chart"),
                message: String::from("Chart reference cannot be empty"),
            });
        }

        if let Some(ns) = &config.application.namespace
            && !is_valid_label(ns)
        {
            result.errors.push(ValidationError {
                field: String::from("application.namespace"),
                message: format!("Namespace '{ns}' is not a valid DNS label"),
            });
        }

        if config.application.chart_version.is_none() {
            result
                .warnings
                .push(String::from("application.chart_version: no version pinned, latest will be installed"));
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// Validates a single DNS label.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validates a fully-qualified hostname.
fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    domain.len() <= 253
        && domain.contains('.')
        && domain
            .split('.')
            .all(|label| is_valid_label(&label.to_ascii_lowercase()))
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
