//! Configuration module for kdeploy.
//!
//! This module handles all configuration-related functionality:
//! - Parsing the wizard-authored deployment config
//! - Validation of configuration values
//! - Computing configuration hashes for change detection
//! - Resolving the on-disk layout of deployment files

mod hash;
mod layout;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use layout::{CONFIG_FILE, DeploymentLayout, STATE_FILE, TERRAFORM_DIR, VALUES_FILE};
pub use parser::ConfigParser;
pub use spec::{
    ApplicationConfig, CloudProvider, DatabaseConfig, DeploymentConfig, DnsConfig,
    InfrastructureConfig, InfrastructureMode, IngressConfig, SUPPORTED_DNS_PROVIDERS,
    is_supported_dns_provider, namespace_for,
};
pub use validator::{ConfigValidator, ValidationResult};
