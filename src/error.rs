//! Error types for the kdeploy lifecycle.
//!
//! This module provides the error hierarchy for every stage of a deployment:
//! configuration, state persistence, external tools, DNS lookups and the
//! orchestration itself.

use std::path::PathBuf;
use thiserror::Error;

/// Number of trailing stderr lines kept in a command failure summary.
const STDERR_SUMMARY_LINES: usize = 5;

/// The main error type for kdeploy.
#[derive(Debug, Error)]
pub enum KdeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State persistence errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// External tool invocation errors.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// DNS lookup errors.
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    /// Deployment lifecycle errors.
    #[error("{0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// No home directory could be determined for deployment files.
    #[error("Cannot determine kdeploy home directory; set KDEPLOY_HOME")]
    NoHomeDirectory,
}

/// State persistence errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// No state recorded for the named deployment.
    #[error("No deployment named '{name}' found")]
    UnknownDeployment {
        /// Deployment name.
        name: String,
    },
}

/// Errors raised by external tool adapters.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary could not be found on `PATH`.
    #[error("{tool} is not installed or not on PATH")]
    NotInstalled {
        /// Tool name.
        tool: String,
    },

    /// The process could not be spawned.
    #[error("Failed to run {tool}: {message}")]
    SpawnFailed {
        /// Tool name.
        tool: String,
        /// Description of the spawn failure.
        message: String,
    },

    /// The process exited unsuccessfully.
    #[error("`{command}` failed (exit code {}): {}", exit_code_label(.exit_code), summarize(.stderr, .stdout))]
    CommandFailed {
        /// Tool name.
        tool: String,
        /// Rendered command line.
        command: String,
        /// Exit code if the process exited normally.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The process did not finish in time and was killed.
    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout {
        /// Tool name.
        tool: String,
        /// Rendered command line.
        command: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// The tool produced output that could not be interpreted.
    #[error("Unexpected output from {tool}: {message}")]
    InvalidOutput {
        /// Tool name.
        tool: String,
        /// Description of the problem.
        message: String,
    },

    /// The tool was asked to operate on something that does not exist.
    #[error("{tool}: {message}")]
    MissingInput {
        /// Tool name.
        tool: String,
        /// Description of the missing input.
        message: String,
    },

    /// An HTTP probe could not be performed.
    #[error("HTTP probe failed: {message}")]
    Http {
        /// Description of the failure.
        message: String,
    },
}

/// DNS lookup errors.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The name exists (or not) but has no records of the requested type.
    #[error("No {record_type} records found for {hostname}")]
    NoRecords {
        /// Queried hostname.
        hostname: String,
        /// Queried record type.
        record_type: String,
    },

    /// The lookup itself failed.
    #[error("Lookup of {hostname} failed: {message}")]
    LookupFailed {
        /// Queried hostname.
        hostname: String,
        /// Description of the failure.
        message: String,
    },

    /// The resolver could not be configured.
    #[error("Resolver configuration error: {message}")]
    ResolverConfig {
        /// Description of the failure.
        message: String,
    },
}

/// Deployment lifecycle errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A required external binary is absent.
    #[error("Required tool missing: {tool}")]
    ToolMissing {
        /// Tool name.
        tool: String,
    },

    /// The cluster API could not be reached.
    #[error("Cluster is unreachable: {message}")]
    ClusterUnreachable {
        /// Description of the failure.
        message: String,
    },

    /// An infrastructure step failed.
    #[error("Infrastructure {step} failed: {source}")]
    InfraProvisionFailure {
        /// Step that failed (setup, init, plan, apply, kubeconfig).
        step: String,
        /// Underlying error.
        #[source]
        source: Box<KdeployError>,
    },

    /// Installing or upgrading the release failed.
    #[error("Installation of release '{release}' failed: {source}")]
    InstallFailure {
        /// Release name.
        release: String,
        /// Underlying error.
        #[source]
        source: Box<KdeployError>,
    },

    /// The ingress load balancer never received an address.
    #[error("No load balancer address for service {namespace}/{service} after {attempts} attempts")]
    LoadBalancerUnavailable {
        /// Service namespace.
        namespace: String,
        /// Service name.
        service: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The orchestrator attempted an illegal phase transition.
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition {
        /// Current phase.
        from: String,
        /// Requested phase.
        to: String,
    },
}

/// Result type alias for kdeploy operations.
pub type Result<T> = std::result::Result<T, KdeployError>;

impl KdeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Tool(ToolError::Timeout { .. })
                | Self::Dns(DnsError::LookupFailed { .. })
                | Self::Deploy(DeployError::ClusterUnreachable { .. })
        )
    }

    /// Returns true if the error means a DNS name has no records of the queried type.
    #[must_use]
    pub const fn is_no_records(&self) -> bool {
        matches!(self, Self::Dns(DnsError::NoRecords { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl DeployError {
    /// Wraps an error raised while running an infrastructure step.
    #[must_use]
    pub fn infra(step: impl Into<String>, source: KdeployError) -> Self {
        Self::InfraProvisionFailure {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Wraps an error raised while installing or upgrading a release.
    #[must_use]
    pub fn install(release: impl Into<String>, source: KdeployError) -> Self {
        Self::InstallFailure {
            release: release.into(),
            source: Box::new(source),
        }
    }
}

/// Renders an optional exit code for display.
fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| String::from("none"), |c| c.to_string())
}

/// Builds a short human-readable summary from captured process output.
fn summarize(stderr: &str, stdout: &str) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return String::from("no output");
    }

    let start = lines.len().saturating_sub(STDERR_SUMMARY_LINES);
    lines[start..].join(" | ")
}
