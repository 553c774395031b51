//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::orchestrator::CleanupPolicy;

/// kdeploy - Kubernetes deployment lifecycle manager.
#[derive(Parser, Debug)]
#[command(name = "kdeploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding deployments (defaults to ~/.kdeploy).
    #[arg(long, global = true, env = "KDEPLOY_HOME")]
    pub home: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Terraform binary.
    #[arg(long, global = true, env = "KDEPLOY_TERRAFORM", default_value = "terraform")]
    pub terraform_bin: String,

    /// Helm binary.
    #[arg(long, global = true, env = "KDEPLOY_HELM", default_value = "helm")]
    pub helm_bin: String,

    /// kubectl binary.
    #[arg(long, global = true, env = "KDEPLOY_KUBECTL", default_value = "kubectl")]
    pub kubectl_bin: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy (or resume deploying) a configured deployment.
    Deploy {
        /// Deployment name.
        name: String,

        /// Do not provision infrastructure; use the cluster in the current context.
        #[arg(long)]
        skip_infra: bool,

        /// Do not wait for DNS; finish without TLS.
        #[arg(long)]
        skip_dns: bool,

        /// What to do with partially created infrastructure when the run fails.
        #[arg(long, value_enum, default_value = "prompt")]
        on_failure: FailurePolicy,
    },

    /// Destroy a deployment's cluster resources.
    Destroy {
        /// Deployment name.
        name: String,

        /// Also destroy the cloud infrastructure.
        #[arg(long)]
        infra: bool,

        /// Also delete the deployment directory and its state.
        #[arg(long)]
        delete_local: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        force: bool,
    },

    /// Show a deployment's recorded status.
    Status {
        /// Deployment name.
        name: String,

        /// Probe the application URL.
        #[arg(long)]
        health: bool,
    },

    /// List known deployments.
    List,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Cleanup policy as accepted on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FailurePolicy {
    /// Ask before destroying.
    #[default]
    Prompt,
    /// Destroy without asking.
    Destroy,
    /// Keep without asking.
    Keep,
}

impl From<FailurePolicy> for CleanupPolicy {
    fn from(policy: FailurePolicy) -> Self {
        match policy {
            FailurePolicy::Prompt => Self::Prompt,
            FailurePolicy::Destroy => Self::Destroy,
            FailurePolicy::Keep => Self::Keep,
        }
    }
}
