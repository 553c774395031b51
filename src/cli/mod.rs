//! CLI module for the kdeploy tool.
//!
//! This module provides the command-line interface: argument parsing,
//! terminal prompts and text/JSON output.

mod commands;
mod output;
mod prompt;
mod status;

pub use commands::{Cli, Commands, FailurePolicy, OutputFormat};
pub use output::OutputFormatter;
pub use prompt::TerminalOperator;
pub use status::{DeploymentSummary, StatusReport};
