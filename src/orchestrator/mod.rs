//! Deployment lifecycle orchestration.
//!
//! This module sequences a deploy as an explicit state machine:
//! - Preflight tool and cluster checks
//! - Optional infrastructure provisioning (setup, init, plan, apply)
//! - Release installation, with or without TLS
//! - DNS waiting and the TLS upgrade for hand-managed records
//! - Cleanup of partial infrastructure when a run fails

mod deploy;
mod operator;
mod phase;
mod preflight;

pub use deploy::{
    CleanupOutcome, DeployOptions, DeployOutcome, DeployReport, Orchestrator, public_url,
};
pub use operator::{CleanupDecision, CleanupPolicy, DeployOperator};
pub use phase::{DeployPhase, PhaseMachine};
pub use preflight::{ToolReport, ensure_cluster_access};
