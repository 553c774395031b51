//! Hooks through which a deploy run reports progress and asks questions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dns::DnsRecord;
use crate::error::KdeployError;

use super::phase::DeployPhase;

/// What to do with partially created infrastructure after a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Ask the operator.
    #[default]
    Prompt,
    /// Destroy without asking.
    Destroy,
    /// Keep without asking.
    Keep,
}

/// The operator's answer to the cleanup question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupDecision {
    /// Destroy the infrastructure.
    Destroy,
    /// Keep the infrastructure for inspection.
    Keep,
    /// No answer; leave everything as it is.
    Abandon,
}

/// Receives progress from a deploy run and answers its questions.
#[async_trait]
pub trait DeployOperator: Send + Sync {
    /// Called after every phase transition.
    fn phase_changed(&self, phase: DeployPhase);

    /// Called with the required records when DNS waiting starts and after
    /// every poll.
    fn dns_progress(&self, records: &[DnsRecord]);

    /// Asks whether to destroy infrastructure created by a failed run.
    async fn confirm_cleanup(&self, deployment: &str, error: &KdeployError) -> CleanupDecision;
}
