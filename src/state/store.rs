//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.
//! Records are keyed by deployment name.

use async_trait::async_trait;

use super::types::DeploymentState;
use crate::error::Result;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state of a deployment.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self, name: &str) -> Result<Option<DeploymentState>>;

    /// Saves the state of a deployment.
    async fn save(&self, state: &DeploymentState) -> Result<()>;

    /// Deletes the state record of a deployment.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Checks if state exists for a deployment.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Lists the names of all deployments with a state record.
    async fn list(&self) -> Result<Vec<String>>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
