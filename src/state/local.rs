//! Local file-based state storage backend.
//!
//! Each deployment's record lives in `<home>/deployments/<name>/state.json`,
//! next to the rest of that deployment's files. Writes go through a temporary
//! file and a rename so a killed process never leaves a truncated record.

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{DeploymentLayout, STATE_FILE};
use crate::error::{KdeployError, Result, StateError};

use super::store::StateStore;
use super::types::DeploymentState;

/// Local file-based state store.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    /// Layout used to locate state files.
    layout: DeploymentLayout,
}

impl LocalStateStore {
    /// Creates a new local state store over the given layout.
    #[must_use]
    pub const fn new(layout: DeploymentLayout) -> Self {
        Self { layout }
    }

    /// Ensures the deployment directory exists.
    async fn ensure_dir(&self, name: &str) -> Result<()> {
        let dir = self.layout.deployment_dir(name);
        if !dir.exists() {
            debug!("Creating deployment directory: {}", dir.display());
            fs::create_dir_all(&dir).await.map_err(|e| {
                KdeployError::State(StateError::write(format!(
                    "Failed to create deployment directory: {e}"
                )))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self, name: &str) -> Result<Option<DeploymentState>> {
        let path = self.layout.state_path(name);
        if !path.exists() {
            debug!("State file does not exist: {}", path.display());
            return Ok(None);
        }

        debug!("Loading state from: {}", path.display());

        let content = fs::read_to_string(&path).await.map_err(|e| {
            KdeployError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;

        let state: DeploymentState = serde_json::from_str(&content).map_err(|e| {
            KdeployError::State(StateError::Corrupted {
                message: format!("Failed to parse state file {}: {e}", path.display()),
            })
        })?;

        Ok(Some(state))
    }

    async fn save(&self, state: &DeploymentState) -> Result<()> {
        self.ensure_dir(&state.name).await?;

        let path = self.layout.state_path(&state.name);
        debug!("Saving state to: {}", path.display());

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            KdeployError::State(StateError::serialization(format!(
                "Failed to serialize state: {e}"
            )))
        })?;

        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            KdeployError::State(StateError::write(format!(
                "Failed to create temp state file: {e}"
            )))
        })?;

        file.write_all(content.as_bytes()).await.map_err(|e| {
            KdeployError::State(StateError::write(format!("Failed to write state file: {e}")))
        })?;

        file.sync_all().await.map_err(|e| {
            KdeployError::State(StateError::write(format!("Failed to sync state file: {e}")))
        })?;

        fs::rename(&temp_path, &path).await.map_err(|e| {
            KdeployError::State(StateError::write(format!("Failed to rename state file: {e}")))
        })?;

        debug!("State saved ({})", state.status);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.layout.state_path(name);
        if path.exists() {
            info!("Deleting state file: {}", path.display());
            fs::remove_file(&path).await.map_err(|e| {
                KdeployError::State(StateError::write(format!(
                    "Failed to delete state file: {e}"
                )))
            })?;
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.layout.state_path(name).exists())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let dir = self.layout.deployments_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().join(STATE_FILE).exists() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeploymentStatus;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::new(DeploymentLayout::new(temp_dir.path()));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut state = DeploymentState::new("prod");
        state.set_status(DeploymentStatus::WaitingDns);
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load("prod")
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.name, "prod");
        assert_eq!(loaded.status, DeploymentStatus::WaitingDns);
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        let result = store.load("missing").await.expect("Load should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_load_corrupted() {
        let (store, temp) = create_test_store();
        let dir = temp.path().join("deployments").join("broken");
        std::fs::create_dir_all(&dir).expect("create dir");
        std::fs::write(dir.join(STATE_FILE), "{ not json").expect("write file");

        let result = store.load("broken").await;
        assert!(matches!(
            result,
            Err(KdeployError::State(StateError::Corrupted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (store, _temp) = create_test_store();

        assert!(!store.exists("prod").await.expect("exists check failed"));

        store
            .save(&DeploymentState::new("prod"))
            .await
            .expect("Failed to save state");
        assert!(store.exists("prod").await.expect("exists check failed"));

        store.delete("prod").await.expect("Failed to delete state");
        assert!(!store.exists("prod").await.expect("exists check failed"));

        store.delete("prod").await.expect("Deleting twice should succeed");
    }

    #[tokio::test]
    async fn test_list_only_includes_deployments_with_state() {
        let (store, temp) = create_test_store();

        store.save(&DeploymentState::new("staging")).await.expect("save");
        store.save(&DeploymentState::new("prod")).await.expect("save");
        std::fs::create_dir_all(temp.path().join("deployments").join("draft"))
            .expect("create dir");

        let names = store.list().await.expect("list failed");
        assert_eq!(names, vec![String::from("prod"), String::from("staging")]);
    }
}
