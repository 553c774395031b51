//! State management module for kdeploy.
//!
//! This module provides persistent storage of per-deployment lifecycle
//! records: status, the installed application and run history.
//!
//! One CLI process per deployment name is assumed; records are not locked.

mod local;
mod store;
mod types;

pub use local::LocalStateStore;
pub use store::StateStore;
pub use types::{
    ApplicationInfo, DeploymentState, DeploymentStatus, HistoryEntry, Operation, STATE_VERSION,
};
