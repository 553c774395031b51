//! Destroy reconciliation.
//!
//! Destroy never trusts the state record for what exists. It re-derives the
//! deployment's scope from live queries, then tears down in order: release,
//! volume claims, namespace, infrastructure, local files.

mod destroy;
mod scope;

pub use destroy::{
    Confirmation, DestroyOperator, DestroyOutcome, DestroyReconciler, DestroyReport,
    DestroyRequest, StepStatus, TeardownStep, TeardownStepKind, destroy_infrastructure,
};
pub use scope::{DeploymentIdentity, DeploymentScope};
