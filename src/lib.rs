// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # kdeploy
//!
//! A deployment lifecycle manager for Kubernetes applications.
//!
//! ## Overview
//!
//! kdeploy takes a deployment config written by the setup wizard and drives it
//! to a running application:
//!
//! - Provision the cluster with Terraform, or target an existing one
//! - Install the application's Helm chart
//! - Wait for hand-managed DNS records, then upgrade the release to serve TLS
//! - Tear everything down again, based on what actually exists
//!
//! ## Architecture
//!
//! The deploy run is an explicit state machine whose every transition is
//! persisted, so an interrupted run can be resumed and a failed one cleaned up:
//!
//! 1. **Config**: `~/.kdeploy/deployments/<name>/config.yaml`
//! 2. **State**: `~/.kdeploy/deployments/<name>/state.json`
//! 3. **Orchestrator**: preflight, infrastructure, install, DNS, TLS
//! 4. **Reconciler**: live scope discovery and ordered teardown
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing, validation and file layout
//! - [`state`]: Deployment state persistence
//! - [`tools`]: Terraform, Helm, kubectl, DNS and HTTP adapters
//! - [`dns`]: DNS record derivation and propagation checks
//! - [`orchestrator`]: The deploy state machine
//! - [`reconciler`]: Destroy reconciliation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! name: prod
//! domain: app.example.com
//! infrastructure:
//!   mode: provision
//!   provider: aws
//!   region: eu-west-1
//!   cluster_name: prod-eks
//! dns:
//!   provider: manual
//! application:
//!   chart: oci://registry.example.com/charts/app
//!   chart_version: 1.4.2
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod dns;
pub mod error;
pub mod orchestrator;
pub mod reconciler;
pub mod state;
pub mod tools;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DeploymentConfig, DeploymentLayout};
pub use error::{KdeployError, Result};
pub use orchestrator::{DeployOptions, DeployReport, Orchestrator};
pub use reconciler::{DestroyReconciler, DestroyReport, DestroyRequest};
pub use state::{DeploymentState, LocalStateStore, StateStore};
pub use tools::Toolchain;
