//! DNS propagation checks for the two-phase TLS rollout.
//!
//! When records are managed by hand, the application is first installed
//! without TLS. This module derives which records the operator must create
//! and polls public resolvers until they point at the ingress load balancer.

mod records;
mod verifier;

pub use records::{DnsRecord, cname_matches, normalize, required_records};
pub use verifier::{DEFAULT_POLL_INTERVAL, DnsVerifier, DnsWaitOutcome};
