//! The DNS records a deployment needs before TLS can be enabled.

use serde::Serialize;

use crate::config::DeploymentConfig;
use crate::tools::{LoadBalancerAddress, RecordKind};

/// One record the operator must create.
///
/// `resolved` holds the answers last observed for `hostname`, matching or
/// not; `verified` is set only once an answer matched `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsRecord {
    /// Name that must resolve.
    pub hostname: String,
    /// Record type to create.
    pub record_type: RecordKind,
    /// Value the record must point at.
    pub target: String,
    /// Whether an answer matched the target.
    pub verified: bool,
    /// Whether the deployment cannot finish without this record.
    pub required: bool,
    /// Answers last observed, if any.
    pub resolved: Option<Vec<String>>,
}

impl DnsRecord {
    /// Creates an unverified required record pointing at a load balancer.
    #[must_use]
    pub fn new(hostname: impl Into<String>, target: &LoadBalancerAddress) -> Self {
        let record_type = match target {
            LoadBalancerAddress::Ip(_) => RecordKind::A,
            LoadBalancerAddress::Hostname(_) => RecordKind::Cname,
        };
        Self {
            hostname: normalize(&hostname.into()),
            record_type,
            target: target.to_string(),
            verified: false,
            required: true,
            resolved: None,
        }
    }

    /// Returns true if any answer was observed for the hostname.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved.as_ref().is_some_and(|r| !r.is_empty())
    }
}

/// Derives the records a deployment needs for a load balancer address.
///
/// Always the base domain; plus the database subdomain when the database is
/// self-hosted.
#[must_use]
pub fn required_records(config: &DeploymentConfig, target: &LoadBalancerAddress) -> Vec<DnsRecord> {
    std::iter::once(config.domain.clone())
        .chain(config.database_hostname())
        .map(|hostname| DnsRecord::new(hostname, target))
        .collect()
}

/// Lowercases a DNS name and strips the trailing root dot.
#[must_use]
pub fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Returns true if a CNAME answer points at the expected target.
///
/// Providers sometimes answer with a regional alias of the load balancer
/// name (or the reverse), so a suffix match in either direction counts.
#[must_use]
pub fn cname_matches(answer: &str, target: &str) -> bool {
    let answer = normalize(answer);
    let target = normalize(target);
    if answer.is_empty() || target.is_empty() {
        return false;
    }
    answer == target || answer.ends_with(&target) || target.ends_with(&answer)
}
