//! Configuration hashing for change detection.
//!
//! The hash of the config used by the last successful deploy is recorded in
//! state, so `status` can tell the operator the config has drifted since.

use sha2::{Digest, Sha256};

use super::spec::DeploymentConfig;

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the deployment configuration.
    ///
    /// Optional fields are prefixed with a presence byte so that `None` and
    /// an empty string hash differently.
    #[must_use]
    pub fn hash_config(&self, config: &DeploymentConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.name.as_bytes());
        hasher.update(config.domain.as_bytes());

        let infra = &config.infrastructure;
        hasher.update(infra.mode.to_string().as_bytes());
        hasher.update(infra.provider.to_string().as_bytes());
        hasher.update(infra.region.as_bytes());
        hasher.update(infra.cluster_name.as_bytes());
        update_optional(&mut hasher, infra.project.as_deref());
        update_optional(&mut hasher, infra.resource_group.as_deref());

        hasher.update(config.dns.provider.as_bytes());
        hasher.update([u8::from(config.dns.auto_manage)]);
        hasher.update([u8::from(config.database.self_hosted)]);
        hasher.update(config.database.subdomain.as_bytes());

        let app = &config.application;
        hasher.update(app.chart.as_bytes());
        update_optional(&mut hasher, app.chart_version.as_deref());
        update_optional(&mut hasher, app.release_name.as_deref());
        update_optional(&mut hasher, app.namespace.as_deref());
        update_optional(&mut hasher, app.hps_version.as_deref());

        hasher.update(config.ingress.namespace.as_bytes());
        hasher.update(config.ingress.service.as_bytes());

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

/// Feeds an optional string into the hasher.
fn update_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update(v.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}
