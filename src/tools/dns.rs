//! DNS lookups through hickory, aimed at a chosen resolver.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, RecordType};
use tracing::trace;

use crate::error::{DnsError, KdeployError, Result};

use super::{DnsResolver, RecordKind, ResolverServer};

/// Per-query timeout.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Standard DNS port.
const DNS_PORT: u16 = 53;

/// Resolver adapter backed by hickory.
///
/// A fresh resolver is built per query so repeated polls never see cached
/// answers.
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    /// Per-query timeout.
    timeout: Duration,
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl HickoryResolver {
    /// Creates a resolver adapter with the given per-query timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn options(&self) -> ResolverOpts {
        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts
    }

    fn build(&self, servers: &[ResolverServer]) -> Result<TokioAsyncResolver> {
        let ips = custom_ips(servers);
        if ips.is_empty() {
            let (config, _) = hickory_resolver::system_conf::read_system_conf().map_err(|e| {
                KdeployError::Dns(DnsError::ResolverConfig {
                    message: format!("cannot read system resolver configuration: {e}"),
                })
            })?;
            return Ok(TokioAsyncResolver::tokio(config, self.options()));
        }

        let group = NameServerConfigGroup::from_ips_clear(&ips, DNS_PORT, true);
        Ok(TokioAsyncResolver::tokio(
            ResolverConfig::from_parts(None, Vec::new(), group),
            self.options(),
        ))
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn resolve(
        &self,
        hostname: &str,
        kind: RecordKind,
        servers: &[ResolverServer],
    ) -> Result<Vec<String>> {
        let resolver = self.build(servers)?;
        let record_type = record_type(kind);

        let lookup = resolver
            .lookup(hostname, record_type)
            .await
            .map_err(|e| lookup_error(hostname, kind, &e))?;

        let values = record_values(lookup.iter(), kind);
        trace!("{kind} {hostname} via {servers:?}: {values:?}");

        if values.is_empty() {
            return Err(no_records(hostname, kind));
        }
        Ok(values)
    }
}

/// Returns the explicit resolver addresses; `System` entries contribute none.
fn custom_ips(servers: &[ResolverServer]) -> Vec<IpAddr> {
    servers
        .iter()
        .filter_map(|s| match s {
            ResolverServer::System => None,
            ResolverServer::Custom(ip) => Some(*ip),
        })
        .collect()
}

const fn record_type(kind: RecordKind) -> RecordType {
    match kind {
        RecordKind::A => RecordType::A,
        RecordKind::Aaaa => RecordType::AAAA,
        RecordKind::Cname => RecordType::CNAME,
    }
}

/// Keeps only the answers of the requested type.
///
/// An `A` query for an aliased name also returns the `CNAME` chain.
fn record_values<'r>(records: impl Iterator<Item = &'r RData>, kind: RecordKind) -> Vec<String> {
    records
        .filter_map(|rdata| match (kind, rdata) {
            (RecordKind::A, RData::A(a)) => Some(a.to_string()),
            (RecordKind::Aaaa, RData::AAAA(a)) => Some(a.to_string()),
            (RecordKind::Cname, RData::CNAME(c)) => Some(c.to_string()),
            _ => None,
        })
        .collect()
}

fn lookup_error(hostname: &str, kind: RecordKind, err: &ResolveError) -> KdeployError {
    if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) {
        no_records(hostname, kind)
    } else {
        KdeployError::Dns(DnsError::LookupFailed {
            hostname: hostname.to_string(),
            message: err.to_string(),
        })
    }
}

fn no_records(hostname: &str, kind: RecordKind) -> KdeployError {
    KdeployError::Dns(DnsError::NoRecords {
        hostname: hostname.to_string(),
        record_type: kind.to_string(),
    })
}
