//! DNS propagation verification.
//!
//! Every check walks an ordered resolver chain and stops at the first
//! resolver whose answer matches the expected target. When none matches, a
//! last lookup against the system resolver records what the name currently
//! points at, so callers can tell "resolves somewhere else" from "does not
//! resolve".

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::tools::{DnsResolver, RecordKind, ResolverServer};

use super::records::{DnsRecord, cname_matches, normalize};

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How a propagation wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsWaitOutcome {
    /// Every required record matched its target.
    Verified,
    /// The wait was cancelled before all records matched.
    Skipped,
}

/// What one lookup pass observed for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observation {
    /// The answer matched the target.
    Matched(Vec<String>),
    /// An answer came back but pointed elsewhere.
    Mismatch(Vec<String>),
    /// Nothing came back.
    Missing,
}

/// Polls DNS until the required records point at the load balancer.
pub struct DnsVerifier<'a> {
    /// Resolver adapter.
    resolver: &'a dyn DnsResolver,
    /// Resolvers tried in order for each check.
    chain: Vec<ResolverServer>,
    /// Delay between polls.
    poll_interval: Duration,
}

impl<'a> DnsVerifier<'a> {
    /// Creates a verifier using the default resolver chain.
    #[must_use]
    pub fn new(resolver: &'a dyn DnsResolver) -> Self {
        Self {
            resolver,
            chain: ResolverServer::DEFAULT_CHAIN.to_vec(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replaces the resolver chain.
    #[must_use]
    pub fn with_chain(mut self, chain: Vec<ResolverServer>) -> Self {
        self.chain = chain;
        self
    }

    /// Sets the delay between polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Checks one record once, updating `verified` and `resolved`.
    ///
    /// Returns true if the record is verified.
    pub async fn check_record(&self, record: &mut DnsRecord) -> bool {
        for server in &self.chain {
            if let Observation::Matched(values) = self.observe(record, &[*server]).await {
                debug!("{} verified via {server}", record.hostname);
                record.verified = true;
                record.resolved = Some(values);
                return true;
            }
        }

        record.resolved = match self.observe(record, &[ResolverServer::System]).await {
            Observation::Matched(values) => {
                record.verified = true;
                Some(values)
            }
            Observation::Mismatch(values) => Some(values),
            Observation::Missing => None,
        };
        record.verified
    }

    /// Polls until every required record is verified or `cancel` fires.
    ///
    /// Verified records are not queried again. `on_poll` runs after every
    /// pass with the current records. There is no internal deadline.
    pub async fn wait_for_propagation<F>(
        &self,
        records: &mut [DnsRecord],
        cancel: &CancellationToken,
        mut on_poll: F,
    ) -> DnsWaitOutcome
    where
        F: FnMut(&[DnsRecord]),
    {
        info!(
            "Waiting for {} DNS record(s) to propagate",
            records.iter().filter(|r| r.required).count()
        );

        loop {
            if cancel.is_cancelled() {
                return DnsWaitOutcome::Skipped;
            }

            for record in records.iter_mut().filter(|r| r.required && !r.verified) {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return DnsWaitOutcome::Skipped,
                    _ = self.check_record(record) => {}
                }
            }

            on_poll(records);

            if records.iter().filter(|r| r.required).all(|r| r.verified) {
                info!("All DNS records verified");
                return DnsWaitOutcome::Verified;
            }

            tokio::select! {
                () = cancel.cancelled() => return DnsWaitOutcome::Skipped,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Runs one lookup pass for a record against the given servers.
    async fn observe(&self, record: &DnsRecord, servers: &[ResolverServer]) -> Observation {
        match record.record_type {
            RecordKind::Cname => self.observe_alias(record, servers).await,
            RecordKind::A | RecordKind::Aaaa => self.observe_address(record, servers).await,
        }
    }

    /// Hostname target: compare the CNAME, or the address sets when the
    /// name is not an alias.
    async fn observe_alias(&self, record: &DnsRecord, servers: &[ResolverServer]) -> Observation {
        match self
            .resolver
            .resolve(&record.hostname, RecordKind::Cname, servers)
            .await
        {
            Ok(values) => {
                if values.iter().any(|v| cname_matches(v, &record.target)) {
                    Observation::Matched(values)
                } else {
                    Observation::Mismatch(values)
                }
            }
            Err(e) if e.is_no_records() => self.compare_addresses(record, servers).await,
            Err(e) => {
                debug!("CNAME lookup of {} failed: {e}", record.hostname);
                Observation::Missing
            }
        }
    }

    /// Resolves hostname and target to addresses and tests for overlap.
    async fn compare_addresses(&self, record: &DnsRecord, servers: &[ResolverServer]) -> Observation {
        let Ok(hostname_ips) = self
            .resolver
            .resolve(&record.hostname, RecordKind::A, servers)
            .await
        else {
            return Observation::Missing;
        };

        let target_ips = self
            .resolver
            .resolve(&record.target, RecordKind::A, servers)
            .await
            .unwrap_or_default();

        if hostname_ips.iter().any(|ip| target_ips.contains(ip)) {
            Observation::Matched(hostname_ips)
        } else {
            Observation::Mismatch(hostname_ips)
        }
    }

    /// IP target: compare the address, or the CNAME literal when the name
    /// has no address record.
    async fn observe_address(&self, record: &DnsRecord, servers: &[ResolverServer]) -> Observation {
        match self
            .resolver
            .resolve(&record.hostname, record.record_type, servers)
            .await
        {
            Ok(values) => {
                if values.iter().any(|v| v.trim() == record.target) {
                    Observation::Matched(values)
                } else {
                    Observation::Mismatch(values)
                }
            }
            Err(e) if e.is_no_records() => match self
                .resolver
                .resolve(&record.hostname, RecordKind::Cname, servers)
                .await
            {
                Ok(values) if values.iter().any(|v| normalize(v) == record.target) => {
                    Observation::Matched(values)
                }
                Ok(values) => Observation::Mismatch(values),
                Err(_) => Observation::Missing,
            },
            Err(e) => {
                debug!("{} lookup of {} failed: {e}", record.record_type, record.hostname);
                Observation::Missing
            }
        }
    }
}
