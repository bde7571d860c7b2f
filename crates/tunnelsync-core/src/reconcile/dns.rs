//! DNS reconciler
//!
//! For every desired hostname: find the managed zone, look up the current
//! record and create, update in place, or leave it alone.
//!
//! Records whose hostname is absent from the desired state are never touched.
//! The reconciler is additive and corrective only; deleting records is out of
//! its remit because many zones also carry records managed by hand.
//!
//! Hostnames are independent of each other and are processed concurrently,
//! bounded by `dns_concurrency`. A failure on one hostname is recorded and
//! does not stop the others.

use crate::error::{Error, Result};
use crate::model::{CurrentDnsRecord, DesiredRecord, DesiredState, RecordType, Zone};
use crate::retry::RetryPolicy;
use crate::traits::DnsProvider;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What has to happen to one hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsAction {
    /// No managed record exists
    Create,
    /// A record exists but differs in type, target or proxied flag
    Update(CurrentDnsRecord),
    /// Already converged
    NoOp,
}

/// What was done to one hostname
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum DnsChange {
    Created,
    Updated {
        previous_type: RecordType,
        previous_content: String,
        previous_proxied: bool,
    },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsOutcome {
    pub hostname: String,
    pub record_type: RecordType,
    pub target: String,
    pub proxied: bool,
    #[serde(flatten)]
    pub change: DnsChange,
}

impl DnsOutcome {
    pub fn is_mutation(&self) -> bool {
        !matches!(self.change, DnsChange::Unchanged)
    }
}

/// Result of one DNS reconciliation pass
#[derive(Debug, Default)]
pub struct DnsPass {
    /// Hostnames that reached a final state, sorted by hostname
    pub outcomes: Vec<DnsOutcome>,
    /// Hostnames that failed, sorted by hostname
    pub failures: Vec<(String, Error)>,
}

/// Zone owning `hostname`: the longest zone name that is a dot-aligned suffix
pub fn zone_for<'a>(hostname: &str, zones: &'a [Zone]) -> Option<&'a Zone> {
    zones
        .iter()
        .filter(|zone| {
            let name = zone.name.trim_end_matches('.');
            !name.is_empty()
                && (hostname.eq_ignore_ascii_case(name)
                    || (hostname.len() > name.len()
                        && hostname.as_bytes()[hostname.len() - name.len() - 1] == b'.'
                        && hostname[hostname.len() - name.len()..].eq_ignore_ascii_case(name)))
        })
        .max_by_key(|zone| zone.name.trim_end_matches('.').len())
}

/// Decide the action for a hostname from its existing records
///
/// Prefers an existing record of the desired type; otherwise the first
/// managed record is converted in place.
pub fn plan_record(existing: &[CurrentDnsRecord], desired: &DesiredRecord) -> DnsAction {
    let current = existing
        .iter()
        .find(|record| record.record_type == desired.record_type)
        .or_else(|| existing.first());

    match current {
        None => DnsAction::Create,
        Some(record) if record.matches(desired) => DnsAction::NoOp,
        Some(record) => DnsAction::Update(record.clone()),
    }
}

/// Converge every desired hostname against the DNS provider
///
/// # Errors
///
/// Fails as a whole only when the zone list cannot be fetched; per-hostname
/// failures are collected in [`DnsPass::failures`].
pub async fn reconcile_dns(
    provider: &dyn DnsProvider,
    retry: &RetryPolicy,
    desired: &DesiredState,
    concurrency: usize,
) -> Result<DnsPass> {
    let zones = retry.call("dns.list_zones", || provider.list_zones()).await?;
    debug!("Fetched {} zone(s) from {}", zones.len(), provider.provider_name());

    // Futures are boxed up front so the pass stays `Send` for spawned engines
    let tasks: Vec<BoxFuture<'_, (String, Result<DnsOutcome>)>> = desired
        .records()
        .map(|record| {
            reconcile_record(provider, retry, &zones, record)
                .map(move |result| (record.hostname.clone(), result))
                .boxed()
        })
        .collect();

    let results: Vec<(String, Result<DnsOutcome>)> = stream::iter(tasks)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut pass = DnsPass::default();
    for (hostname, result) in results {
        match result {
            Ok(outcome) => pass.outcomes.push(outcome),
            Err(e) => {
                warn!(hostname = %hostname, error = %e, "Failed to reconcile DNS record");
                pass.failures.push((hostname, e));
            }
        }
    }
    pass.outcomes.sort_by(|a, b| a.hostname.cmp(&b.hostname));
    pass.failures.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(pass)
}

async fn reconcile_record(
    provider: &dyn DnsProvider,
    retry: &RetryPolicy,
    zones: &[Zone],
    desired: &DesiredRecord,
) -> Result<DnsOutcome> {
    let hostname = desired.hostname.as_str();
    let zone = zone_for(hostname, zones).ok_or_else(|| Error::zone_not_found(hostname))?;

    let existing = retry
        .call(&format!("dns.find_records {}", hostname), || {
            provider.find_records(zone, hostname)
        })
        .await?;

    let change = match plan_record(&existing, desired) {
        DnsAction::NoOp => {
            debug!(
                hostname,
                "{} record already up-to-date", desired.record_type
            );
            DnsChange::Unchanged
        }
        DnsAction::Create => {
            retry
                .call(&format!("dns.create_record {}", hostname), || {
                    provider.create_record(zone, desired)
                })
                .await?;
            info!(
                hostname,
                zone = %zone.name,
                "Created {} {} -> {} (proxied={})",
                desired.record_type, hostname, desired.target, desired.proxied
            );
            DnsChange::Created
        }
        DnsAction::Update(current) => {
            retry
                .call(&format!("dns.update_record {}", hostname), || {
                    provider.update_record(zone, &current, desired)
                })
                .await?;
            info!(
                hostname,
                zone = %zone.name,
                "Updated {} {} from {} {} (proxied={}) to {} (proxied={})",
                desired.record_type,
                hostname,
                current.record_type,
                current.content,
                current.proxied,
                desired.target,
                desired.proxied
            );
            DnsChange::Updated {
                previous_type: current.record_type,
                previous_content: current.content,
                previous_proxied: current.proxied,
            }
        }
    };

    Ok(DnsOutcome {
        hostname: desired.hostname.clone(),
        record_type: desired.record_type,
        target: desired.target.clone(),
        proxied: desired.proxied,
        change,
    })
}
