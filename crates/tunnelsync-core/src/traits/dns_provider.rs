// # DNS Provider Trait
//
// Defines the interface for managing DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `tunnelsync-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use tunnelsync_core::DnsProvider;
//
// let zones = provider.list_zones().await?;
// let zone = zones.iter().find(|z| z.name == "example.com").unwrap();
//
// let existing = provider.find_records(zone, "app.example.com").await?;
// if existing.is_empty() {
//     provider.create_record(zone, &desired).await?;
// }
// ```

use crate::model::{CurrentDnsRecord, DesiredRecord, Zone};
use async_trait::async_trait;

/// Trait for DNS provider implementations
///
/// This trait defines the interface for reading and writing DNS records.
/// Implementations must handle the specifics of each provider's API.
///
/// # Thread Safety
///
/// Implementations must be thread-safe: the DNS reconciler drives several
/// hostnames at once.
///
/// # Trust Level: Untrusted
///
/// DNS providers are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Classify failures as transient or rejected
///
/// ## Forbidden Capabilities
/// - ❌ Implement retry logic or backoff (owned by `RetryPolicy`)
/// - ❌ Decide whether a record needs to change (owned by the DNS reconciler)
/// - ❌ Delete records (the engine never prunes)
/// - ❌ Cache records or zones between calls
///
/// **Correct approach**: Return an error. The engine retries transient
/// failures according to its configured policy.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List the zones this provider manages
    async fn list_zones(&self) -> Result<Vec<Zone>, crate::Error>;

    /// Find the `A`/`CNAME` records for an exact hostname within a zone
    ///
    /// Records of other types at the same name are not returned.
    ///
    /// # Returns
    ///
    /// - `Ok(vec![])`: No managed record exists for the name
    /// - `Ok(records)`: The matching records
    /// - `Err(Error)`: If the request failed
    async fn find_records(
        &self,
        zone: &Zone,
        hostname: &str,
    ) -> Result<Vec<CurrentDnsRecord>, crate::Error>;

    /// Create a record with the desired type, target and proxied flag
    async fn create_record(&self, zone: &Zone, desired: &DesiredRecord) -> Result<(), crate::Error>;

    /// Update an existing record in place, keeping its identity
    async fn update_record(
        &self,
        zone: &Zone,
        current: &CurrentDnsRecord,
        desired: &DesiredRecord,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
