// # Tunnel Provider Trait
//
// Defines the interface for reading and replacing a tunnel's ingress list.
//
// ## Implementations
//
// - Cloudflare Tunnel configuration API: `tunnelsync-cloudflare` crate

use crate::model::IngressRule;
use async_trait::async_trait;

/// Trait for tunnel configuration implementations
///
/// Both methods are single-shot: one API call, no retry, no caching. Retries
/// and backoff are owned by the engine's `RetryPolicy`, which needs failures
/// classified as [`Error::Transient`](crate::Error::Transient) or
/// [`Error::Rejected`](crate::Error::Rejected).
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Fetch the tunnel's current ordered ingress list
    async fn get_ingress(&self) -> Result<Vec<IngressRule>, crate::Error>;

    /// Replace the whole ingress list
    ///
    /// Must be idempotent: pushing the same list twice leaves the tunnel in
    /// the same state.
    async fn put_ingress(&self, rules: &[IngressRule]) -> Result<(), crate::Error>;

    /// Provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
