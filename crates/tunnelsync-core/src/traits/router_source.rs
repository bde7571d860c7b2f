// # Router Source Trait
//
// Defines the interface for discovering HTTP routers from a reverse proxy.
//
// ## Implementations
//
// - Traefik runtime API: `tunnelsync-traefik` crate

use crate::model::RouterRecord;
use async_trait::async_trait;

/// Trait for router discovery implementations
///
/// A router source is polled on demand, once per cycle. It must return the
/// complete current router list or fail; a partial list would make the
/// engine drop ingress rules for routers it simply did not see.
///
/// # Errors
///
/// Any failure to reach or decode the proxy API should be reported as
/// [`Error::DiscoveryUnavailable`](crate::Error::DiscoveryUnavailable). The
/// engine aborts the cycle and leaves the external systems untouched.
#[async_trait]
pub trait RouterSource: Send + Sync {
    /// Fetch the current router list
    async fn routers(&self) -> Result<Vec<RouterRecord>, crate::Error>;

    /// Source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
