//! Collaborator traits
//!
//! The engine talks to the outside world only through these interfaces.
//!
//! - [`RouterSource`]: Discover reverse-proxy routers
//! - [`TunnelProvider`]: Read and replace a tunnel's ingress list
//! - [`DnsProvider`]: Look up, create and update DNS records

pub mod dns_provider;
pub mod router_source;
pub mod tunnel_provider;

pub use dns_provider::DnsProvider;
pub use router_source::RouterSource;
pub use tunnel_provider::TunnelProvider;
