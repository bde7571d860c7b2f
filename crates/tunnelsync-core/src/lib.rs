// # tunnelsync-core
//
// Core library keeping a tunnel's ingress list and DNS records in sync with
// the routers a reverse proxy exposes.
//
// ## Architecture Overview
//
// - **RouterSource**: Trait for discovering the proxy's HTTP routers
// - **TunnelProvider**: Trait for reading/replacing the tunnel ingress list
// - **DnsProvider**: Trait for reading and writing DNS records
// - **HostExtractor**: Replaceable strategy pulling hostnames out of rules
// - **SyncEngine**: Poll loop running discover → extract → classify →
//   reconcile tunnel → reconcile DNS
//
// ## Design Principles
//
// 1. **External state is the truth**: nothing is cached between cycles
// 2. **Additive DNS**: records are created or corrected, never deleted
// 3. **Retry in one place**: collaborators classify failures, `RetryPolicy` retries them
// 4. **Per-item isolation**: one failing hostname never aborts the pass

pub mod classify;
pub mod config;
pub mod desired;
pub mod engine;
pub mod error;
pub mod extract;
pub mod model;
pub mod reconcile;
pub mod retry;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, RetryConfig, SyncConfig};
pub use engine::{CycleReport, EngineEvent, ItemError, ItemKind, SyncEngine};
pub use error::{Error, Result};
pub use extract::{HostExtractor, HostRuleExtractor};
pub use model::{
    CurrentDnsRecord, DeliveryClass, DesiredRecord, DesiredState, ExtractedHost, IngressRule,
    RecordType, RouterRecord, Zone,
};
pub use retry::RetryPolicy;
pub use traits::{DnsProvider, RouterSource, TunnelProvider};
