//! Desired-state builder
//!
//! Folds every extracted host of a cycle into one [`DesiredState`].
//!
//! When a hostname shows up more than once (several routers, or one router
//! listed on several entrypoints), any `Local` occurrence makes the merged
//! entry `Local`. Office/LAN access is an explicit operator choice and wins
//! over the tunnel.

use crate::classify::classify;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::{DeliveryClass, DesiredRecord, DesiredState, ExtractedHost};
use std::collections::{BTreeMap, BTreeSet};
use url::{Host, Url};

/// Host portion of the internal service endpoint
///
/// Accepts endpoints with or without scheme (`http://10.0.0.5:8080`,
/// `10.0.0.5:8080`). Fails with [`Error::Config`] when no host can be parsed.
pub fn local_target(service_endpoint: &str) -> Result<String> {
    let endpoint = service_endpoint.trim();
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };

    let url = Url::parse(&with_scheme).map_err(|e| {
        Error::config(format!(
            "Service endpoint '{}' is not a valid URL: {}",
            service_endpoint, e
        ))
    })?;

    match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        _ => Err(Error::config(format!(
            "Service endpoint '{}' has no host",
            service_endpoint
        ))),
    }
}

/// Builds the desired state of one cycle
#[derive(Debug, Clone)]
pub struct DesiredStateBuilder {
    tunnel_id: String,
    local_entrypoints: BTreeSet<String>,
    local_target: String,
}

impl DesiredStateBuilder {
    /// Prepare a builder for the current cycle
    ///
    /// Parses the service endpoint once; an endpoint without a host is a
    /// configuration error and the cycle must not reach reconciliation.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            tunnel_id: config.tunnel_id.clone(),
            local_entrypoints: config.local_entrypoints.clone(),
            local_target: local_target(&config.service_endpoint)?,
        })
    }

    /// Target of `A` records for local hostnames
    pub fn local_target(&self) -> &str {
        &self.local_target
    }

    pub fn build<I>(&self, hosts: I) -> DesiredState
    where
        I: IntoIterator<Item = ExtractedHost>,
    {
        let mut classes: BTreeMap<String, DeliveryClass> = BTreeMap::new();
        for host in hosts {
            let class = classify(&host.entrypoints, &self.local_entrypoints);
            classes
                .entry(host.hostname)
                .and_modify(|merged| {
                    if class == DeliveryClass::Local {
                        *merged = DeliveryClass::Local;
                    }
                })
                .or_insert(class);
        }

        let mut state = DesiredState::new();
        for (hostname, class) in classes {
            let record = match class {
                DeliveryClass::Tunnel => DesiredRecord::tunnel(hostname, &self.tunnel_id),
                DeliveryClass::Local => DesiredRecord::local(hostname, self.local_target.clone()),
            };
            state.insert(record);
        }
        state
    }
}
