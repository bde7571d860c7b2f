// # Traefik Router Source
//
// This crate provides the router discovery adapter for the sync engine,
// reading Traefik's runtime API.
//
// ## Architecture
//
// `GET /api/http/routers` returns the routers of every provider (docker,
// file, kubernetes...). The list is paginated; the `X-Next-Page` header
// points at the next page and is absent (or `1`) on the last one.
//
// Filtering done here is limited to what is Traefik-specific:
// - routers whose `status` is not `enabled` (broken config) are dropped
// - routers that only listen on Traefik's own `traefik` entrypoint
//   (dashboard/API) are dropped
//
// Entrypoint selection, TLS skipping and rule parsing belong to the engine.
//
// Every failure is reported as `DiscoveryUnavailable`: the engine aborts the
// cycle and leaves the tunnel and DNS as they are.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use tunnelsync_core::{Error, Result, RouterRecord, RouterSource};

/// Default HTTP timeout for discovery requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Routers requested per page
const ROUTERS_PER_PAGE: u32 = 100;

/// Safety net against a server that never stops paginating
const MAX_PAGES: u32 = 1000;

/// Traefik's internal entrypoint serving the dashboard and API
const INTERNAL_ENTRYPOINT: &str = "traefik";

/// Router object as returned by `/api/http/routers`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterResponse {
    name: String,
    #[serde(default)]
    rule: String,
    #[serde(default)]
    entry_points: Vec<String>,
    #[serde(default)]
    tls: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

impl RouterResponse {
    fn is_enabled(&self) -> bool {
        self.status.as_deref().is_none_or(|s| s == "enabled")
    }

    fn is_internal_only(&self) -> bool {
        !self.entry_points.is_empty() && self.entry_points.iter().all(|ep| ep == INTERNAL_ENTRYPOINT)
    }

    fn into_record(self) -> RouterRecord {
        let tls = self.tls.as_ref().is_some_and(terminates_tls);
        RouterRecord::new(self.name, self.rule, self.entry_points, tls)
    }
}

/// A router terminates TLS only with a `certResolver` plus `options` or `domains`
///
/// A bare `tls: {}` or a resolver on its own is common on routers that are
/// still meant to be reachable through the tunnel, so those do not count.
fn terminates_tls(tls: &serde_json::Value) -> bool {
    let present = |key: &str| match tls.get(key) {
        Some(serde_json::Value::String(s)) => !s.is_empty(),
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(serde_json::Value::Object(map)) => !map.is_empty(),
        Some(serde_json::Value::Bool(b)) => *b,
        _ => false,
    };
    present("certResolver") && (present("options") || present("domains"))
}

/// Router source backed by the Traefik API
#[derive(Debug, Clone)]
pub struct TraefikRouterSource {
    /// API root, e.g. `http://traefik:8080`
    endpoint: String,

    /// HTTP client
    client: reqwest::Client,
}

impl TraefikRouterSource {
    /// Create a router source for the given API endpoint
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the endpoint is empty or the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into().trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(Error::config("Traefik API endpoint cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch one page; returns the routers and the next page number, if any
    async fn fetch_page(&self, page: u32) -> Result<(Vec<RouterResponse>, Option<u32>)> {
        let url = format!("{}/api/http/routers", self.endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("page", page), ("per_page", ROUTERS_PER_PAGE)])
            .send()
            .await
            .map_err(|e| Error::discovery(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::discovery(format!("Traefik API returned HTTP {}", status)));
        }

        let next_page = response
            .headers()
            .get("X-Next-Page")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|next| *next > page);

        let routers = response
            .json::<Vec<RouterResponse>>()
            .await
            .map_err(|e| Error::discovery(format!("Failed to parse router list: {}", e)))?;

        Ok((routers, next_page))
    }
}

#[async_trait]
impl RouterSource for TraefikRouterSource {
    async fn routers(&self) -> Result<Vec<RouterRecord>> {
        let mut routers = Vec::new();
        let mut page = 1;

        loop {
            let (batch, next_page) = self.fetch_page(page).await?;
            routers.extend(batch);

            match next_page {
                Some(next) if next <= MAX_PAGES => page = next,
                _ => break,
            }
        }

        let total = routers.len();
        let records: Vec<RouterRecord> = routers
            .into_iter()
            .filter(|r| {
                if !r.is_enabled() {
                    debug!(router = %r.name, status = ?r.status, "Skipping router that is not enabled");
                    return false;
                }
                if r.is_internal_only() {
                    debug!(router = %r.name, "Skipping internal router");
                    return false;
                }
                true
            })
            .map(RouterResponse::into_record)
            .collect();

        debug!("Fetched {} router(s), {} usable", total, records.len());
        Ok(records)
    }

    fn source_name(&self) -> &'static str {
        "traefik"
    }
}
