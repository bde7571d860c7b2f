// # Cloudflare collaborators
//
// This crate implements the two Cloudflare-side collaborators of the sync
// engine on top of Cloudflare API v4:
//
// - [`CloudflareTunnel`]: `TunnelProvider` for a cloudflared tunnel's
//   remotely-managed ingress configuration
// - [`CloudflareDns`]: `DnsProvider` for zone DNS records
//
// Both share one [`CloudflareClient`] (one connection pool, one token).
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (Providers)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS API calls to Cloudflare only
// - ✅ Parse Cloudflare responses
// - ✅ Classify failures as transient or rejected
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic (owned by the engine's `RetryPolicy`)
// - ❌ Cache zones, records or ingress between calls
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider construction fails if the token is empty
//
// ## API Reference
//
// - List Zones: GET `/zones`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - List Accounts: GET `/accounts`
// - Tunnel configuration: GET/PUT `/accounts/:account_id/cfd_tunnel/:tunnel_id/configurations`

mod dns;
mod tunnel;

pub use dns::CloudflareDns;
pub use tunnel::CloudflareTunnel;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tunnelsync_core::{Error, Result};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Name used in errors and logs
const PROVIDER: &str = "cloudflare";

/// Standard Cloudflare v4 response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Pagination block of list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct ResultInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

impl ResultInfo {
    pub(crate) fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

fn describe(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("[{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Authenticated Cloudflare API client shared by both providers
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, providers built on this client perform every
/// read but only log the writes they would have made.
#[derive(Clone)]
pub struct CloudflareClient {
    /// ⚠️ NEVER log this value
    api_token: String,
    base_url: String,
    http: reqwest::Client,
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareClient {
    /// Create a client against the public Cloudflare API
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the token is empty or the HTTP client cannot be built.
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        if dry_run {
            tracing::warn!("Cloudflare client running in DRY-RUN mode - no changes will be made");
        }

        Ok(Self {
            api_token,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            http,
            dry_run,
        })
    }

    /// Point the client at another API root (mock servers in tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(T, Option<ResultInfo>)> {
        self.execute(self.request(Method::GET, path).query(query)).await
    }

    pub(crate) async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let (result, _) = self.execute(self.request(method, path).json(body)).await?;
        Ok(result)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<(T, Option<ResultInfo>)> {
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let detail = serde_json::from_str::<Envelope<serde_json::Value>>(&error_text)
                .map(|envelope| describe(&envelope.errors))
                .unwrap_or(error_text);
            return Err(Error::from_status(PROVIDER, status.as_u16(), &detail));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::rejected(PROVIDER, Some(status.as_u16()), format!("Failed to parse response: {}", e))
        })?;

        if !envelope.success {
            return Err(Error::rejected(
                PROVIDER,
                Some(status.as_u16()),
                describe(&envelope.errors),
            ));
        }

        let result = envelope.result.ok_or_else(|| {
            Error::rejected(PROVIDER, Some(status.as_u16()), "Invalid response format: missing result")
        })?;
        Ok((result, envelope.result_info))
    }
}

/// Timeouts and connection failures are worth retrying; anything else is not
fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Error::transient(PROVIDER, format!("HTTP request failed: {}", e))
    } else {
        Error::rejected(PROVIDER, None, format!("HTTP request failed: {}", e))
    }
}
