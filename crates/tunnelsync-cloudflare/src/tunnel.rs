//! Remotely-managed tunnel configuration
//!
//! The ingress list lives at
//! `/accounts/:account_id/cfd_tunnel/:tunnel_id/configurations` under
//! `config.ingress`. A PUT replaces the whole configuration, which is what
//! makes the write idempotent. Tunnel-wide settings next to `ingress`
//! (`originRequest`, `warp-routing`, ...) are re-read before every write and
//! sent back unchanged.

use crate::{CloudflareClient, PROVIDER};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use tunnelsync_core::model::IngressRule;
use tunnelsync_core::{Error, Result, TunnelProvider};

#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct TunnelConfigurationResponse {
    #[serde(default)]
    config: Option<TunnelConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TunnelConfig {
    #[serde(default)]
    ingress: Vec<IngressRule>,
    /// Everything besides `ingress`
    #[serde(flatten)]
    settings: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct TunnelConfigurationBody<'a> {
    config: TunnelConfigBody<'a>,
}

#[derive(Debug, Serialize)]
struct TunnelConfigBody<'a> {
    ingress: &'a [IngressRule],
    #[serde(flatten)]
    settings: &'a Map<String, Value>,
}

/// Cloudflare Tunnel ingress provider
///
/// The account owning the tunnel is either configured or resolved once from
/// the first account visible to the token. The account ID is fixed for the
/// life of the process; the ingress list itself is always re-read.
#[derive(Debug)]
pub struct CloudflareTunnel {
    client: CloudflareClient,
    tunnel_id: String,
    account_id: OnceCell<String>,
}

impl CloudflareTunnel {
    pub fn new(client: CloudflareClient, tunnel_id: impl Into<String>, account_id: Option<String>) -> Self {
        let account_id = match account_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => OnceCell::new_with(Some(id)),
            None => OnceCell::new(),
        };
        Self {
            client,
            tunnel_id: tunnel_id.into(),
            account_id,
        }
    }

    pub fn tunnel_id(&self) -> &str {
        &self.tunnel_id
    }

    async fn account_id(&self) -> Result<&str> {
        let id = self
            .account_id
            .get_or_try_init(|| async {
                info!("Account ID not configured, fetching from API");
                let (accounts, _): (Vec<AccountResponse>, _) = self.client.get("/accounts", &[]).await?;
                let account = accounts.into_iter().next().ok_or_else(|| {
                    Error::rejected(PROVIDER, None, "No Cloudflare accounts found for this API token")
                })?;
                info!("Using account {} ({})", account.name, account.id);
                Ok::<_, Error>(account.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn configurations_path(&self) -> Result<String> {
        Ok(format!(
            "/accounts/{}/cfd_tunnel/{}/configurations",
            self.account_id().await?,
            self.tunnel_id
        ))
    }

    /// Current configuration; an unconfigured tunnel reads as empty
    async fn fetch_config(&self, path: &str) -> Result<TunnelConfig> {
        let (response, _): (TunnelConfigurationResponse, _) = self.client.get(path, &[]).await?;
        Ok(response.config.unwrap_or_default())
    }
}

#[async_trait]
impl TunnelProvider for CloudflareTunnel {
    async fn get_ingress(&self) -> Result<Vec<IngressRule>> {
        let path = self.configurations_path().await?;
        let ingress = self.fetch_config(&path).await?.ingress;
        debug!(tunnel_id = %self.tunnel_id, "Fetched {} ingress rule(s)", ingress.len());
        Ok(ingress)
    }

    async fn put_ingress(&self, rules: &[IngressRule]) -> Result<()> {
        let path = self.configurations_path().await?;
        let current = self.fetch_config(&path).await?;
        let body = TunnelConfigurationBody {
            config: TunnelConfigBody {
                ingress: rules,
                settings: &current.settings,
            },
        };

        if self.client.is_dry_run() {
            info!(
                "[DRY-RUN] Would PUT {} with payload: {}",
                path,
                serde_json::to_string(&body)?
            );
            return Ok(());
        }

        let _: Value = self.client.send(Method::PUT, &path, &body).await?;
        info!(tunnel_id = %self.tunnel_id, "Tunnel configuration updated ({} rules)", rules.len());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare-tunnel"
    }
}
