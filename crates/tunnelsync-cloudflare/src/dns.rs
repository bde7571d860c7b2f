//! DNS records through `/zones/:zone_id/dns_records`

use crate::{CloudflareClient, PROVIDER};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tunnelsync_core::model::{CurrentDnsRecord, DesiredRecord, RecordType, Zone};
use tunnelsync_core::{DnsProvider, Result};

/// Zones fetched per page
const ZONES_PER_PAGE: u32 = 50;

/// Records fetched for a single name; a name never holds anywhere near this many
const RECORDS_PER_PAGE: u32 = 100;

/// TTL `1` means "automatic" to Cloudflare
const AUTOMATIC_TTL: u32 = 1;

#[derive(Debug, Deserialize)]
struct ZoneResponse {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RecordResponse {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    ttl: Option<u32>,
}

impl RecordResponse {
    /// `None` for record types the engine does not manage
    fn into_current(self) -> Option<CurrentDnsRecord> {
        let record_type = RecordType::parse(&self.record_type)?;
        Some(CurrentDnsRecord {
            id: self.id,
            name: self.name,
            record_type,
            content: self.content,
            proxied: self.proxied.unwrap_or(false),
            ttl: self.ttl,
        })
    }
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
    proxied: bool,
    ttl: u32,
}

impl<'a> RecordBody<'a> {
    fn from_desired(desired: &'a DesiredRecord) -> Self {
        Self {
            record_type: desired.record_type.as_str(),
            name: &desired.hostname,
            content: &desired.target,
            proxied: desired.proxied,
            ttl: AUTOMATIC_TTL,
        }
    }
}

/// Cloudflare DNS provider
///
/// Creates and updates `A`/`CNAME` records. It has no delete path.
#[derive(Debug, Clone)]
pub struct CloudflareDns {
    client: CloudflareClient,
}

impl CloudflareDns {
    pub fn new(client: CloudflareClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DnsProvider for CloudflareDns {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut page: u32 = 1;

        loop {
            let (batch, info): (Vec<ZoneResponse>, _) = self
                .client
                .get(
                    "/zones",
                    &[
                        ("page", page.to_string()),
                        ("per_page", ZONES_PER_PAGE.to_string()),
                    ],
                )
                .await?;

            let fetched = batch.len();
            zones.extend(batch.into_iter().map(|z| Zone { id: z.id, name: z.name }));

            match info {
                Some(info) if info.has_more() && fetched > 0 => page += 1,
                _ => break,
            }
        }

        debug!("Listed {} zone(s)", zones.len());
        Ok(zones)
    }

    async fn find_records(&self, zone: &Zone, hostname: &str) -> Result<Vec<CurrentDnsRecord>> {
        let (records, _): (Vec<RecordResponse>, _) = self
            .client
            .get(
                &format!("/zones/{}/dns_records", zone.id),
                &[
                    ("name", hostname.to_string()),
                    ("per_page", RECORDS_PER_PAGE.to_string()),
                ],
            )
            .await?;

        Ok(records
            .into_iter()
            .filter(|r| r.name.eq_ignore_ascii_case(hostname))
            .filter_map(RecordResponse::into_current)
            .collect())
    }

    async fn create_record(&self, zone: &Zone, desired: &DesiredRecord) -> Result<()> {
        let body = RecordBody::from_desired(desired);

        if self.client.is_dry_run() {
            info!(
                "[DRY-RUN] Would POST /zones/{}/dns_records with payload: {}",
                zone.id,
                serde_json::to_string(&body)?
            );
            return Ok(());
        }

        let _: serde_json::Value = self
            .client
            .send(Method::POST, &format!("/zones/{}/dns_records", zone.id), &body)
            .await?;
        debug!(provider = PROVIDER, hostname = %desired.hostname, "DNS record created");
        Ok(())
    }

    async fn update_record(
        &self,
        zone: &Zone,
        current: &CurrentDnsRecord,
        desired: &DesiredRecord,
    ) -> Result<()> {
        let body = RecordBody::from_desired(desired);
        let path = format!("/zones/{}/dns_records/{}", zone.id, current.id);

        if self.client.is_dry_run() {
            info!(
                "[DRY-RUN] Would PUT {} with payload: {}",
                path,
                serde_json::to_string(&body)?
            );
            return Ok(());
        }

        let _: serde_json::Value = self.client.send(Method::PUT, &path, &body).await?;
        debug!(provider = PROVIDER, hostname = %desired.hostname, "DNS record updated");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare-dns"
    }
}
