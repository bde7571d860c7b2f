//! Cycle-scoped data model
//!
//! Every value in this module is built at the start of a poll cycle, consumed
//! by the reconcilers and dropped when the cycle ends. Nothing here is cached
//! between cycles; the tunnel configuration API and the DNS API are the only
//! durable sources of current state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Service used for the trailing catch-all ingress rule when none exists
pub const DEFAULT_CATCH_ALL_SERVICE: &str = "http_status:404";

/// Suffix of the public CNAME target for tunneled hostnames
pub const TUNNEL_TARGET_SUFFIX: &str = "cfargotunnel.com";

/// A router as reported by the discovery adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterRecord {
    /// Router name (e.g. `api@docker`)
    pub name: String,
    /// Raw matcher rule (e.g. ``Host(`a.example.com`) && PathPrefix(`/api`)``)
    pub rule: String,
    /// Entrypoints the router listens on
    pub entrypoints: BTreeSet<String>,
    /// Whether the router terminates TLS
    pub tls: bool,
}

impl RouterRecord {
    /// Create a router record
    pub fn new<I, S>(name: impl Into<String>, rule: impl Into<String>, entrypoints: I, tls: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            rule: rule.into(),
            entrypoints: entrypoints.into_iter().map(Into::into).collect(),
            tls,
        }
    }
}

/// A hostname pulled out of a router rule
///
/// `hostname` is always lower-cased and carries no trailing dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedHost {
    pub hostname: String,
    pub entrypoints: BTreeSet<String>,
    pub tls: bool,
}

/// How traffic for a hostname reaches the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryClass {
    /// Public traffic through the tunnel (proxied CNAME)
    Tunnel,
    /// LAN/office traffic straight to the origin (unproxied A record)
    Local,
}

impl fmt::Display for DeliveryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryClass::Tunnel => write!(f, "tunnel"),
            DeliveryClass::Local => write!(f, "local"),
        }
    }
}

/// DNS record types managed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "CNAME")]
    Cname,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
        }
    }

    /// Parse a wire name, returning `None` for unmanaged types
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "A" => Some(RecordType::A),
            "CNAME" => Some(RecordType::Cname),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record a hostname should have once the cycle converges
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredRecord {
    pub hostname: String,
    pub class: DeliveryClass,
    pub record_type: RecordType,
    pub target: String,
    pub proxied: bool,
}

impl DesiredRecord {
    /// Proxied CNAME to `<tunnel_id>.cfargotunnel.com`
    pub fn tunnel(hostname: impl Into<String>, tunnel_id: &str) -> Self {
        Self {
            hostname: hostname.into(),
            class: DeliveryClass::Tunnel,
            record_type: RecordType::Cname,
            target: tunnel_target(tunnel_id),
            proxied: true,
        }
    }

    /// Unproxied A record to the local origin
    pub fn local(hostname: impl Into<String>, local_target: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            class: DeliveryClass::Local,
            record_type: RecordType::A,
            target: local_target.into(),
            proxied: false,
        }
    }
}

/// Public CNAME target for a tunnel
pub fn tunnel_target(tunnel_id: &str) -> String {
    format!("{}.{}", tunnel_id, TUNNEL_TARGET_SUFFIX)
}

/// Hostname → desired record, ordered by hostname
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    records: BTreeMap<String, DesiredRecord>,
}

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: DesiredRecord) {
        self.records.insert(record.hostname.clone(), record);
    }

    pub fn get(&self, hostname: &str) -> Option<&DesiredRecord> {
        self.records.get(hostname)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &DesiredRecord> {
        self.records.values()
    }

    /// Hostnames whose class is `Tunnel`, in lexicographic order
    pub fn tunnel_hostnames(&self) -> BTreeSet<&str> {
        self.records
            .values()
            .filter(|r| r.class == DeliveryClass::Tunnel)
            .map(|r| r.hostname.as_str())
            .collect()
    }
}

/// A managed DNS zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// Snapshot of an existing DNS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentDnsRecord {
    /// Provider-side identity, used for in-place updates
    pub id: String,
    pub name: String,
    pub record_type: RecordType,
    pub content: String,
    pub proxied: bool,
    pub ttl: Option<u32>,
}

impl CurrentDnsRecord {
    /// Whether type, target and proxied flag already match
    pub fn matches(&self, desired: &DesiredRecord) -> bool {
        self.record_type == desired.record_type
            && self.content.eq_ignore_ascii_case(&desired.target)
            && self.proxied == desired.proxied
    }
}

/// One entry of a tunnel's ordered ingress list
///
/// Serialized with the field names of the tunnel configuration API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_request: Option<serde_json::Value>,
}

impl IngressRule {
    /// Rule routing a hostname to a service
    pub fn for_hostname(hostname: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            service: service.into(),
            path: None,
            origin_request: None,
        }
    }

    /// Rule matching everything not matched earlier
    pub fn catch_all(service: impl Into<String>) -> Self {
        Self {
            hostname: None,
            service: service.into(),
            path: None,
            origin_request: None,
        }
    }

    /// No hostname and no path: matches every request
    pub fn is_catch_all(&self) -> bool {
        self.hostname.as_deref().is_none_or(str::is_empty) && self.path.as_deref().is_none_or(str::is_empty)
    }
}

/// Lower-case a hostname and strip surrounding whitespace and the trailing dot
///
/// Returns `None` when nothing is left.
pub fn normalize_hostname(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_lowercase())
    }
}
