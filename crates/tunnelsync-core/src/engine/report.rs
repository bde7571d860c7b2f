//! Per-cycle report

use crate::error::Error;
use crate::reconcile::{DnsOutcome, TunnelOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// What an item-level error was attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A router whose rule could not be parsed
    Router,
    /// The tunnel ingress list
    Tunnel,
    /// One DNS hostname, or the zone listing
    Dns,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Router => write!(f, "router"),
            ItemKind::Tunnel => write!(f, "tunnel"),
            ItemKind::Dns => write!(f, "dns"),
        }
    }
}

/// An error that failed one item without aborting the cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub kind: ItemKind,
    /// Router name, hostname, or tunnel ID
    pub item: String,
    pub message: String,
}

/// Summary of one completed poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub routers_seen: usize,
    pub routers_skipped: usize,
    pub hosts_desired: usize,
    pub tunnel: TunnelOutcome,
    pub dns: Vec<DnsOutcome>,
    pub errors: Vec<ItemError>,
    /// No hostnames were desired, so neither reconciler ran
    pub skipped_empty: bool,
}

impl CycleReport {
    pub(crate) fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            routers_seen: 0,
            routers_skipped: 0,
            hosts_desired: 0,
            tunnel: TunnelOutcome::default(),
            dns: Vec::new(),
            errors: Vec::new(),
            skipped_empty: false,
        }
    }

    pub(crate) fn record_error(&mut self, kind: ItemKind, item: impl Into<String>, error: &Error) {
        self.errors.push(ItemError {
            kind,
            item: item.into(),
            message: error.to_string(),
        });
    }

    /// Mutating calls issued this cycle (ingress replace + DNS create/update)
    pub fn mutations(&self) -> usize {
        self.tunnel.mutations() + self.dns.iter().filter(|o| o.is_mutation()).count()
    }

    /// No item failed
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordType;
    use crate::reconcile::DnsChange;

    fn outcome(hostname: &str, change: DnsChange) -> DnsOutcome {
        DnsOutcome {
            hostname: hostname.to_string(),
            record_type: RecordType::Cname,
            target: "abc123.cfargotunnel.com".to_string(),
            proxied: true,
            change,
        }
    }

    #[test]
    fn test_mutation_count() {
        let mut report = CycleReport::begin(Utc::now());
        assert_eq!(report.mutations(), 0);

        report.tunnel.pushed = true;
        report.dns = vec![
            outcome("a.example.com", DnsChange::Created),
            outcome("b.example.com", DnsChange::Unchanged),
            outcome(
                "c.example.com",
                DnsChange::Updated {
                    previous_type: RecordType::A,
                    previous_content: "10.0.0.1".to_string(),
                    previous_proxied: false,
                },
            ),
        ];
        assert_eq!(report.mutations(), 3);
    }

    #[test]
    fn test_errors_make_report_unclean() {
        let mut report = CycleReport::begin(Utc::now());
        assert!(report.is_clean());

        report.record_error(ItemKind::Dns, "a.example.com", &Error::zone_not_found("a.example.com"));
        assert!(!report.is_clean());
        assert_eq!(report.errors[0].kind, ItemKind::Dns);
        assert!(report.errors[0].message.contains("a.example.com"));
    }

    #[test]
    fn test_report_serializes() {
        let mut report = CycleReport::begin(Utc::now());
        report.dns.push(outcome("a.example.com", DnsChange::Created));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dns"][0]["change"], "created");
        assert_eq!(json["dns"][0]["record_type"], "CNAME");
        assert_eq!(json["skipped_empty"], false);
    }
}
