//! Tunnel ingress reconciler
//!
//! The tunnel's ingress list is an ordered sequence of `{hostname, service}`
//! rules closed by a catch-all. The reconciler rebuilds it from the desired
//! `Tunnel` hostnames:
//!
//! - rules for hostnames still desired keep their position; their service is
//!   forced to the internal service endpoint
//! - rules for hostnames no longer desired are dropped
//! - newly desired hostnames are appended in lexicographic order
//! - hostless rules that match on `path` only are left where they are
//! - the existing catch-all is kept verbatim, or `http_status:404` is added
//!
//! The new list is pushed with a single whole-list replace, and only when it
//! differs from what the tunnel already has.

use crate::error::Result;
use crate::model::{DEFAULT_CATCH_ALL_SERVICE, DesiredState, IngressRule, normalize_hostname};
use crate::retry::RetryPolicy;
use crate::traits::TunnelProvider;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// How generated ingress rules look
#[derive(Debug, Clone)]
pub struct IngressSettings {
    /// Origin every tunneled hostname is forwarded to
    pub service: String,
    /// `noTLSVerify` in the generated origin request block
    pub no_tls_verify: bool,
}

impl IngressSettings {
    /// The rule the tunnel should hold for `hostname`
    pub fn rule_for(&self, hostname: &str) -> IngressRule {
        IngressRule {
            hostname: Some(hostname.to_string()),
            service: self.service.clone(),
            path: None,
            origin_request: Some(json!({
                "noTLSVerify": self.no_tls_verify,
                "httpHostHeader": hostname,
                "originServerName": hostname,
            })),
        }
    }

    /// Whether an existing rule already routes `hostname` the way we would
    ///
    /// Extra origin request fields set by hand are tolerated and kept.
    fn is_satisfied_by(&self, rule: &IngressRule, hostname: &str) -> bool {
        if rule.hostname.as_deref() != Some(hostname)
            || rule.service != self.service
            || rule.path.as_deref().is_some_and(|p| !p.is_empty())
        {
            return false;
        }
        let Some(origin) = rule.origin_request.as_ref() else {
            return false;
        };
        origin["noTLSVerify"] == json!(self.no_tls_verify)
            && origin["httpHostHeader"] == json!(hostname)
            && origin["originServerName"] == json!(hostname)
    }
}

/// Result of diffing the current ingress list against desired state
#[derive(Debug, Clone, PartialEq)]
pub struct IngressPlan {
    /// The complete list the tunnel should hold
    pub rules: Vec<IngressRule>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Hostnames kept in place whose rule had to be rewritten
    pub rewritten: Vec<String>,
    /// Whether `rules` differs from the current list
    pub changed: bool,
}

/// What the tunnel reconciler did this cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TunnelOutcome {
    pub pushed: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub rewritten: Vec<String>,
    pub rule_count: usize,
}

impl TunnelOutcome {
    pub fn mutations(&self) -> usize {
        usize::from(self.pushed)
    }
}

/// Compute the ingress list for the desired tunnel hostnames
pub fn plan_ingress(
    current: &[IngressRule],
    desired_hosts: &BTreeSet<&str>,
    settings: &IngressSettings,
) -> IngressPlan {
    let catch_all = current.iter().rev().find(|rule| rule.is_catch_all()).cloned();

    let mut rules = Vec::with_capacity(desired_hosts.len() + 1);
    let mut seen: HashSet<String> = HashSet::new();
    let mut removed = Vec::new();
    let mut rewritten = Vec::new();

    for rule in current.iter().filter(|rule| !rule.is_catch_all()) {
        // Hostless path rules are hand-written routing; keep them in place
        if rule.hostname.as_deref().is_none_or(str::is_empty) {
            rules.push(rule.clone());
            continue;
        }
        let Some(host) = rule.hostname.as_deref().and_then(normalize_hostname) else {
            continue;
        };

        if !desired_hosts.contains(host.as_str()) {
            debug!(hostname = %host, "Dropping ingress rule for hostname no longer routed through the tunnel");
            removed.push(host);
            continue;
        }
        if !seen.insert(host.clone()) {
            debug!(hostname = %host, "Dropping duplicate ingress rule");
            continue;
        }

        if settings.is_satisfied_by(rule, &host) {
            rules.push(rule.clone());
        } else {
            rewritten.push(host.clone());
            rules.push(settings.rule_for(&host));
        }
    }

    let mut added = Vec::new();
    for host in desired_hosts.iter().filter(|host| !seen.contains(**host)) {
        added.push(host.to_string());
        rules.push(settings.rule_for(host));
    }

    rules.push(catch_all.unwrap_or_else(|| IngressRule::catch_all(DEFAULT_CATCH_ALL_SERVICE)));

    removed.sort();
    removed.dedup();
    let changed = rules.as_slice() != current;

    IngressPlan {
        rules,
        added,
        removed,
        rewritten,
        changed,
    }
}

/// Fetch, diff and (when needed) replace the tunnel's ingress list
pub async fn reconcile_tunnel(
    provider: &dyn TunnelProvider,
    retry: &RetryPolicy,
    desired: &DesiredState,
    settings: &IngressSettings,
) -> Result<TunnelOutcome> {
    let current = retry
        .call("tunnel.get_ingress", || provider.get_ingress())
        .await?;

    let plan = plan_ingress(&current, &desired.tunnel_hostnames(), settings);

    if plan.changed {
        info!(
            provider = provider.provider_name(),
            added = ?plan.added,
            removed = ?plan.removed,
            rewritten = ?plan.rewritten,
            "Replacing tunnel ingress ({} rules)",
            plan.rules.len()
        );
        retry
            .call("tunnel.put_ingress", || provider.put_ingress(&plan.rules))
            .await?;
    } else {
        debug!("Tunnel ingress already up-to-date ({} rules)", plan.rules.len());
    }

    Ok(TunnelOutcome {
        pushed: plan.changed,
        rule_count: plan.rules.len(),
        added: plan.added,
        removed: plan.removed,
        rewritten: plan.rewritten,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> IngressSettings {
        IngressSettings {
            service: "http://192.168.1.10:8080".to_string(),
            no_tls_verify: true,
        }
    }

    fn hosts<'a>(names: &[&'a str]) -> BTreeSet<&'a str> {
        names.iter().copied().collect()
    }

    #[test]
    fn test_empty_tunnel_gets_rules_and_catch_all() {
        let plan = plan_ingress(&[], &hosts(&["pub.example.com"]), &settings());
        assert!(plan.changed);
        assert_eq!(plan.rules.len(), 2);
        assert_eq!(plan.rules[0].hostname.as_deref(), Some("pub.example.com"));
        assert_eq!(plan.rules[0].service, "http://192.168.1.10:8080");
        assert_eq!(plan.rules[1], IngressRule::catch_all("http_status:404"));
        assert_eq!(plan.added, vec!["pub.example.com"]);
    }

    #[test]
    fn test_replanning_own_output_is_a_no_op() {
        let desired = hosts(&["a.example.com", "b.example.com"]);
        let first = plan_ingress(&[], &desired, &settings());
        let second = plan_ingress(&first.rules, &desired, &settings());
        assert!(!second.changed);
        assert_eq!(second.rules, first.rules);
        assert!(second.added.is_empty() && second.removed.is_empty() && second.rewritten.is_empty());
    }

    #[test]
    fn test_catch_all_preserved_verbatim() {
        let custom = IngressRule {
            hostname: None,
            service: "http_status:418".to_string(),
            path: None,
            origin_request: Some(json!({ "connectTimeout": "5s" })),
        };
        let current = vec![settings().rule_for("a.example.com"), custom.clone()];
        let plan = plan_ingress(&current, &hosts(&["a.example.com", "b.example.com"]), &settings());
        assert_eq!(plan.rules.last(), Some(&custom));
        assert_eq!(plan.rules.len(), 3);
    }

    #[test]
    fn test_stale_hostnames_dropped() {
        let current = vec![
            settings().rule_for("old.example.com"),
            settings().rule_for("keep.example.com"),
            IngressRule::catch_all("http_status:404"),
        ];
        let plan = plan_ingress(&current, &hosts(&["keep.example.com"]), &settings());
        assert!(plan.changed);
        assert_eq!(plan.removed, vec!["old.example.com"]);
        assert_eq!(plan.rules.len(), 2);
        assert_eq!(plan.rules[0].hostname.as_deref(), Some("keep.example.com"));
    }

    #[test]
    fn test_existing_order_kept_and_new_hosts_appended() {
        let current = vec![
            settings().rule_for("z.example.com"),
            settings().rule_for("m.example.com"),
            IngressRule::catch_all("http_status:404"),
        ];
        let plan = plan_ingress(
            &current,
            &hosts(&["a.example.com", "m.example.com", "z.example.com"]),
            &settings(),
        );
        let order: Vec<_> = plan.rules.iter().map(|r| r.hostname.clone()).collect();
        assert_eq!(
            order,
            vec![
                Some("z.example.com".to_string()),
                Some("m.example.com".to_string()),
                Some("a.example.com".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_wrong_service_is_overridden() {
        let current = vec![
            IngressRule::for_hostname("a.example.com", "http://old-origin:80"),
            IngressRule::catch_all("http_status:404"),
        ];
        let plan = plan_ingress(&current, &hosts(&["a.example.com"]), &settings());
        assert!(plan.changed);
        assert_eq!(plan.rewritten, vec!["a.example.com"]);
        assert_eq!(plan.rules[0].service, "http://192.168.1.10:8080");
    }

    #[test]
    fn test_hand_tuned_origin_request_kept() {
        let mut rule = settings().rule_for("a.example.com");
        rule.origin_request = Some(json!({
            "noTLSVerify": true,
            "httpHostHeader": "a.example.com",
            "originServerName": "a.example.com",
            "connectTimeout": "30s",
        }));
        let current = vec![rule, IngressRule::catch_all("http_status:404")];
        let plan = plan_ingress(&current, &hosts(&["a.example.com"]), &settings());
        assert!(!plan.changed);
    }

    #[test]
    fn test_hostless_path_rule_kept_in_place() {
        let status = IngressRule {
            hostname: None,
            service: "http://192.168.1.20:9000".to_string(),
            path: Some("^/status".to_string()),
            origin_request: None,
        };
        let current = vec![
            status.clone(),
            settings().rule_for("a.example.com"),
            IngressRule::catch_all("http_status:404"),
        ];

        let plan = plan_ingress(&current, &hosts(&["a.example.com", "b.example.com"]), &settings());
        assert_eq!(plan.rules.len(), 4);
        assert_eq!(plan.rules[0], status);
        assert_eq!(plan.rules[2].hostname.as_deref(), Some("b.example.com"));
        assert!(plan.rules[3].is_catch_all());
        assert!(plan.removed.is_empty());

        let replanned = plan_ingress(&plan.rules, &hosts(&["a.example.com", "b.example.com"]), &settings());
        assert!(!replanned.changed);
    }

    #[test]
    fn test_no_tunnel_hosts_leaves_only_catch_all() {
        let current = vec![settings().rule_for("a.example.com")];
        let plan = plan_ingress(&current, &hosts(&[]), &settings());
        assert_eq!(plan.rules, vec![IngressRule::catch_all("http_status:404")]);
        assert_eq!(plan.removed, vec!["a.example.com"]);
    }
}
