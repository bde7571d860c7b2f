//! Domain extraction
//!
//! Turns router rules into hostnames. Only `Host(...)` clauses matter; every
//! other matcher (`PathPrefix`, `Headers`, `HostSNI`, ...) is ignored, as are
//! the boolean combinators around them.
//!
//! The matcher syntax is handled by a [`HostExtractor`] strategy so that a
//! different proxy's rule language can be plugged in without touching the
//! engine. [`HostRuleExtractor`] understands Traefik rules.

use crate::error::{Error, Result};
use crate::model::{ExtractedHost, RouterRecord, normalize_hostname};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

/// `Host(` preceded by a word boundary, capturing everything up to `)`
static HOST_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bHost\s*\(([^()]*)\)").expect("host clause pattern is valid")
});

/// Strategy for pulling hostnames out of a router rule
pub trait HostExtractor: Send + Sync {
    /// Return every hostname named by the router's rule
    ///
    /// An empty vector means the rule has no host clause. Malformed rules
    /// return [`Error::RuleParse`].
    fn extract(&self, router: &RouterRecord) -> Result<Vec<String>>;

    /// Strategy name (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// Tolerant extractor for Traefik-style rules
///
/// Accepts backtick, double-quote and single-quote delimited arguments, and
/// several hostnames per clause: ``Host(`a.com`, `b.com`)``.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRuleExtractor;

impl HostRuleExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl HostExtractor for HostRuleExtractor {
    fn extract(&self, router: &RouterRecord) -> Result<Vec<String>> {
        check_balanced(&router.rule).map_err(|msg| Error::rule_parse(&router.name, msg))?;

        let mut hosts = Vec::new();
        for clause in HOST_CLAUSE.captures_iter(&router.rule) {
            for arg in clause[1].split(',') {
                if let Some(host) = normalize_hostname(strip_quotes(arg.trim())) {
                    if !hosts.contains(&host) {
                        hosts.push(host);
                    }
                }
            }
        }
        Ok(hosts)
    }

    fn name(&self) -> &'static str {
        "traefik-host-rule"
    }
}

/// Remove one layer of matching quotes
fn strip_quotes(arg: &str) -> &str {
    for quote in ['`', '"', '\''] {
        if let Some(inner) = arg.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    arg
}

/// Reject rules whose parentheses or quotes do not pair up
fn check_balanced(rule: &str) -> std::result::Result<(), String> {
    let mut depth: usize = 0;
    let mut open_quote: Option<char> = None;

    for (pos, ch) in rule.char_indices() {
        if let Some(quote) = open_quote {
            if ch == quote {
                open_quote = None;
            }
            continue;
        }
        match ch {
            '`' | '"' | '\'' => open_quote = Some(ch),
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unexpected ')' at offset {}", pos))?;
            }
            _ => {}
        }
    }

    if let Some(quote) = open_quote {
        return Err(format!("unterminated {} quote", quote));
    }
    if depth != 0 {
        return Err(format!("{} unclosed '('", depth));
    }
    Ok(())
}

/// Why a router produced no hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// None of the router's entrypoints is monitored
    UnmonitoredEntrypoints,
    /// TLS router while TLS routes are skipped
    TlsRoute,
    /// The rule has no host clause
    NoHostClause,
}

/// Outcome of running one router through the extraction stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterHosts {
    Skipped(SkipReason),
    Hosts(Vec<ExtractedHost>),
}

/// Router-level filters applied before extraction
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Empty means every entrypoint is monitored
    pub monitored_entrypoints: BTreeSet<String>,
    pub skip_tls_routes: bool,
}

/// Filter a router and extract its hosts
///
/// Each hostname inherits the router's entrypoints and TLS flag.
pub fn extract_router_hosts(
    router: &RouterRecord,
    extractor: &dyn HostExtractor,
    options: &ExtractionOptions,
) -> Result<RouterHosts> {
    if !options.monitored_entrypoints.is_empty()
        && router.entrypoints.is_disjoint(&options.monitored_entrypoints)
    {
        debug!(router = %router.name, entrypoints = ?router.entrypoints, "Router has no monitored entrypoint, skipping");
        return Ok(RouterHosts::Skipped(SkipReason::UnmonitoredEntrypoints));
    }

    if options.skip_tls_routes && router.tls {
        debug!(router = %router.name, "Skipping TLS-enabled router");
        return Ok(RouterHosts::Skipped(SkipReason::TlsRoute));
    }

    let hostnames = extractor.extract(router)?;
    if hostnames.is_empty() {
        debug!(router = %router.name, rule = %router.rule, "No host clause in rule, skipping");
        return Ok(RouterHosts::Skipped(SkipReason::NoHostClause));
    }

    Ok(RouterHosts::Hosts(
        hostnames
            .into_iter()
            .map(|hostname| ExtractedHost {
                hostname,
                entrypoints: router.entrypoints.clone(),
                tls: router.tls,
            })
            .collect(),
    ))
}
