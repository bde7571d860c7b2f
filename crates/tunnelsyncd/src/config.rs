//! Environment configuration for tunnelsyncd
//!
//! Everything is read through a lookup function so tests never touch the
//! process environment. Problems that have a sensible fallback are collected
//! as warnings and logged once tracing is up; everything else fails startup.

use anyhow::{Result, bail};
use std::collections::BTreeSet;
use tunnelsync_core::config::{MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS, default_local_entrypoints};
use tunnelsync_core::{EngineConfig, RetryConfig, SyncConfig};

/// Variables without which the daemon cannot start
const REQUIRED_VARS: [&str; 4] = [
    "CLOUDFLARE_API_TOKEN",
    "CLOUDFLARE_TUNNEL_ID",
    "TRAEFIK_API_ENDPOINT",
    "TRAEFIK_SERVICE_ENDPOINT",
];

/// Global-key credentials that are recognised but never used
const IGNORED_VARS: [&str; 2] = ["CLOUDFLARE_EMAIL", "CLOUDFLARE_API_KEY"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Daemon configuration
pub struct DaemonConfig {
    /// ⚠️ NEVER log this value
    pub api_token: String,
    pub account_id: Option<String>,
    pub traefik_endpoint: String,
    pub dry_run: bool,
    pub log_level: String,
    pub log_format: LogFormat,
    pub sync: SyncConfig,
    /// Fallbacks applied while parsing, logged after tracing starts
    pub warnings: Vec<String>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for DaemonConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonConfig")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("traefik_endpoint", &self.traefik_endpoint)
            .field("dry_run", &self.dry_run)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("sync", &self.sync)
            .finish()
    }
}

impl DaemonConfig {
    /// Load configuration from the process environment, seeded from `.env` if present
    pub fn from_env() -> Result<Self> {
        // A missing .env file is the normal case
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            bail!("Missing required environment variables: {}", missing.join(", "));
        }

        let mut warnings = Vec::new();

        for key in IGNORED_VARS {
            if get(key).is_some() {
                warnings.push(format!(
                    "{} is set but ignored; only CLOUDFLARE_API_TOKEN is used",
                    key
                ));
            }
        }

        let monitored_entrypoints = get("TRAEFIK_ENTRYPOINTS")
            .or_else(|| get("TRAEFIK_ENTRYPOINT"))
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        let local_entrypoints = get("LOCAL_ENTRYPOINTS")
            .map(|v| parse_list(&v))
            .unwrap_or_else(default_local_entrypoints);

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            poll_interval_secs: parse_poll_interval(get("POLL_INTERVAL"), defaults.poll_interval_secs, &mut warnings),
            poll_jitter_secs: parse_or("POLL_JITTER", get("POLL_JITTER"), defaults.poll_jitter_secs, &mut warnings),
            dns_concurrency: parse_or("DNS_CONCURRENCY", get("DNS_CONCURRENCY"), defaults.dns_concurrency, &mut warnings),
            ..defaults
        };

        let retry_defaults = RetryConfig::default();
        let retry = RetryConfig {
            base_delay_ms: parse_or("RETRY_BASE_DELAY_MS", get("RETRY_BASE_DELAY_MS"), retry_defaults.base_delay_ms, &mut warnings),
            max_delay_ms: parse_or("RETRY_MAX_DELAY_MS", get("RETRY_MAX_DELAY_MS"), retry_defaults.max_delay_ms, &mut warnings),
            max_attempts: parse_or("RETRY_MAX_ATTEMPTS", get("RETRY_MAX_ATTEMPTS"), retry_defaults.max_attempts, &mut warnings),
            ..retry_defaults
        };

        let dry_run = match get("SYNC_MODE").map(|v| v.to_lowercase()).as_deref() {
            None | Some("live") => false,
            Some("dry-run") | Some("dryrun") | Some("dry_run") => true,
            Some(other) => bail!("SYNC_MODE '{}' is not valid. Valid modes: live, dry-run", other),
        };

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()).to_lowercase();
        match log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => bail!(
                "LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                log_level
            ),
        }

        let log_format = match get("LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("LOG_FORMAT '{}' is not valid. Valid formats: text, json", other),
        };

        let traefik_endpoint = get("TRAEFIK_API_ENDPOINT").unwrap_or_default();
        if !traefik_endpoint.starts_with("http://") && !traefik_endpoint.starts_with("https://") {
            bail!(
                "TRAEFIK_API_ENDPOINT must use HTTP or HTTPS scheme. Got: {}",
                traefik_endpoint
            );
        }

        let sync = SyncConfig {
            monitored_entrypoints,
            local_entrypoints,
            skip_tls_routes: parse_bool("SKIP_TLS_ROUTES", get("SKIP_TLS_ROUTES"), true, &mut warnings),
            origin_no_tls_verify: parse_bool("ORIGIN_NO_TLS_VERIFY", get("ORIGIN_NO_TLS_VERIFY"), true, &mut warnings),
            engine,
            retry,
            ..SyncConfig::new(
                get("CLOUDFLARE_TUNNEL_ID").unwrap_or_default(),
                get("TRAEFIK_SERVICE_ENDPOINT").unwrap_or_default(),
            )
        };
        sync.validate()?;

        Ok(Self {
            api_token: get("CLOUDFLARE_API_TOKEN").unwrap_or_default(),
            account_id: get("CLOUDFLARE_ACCOUNT_ID"),
            traefik_endpoint,
            dry_run,
            log_level,
            log_format,
            sync,
            warnings,
        })
    }
}

/// Comma-separated list, blanks dropped
fn parse_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: std::str::FromStr + std::fmt::Display>(
    key: &str,
    value: Option<String>,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warnings.push(format!("{} '{}' is not a valid number, using {}", key, raw, default));
            default
        }),
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool, warnings: &mut Vec<String>) -> bool {
    match value.map(|v| v.to_lowercase()).as_deref() {
        None => default,
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        Some(other) => {
            warnings.push(format!(
                "{} '{}' is not a valid boolean (true/false), using {}",
                key, other, default
            ));
            default
        }
    }
}

/// Unparseable falls back to the default; out of range is clamped
fn parse_poll_interval(value: Option<String>, default: u64, warnings: &mut Vec<String>) -> u64 {
    let Some(raw) = value else {
        return default;
    };
    let Ok(secs) = raw.parse::<i64>() else {
        warnings.push(format!("POLL_INTERVAL '{}' is not a valid number, using {}", raw, default));
        return default;
    };

    let min = MIN_POLL_INTERVAL_SECS as i64;
    let max = MAX_POLL_INTERVAL_SECS as i64;
    if !(min..=max).contains(&secs) {
        let clamped = secs.clamp(min, max);
        warnings.push(format!(
            "POLL_INTERVAL {} is out of range ({}..={}), using {}",
            secs, min, max, clamped
        ));
        return clamped as u64;
    }
    secs as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CLOUDFLARE_API_TOKEN", "secret_token_12345"),
            ("CLOUDFLARE_TUNNEL_ID", "abc123"),
            ("TRAEFIK_API_ENDPOINT", "http://traefik:8080"),
            ("TRAEFIK_SERVICE_ENDPOINT", "http://192.168.1.10:8080"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<DaemonConfig> {
        DaemonConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&required()).unwrap();

        assert_eq!(config.sync.tunnel_id, "abc123");
        assert_eq!(config.sync.engine.poll_interval_secs, 10);
        assert_eq!(config.sync.engine.poll_jitter_secs, 5);
        assert!(config.sync.monitored_entrypoints.is_empty());
        assert_eq!(config.sync.local_entrypoints, default_local_entrypoints());
        assert!(config.sync.skip_tls_routes);
        assert!(config.account_id.is_none());
        assert!(!config.dry_run);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn test_all_missing_vars_reported_together() {
        let mut vars = required();
        vars.remove("CLOUDFLARE_API_TOKEN");
        vars.insert("TRAEFIK_SERVICE_ENDPOINT", "   ");

        let message = load(&vars).unwrap_err().to_string();
        assert!(message.contains("CLOUDFLARE_API_TOKEN"));
        assert!(message.contains("TRAEFIK_SERVICE_ENDPOINT"));
        assert!(!message.contains("CLOUDFLARE_TUNNEL_ID"));
    }

    #[test]
    fn test_entrypoint_lists() {
        let mut vars = required();
        vars.insert("TRAEFIK_ENTRYPOINT", "web");
        assert!(load(&vars).unwrap().sync.monitored_entrypoints.contains("web"));

        vars.insert("TRAEFIK_ENTRYPOINTS", "websecure, local ,,office");
        vars.insert("LOCAL_ENTRYPOINTS", "lan");
        let config = load(&vars).unwrap();
        assert_eq!(config.sync.monitored_entrypoints.len(), 3);
        assert!(!config.sync.monitored_entrypoints.contains("web"));
        assert_eq!(config.sync.local_entrypoints.iter().collect::<Vec<_>>(), vec!["lan"]);
    }

    #[test]
    fn test_poll_interval_clamped_or_defaulted() {
        let mut vars = required();
        vars.insert("POLL_INTERVAL", "0");
        let config = load(&vars).unwrap();
        assert_eq!(config.sync.engine.poll_interval_secs, 1);
        assert_eq!(config.warnings.len(), 1);

        vars.insert("POLL_INTERVAL", "99999");
        assert_eq!(load(&vars).unwrap().sync.engine.poll_interval_secs, 3600);

        vars.insert("POLL_INTERVAL", "soon");
        assert_eq!(load(&vars).unwrap().sync.engine.poll_interval_secs, 10);
    }

    #[test]
    fn test_invalid_bool_warns_and_keeps_default() {
        let mut vars = required();
        vars.insert("SKIP_TLS_ROUTES", "maybe");
        let config = load(&vars).unwrap();
        assert!(config.sync.skip_tls_routes);
        assert!(config.warnings[0].contains("SKIP_TLS_ROUTES"));

        vars.insert("SKIP_TLS_ROUTES", "False");
        assert!(!load(&vars).unwrap().sync.skip_tls_routes);
    }

    #[test]
    fn test_modes_and_formats() {
        let mut vars = required();
        vars.insert("SYNC_MODE", "dry-run");
        vars.insert("LOG_FORMAT", "JSON");
        vars.insert("LOG_LEVEL", "Debug");
        let config = load(&vars).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "debug");

        vars.insert("SYNC_MODE", "yolo");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_invalid_retry_settings_rejected() {
        let mut vars = required();
        vars.insert("RETRY_BASE_DELAY_MS", "5000");
        vars.insert("RETRY_MAX_DELAY_MS", "100");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_traefik_endpoint_scheme_required() {
        let mut vars = required();
        vars.insert("TRAEFIK_API_ENDPOINT", "traefik:8080");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_legacy_credentials_ignored_with_warning() {
        let mut vars = required();
        vars.insert("CLOUDFLARE_API_KEY", "global-key");
        let config = load(&vars).unwrap();
        assert!(config.warnings.iter().any(|w| w.contains("CLOUDFLARE_API_KEY")));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let config = load(&required()).unwrap();
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
