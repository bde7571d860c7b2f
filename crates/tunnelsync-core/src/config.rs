//! Configuration types for the tunnel sync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Lowest accepted poll interval (seconds)
pub const MIN_POLL_INTERVAL_SECS: u64 = 1;

/// Highest accepted poll interval (seconds)
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Tunnel identifier; public CNAMEs point at `<tunnel_id>.cfargotunnel.com`
    pub tunnel_id: String,

    /// Internal service endpoint (e.g. `http://192.168.1.10:8080`)
    ///
    /// Tunnel ingress rules forward to this URL, and its host portion becomes
    /// the A-record target for local hostnames.
    pub service_endpoint: String,

    /// Entrypoints to consider; empty means every entrypoint
    #[serde(default)]
    pub monitored_entrypoints: BTreeSet<String>,

    /// Entrypoints whose hostnames bypass the tunnel
    #[serde(default = "default_local_entrypoints")]
    pub local_entrypoints: BTreeSet<String>,

    /// Skip routers that terminate TLS themselves
    #[serde(default = "default_true")]
    pub skip_tls_routes: bool,

    /// `noTLSVerify` on generated ingress rules
    #[serde(default = "default_true")]
    pub origin_no_tls_verify: bool,

    /// Poll loop settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Retry/backoff settings for external calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Create a configuration with defaults for everything but the two required fields
    pub fn new(tunnel_id: impl Into<String>, service_endpoint: impl Into<String>) -> Self {
        Self {
            tunnel_id: tunnel_id.into(),
            service_endpoint: service_endpoint.into(),
            monitored_entrypoints: BTreeSet::new(),
            local_entrypoints: default_local_entrypoints(),
            skip_tls_routes: true,
            origin_no_tls_verify: true,
            engine: EngineConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Validate the configuration
    ///
    /// The service endpoint's host is checked again every cycle by the
    /// desired-state builder; this only catches values that can never work.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.tunnel_id.trim().is_empty() {
            return Err(crate::Error::config("Tunnel ID cannot be empty"));
        }
        if self.service_endpoint.trim().is_empty() {
            return Err(crate::Error::config("Service endpoint cannot be empty"));
        }

        self.engine.validate()?;
        self.retry.validate()?;

        Ok(())
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound of the random delay added to every sleep
    #[serde(default = "default_poll_jitter_secs")]
    pub poll_jitter_secs: u64,

    /// Cap on the sleep after consecutive aborted cycles
    #[serde(default = "default_failure_backoff_max_secs")]
    pub failure_backoff_max_secs: u64,

    /// Hostnames reconciled against the DNS API at the same time
    #[serde(default = "default_dns_concurrency")]
    pub dns_concurrency: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_secs) {
            return Err(crate::Error::config(format!(
                "Poll interval must be between {} and {} seconds, got {}",
                MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS, self.poll_interval_secs
            )));
        }
        if self.dns_concurrency == 0 {
            return Err(crate::Error::config("DNS concurrency must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn failure_backoff_max(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_max_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            poll_jitter_secs: default_poll_jitter_secs(),
            failure_backoff_max_secs: default_failure_backoff_max_secs(),
            dns_concurrency: default_dns_concurrency(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Retry/backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for the doubled delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Randomization applied to each delay (0.1 = ±10%)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("Retry max attempts must be >= 1"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(crate::Error::config(format!(
                "Retry max delay ({}ms) is below base delay ({}ms)",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(crate::Error::config(format!(
                "Retry jitter factor must be between 0.0 and 1.0, got {}",
                self.jitter_factor
            )));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// `local` and `office`
pub fn default_local_entrypoints() -> BTreeSet<String> {
    ["local", "office"].iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_poll_jitter_secs() -> u64 {
    5
}

fn default_failure_backoff_max_secs() -> u64 {
    20
}

fn default_dns_concurrency() -> usize {
    4
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_jitter_factor() -> f64 {
    0.1
}
