//! Poll loop
//!
//! The SyncEngine runs one reconciliation cycle after another:
//!
//! ```text
//! ┌──────────────┐
//! │ RouterSource │─── RouterRecord ───┐
//! └──────────────┘                    │
//!                                     ▼
//!                      extract → classify → DesiredState
//!                                     │
//!                  ┌──────────────────┴──────────────────┐
//!                  ▼                                     ▼
//!         ┌────────────────┐                   ┌────────────────┐
//!         │ TunnelProvider │                   │  DnsProvider   │
//!         │ (whole list)   │                   │ (per hostname) │
//!         └────────────────┘                   └────────────────┘
//! ```
//!
//! Cycles never overlap. Between cycles the engine sleeps for the poll
//! interval plus a random jitter, or, after an aborted cycle, for an
//! exponentially growing backoff.
//!
//! Shutdown is checked around every await of the loop. Dropping a cycle
//! mid-way is safe: each mutating call is atomic on the provider's side and
//! whatever was not applied is recomputed on the next start.

mod report;

pub use report::{CycleReport, ItemError, ItemKind};

use crate::config::SyncConfig;
use crate::desired::DesiredStateBuilder;
use crate::error::{Error, Result};
use crate::extract::{ExtractionOptions, HostExtractor, HostRuleExtractor, RouterHosts, extract_router_hosts};
use crate::model::{DeliveryClass, DesiredState, RecordType};
use crate::reconcile::{DnsChange, IngressSettings, reconcile_dns, reconcile_tunnel};
use crate::retry::RetryPolicy;
use crate::traits::{DnsProvider, RouterSource, TunnelProvider};
use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine loop started
    Started { tunnel_id: String },

    /// A cycle began
    CycleStarted { cycle: u64 },

    /// A cycle ran to completion (possibly with item errors)
    CycleCompleted {
        cycle: u64,
        hosts_desired: usize,
        mutations: usize,
        errors: usize,
    },

    /// A cycle was abandoned before reconciliation
    CycleAborted { cycle: u64, error: String },

    /// The tunnel ingress list was replaced
    IngressReplaced { rules: usize },

    /// A DNS record was created or updated
    RecordChanged {
        hostname: String,
        record_type: RecordType,
        target: String,
        created: bool,
    },

    /// One item failed without aborting the cycle
    ItemFailed { item: String, error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`] or [`SyncEngine::run_forever()`]
/// 3. Engine runs until the shutdown signal fires
///
/// [`SyncEngine::run_cycle()`] runs a single cycle and is what the loop
/// calls; it can also be driven directly.
pub struct SyncEngine {
    source: Box<dyn RouterSource>,
    tunnel: Box<dyn TunnelProvider>,
    dns: Box<dyn DnsProvider>,
    extractor: Box<dyn HostExtractor>,
    config: SyncConfig,
    retry: RetryPolicy,
    ingress: IngressSettings,
    extraction: ExtractionOptions,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn RouterSource>,
        tunnel: Box<dyn TunnelProvider>,
        dns: Box<dyn DnsProvider>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            source,
            tunnel,
            dns,
            extractor: Box::new(HostRuleExtractor::new()),
            retry: RetryPolicy::from_config(&config.retry),
            ingress: IngressSettings {
                service: config.service_endpoint.trim().to_string(),
                no_tls_verify: config.origin_no_tls_verify,
            },
            extraction: ExtractionOptions {
                monitored_entrypoints: config.monitored_entrypoints.clone(),
                skip_tls_routes: config.skip_tls_routes,
            },
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Replace the rule matcher strategy
    pub fn with_extractor(mut self, extractor: Box<dyn HostExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Run until SIGINT/SIGTERM (Ctrl+C)
    pub async fn run(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx.send(());
                }
                Err(e) => {
                    // Keep `tx` alive so the engine is not stopped by a failed listener
                    error!(error = %e, "Unable to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            }
        });
        self.run_forever(rx).await
    }

    /// Run cycles until `shutdown` fires (or its sender is dropped)
    ///
    /// Cycle failures are logged and never end the loop.
    pub async fn run_forever(&self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        info!(
            tunnel_id = %self.config.tunnel_id,
            source = self.source.source_name(),
            extractor = self.extractor.name(),
            "Starting sync engine (poll every {}s, jitter {}s)",
            self.config.engine.poll_interval_secs,
            self.config.engine.poll_jitter_secs
        );
        self.emit_event(EngineEvent::Started {
            tunnel_id: self.config.tunnel_id.clone(),
        });

        let mut cycle: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            cycle += 1;

            let outcome = tokio::select! {
                result = self.run_numbered_cycle(cycle) => result,
                _ = &mut shutdown => {
                    info!(cycle, "Shutdown signal received, abandoning cycle in progress");
                    break;
                }
            };

            let delay = match outcome {
                Ok(_) => {
                    consecutive_failures = 0;
                    self.regular_delay()
                }
                Err(_) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    let delay = self.failure_delay(consecutive_failures);
                    warn!(
                        consecutive_failures,
                        retry_in = ?delay,
                        "Cycle aborted, backing off"
                    );
                    delay
                }
            };

            debug!(next_cycle_in = ?delay, "Sleeping");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Sync engine stopped");
        Ok(())
    }

    /// Run one full cycle
    ///
    /// # Errors
    ///
    /// Only cycle-aborting errors are returned: the router source being
    /// unavailable, or a configuration that cannot produce a desired state.
    /// Everything else is recorded in [`CycleReport::errors`].
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_numbered_cycle(0).await
    }

    async fn run_numbered_cycle(&self, cycle: u64) -> Result<CycleReport> {
        self.emit_event(EngineEvent::CycleStarted { cycle });

        match self.cycle().await {
            Ok(report) => {
                if report.skipped_empty {
                    warn!(
                        routers = report.routers_seen,
                        "No hostnames discovered, leaving tunnel ingress and DNS untouched"
                    );
                } else if report.is_clean() {
                    info!(
                        hosts = report.hosts_desired,
                        mutations = report.mutations(),
                        duration_ms = report.duration().num_milliseconds(),
                        "Cycle completed"
                    );
                } else {
                    warn!(
                        hosts = report.hosts_desired,
                        mutations = report.mutations(),
                        errors = report.errors.len(),
                        "Cycle completed with errors"
                    );
                }
                self.emit_event(EngineEvent::CycleCompleted {
                    cycle,
                    hosts_desired: report.hosts_desired,
                    mutations: report.mutations(),
                    errors: report.errors.len(),
                });
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Cycle aborted");
                self.emit_event(EngineEvent::CycleAborted {
                    cycle,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::begin(Utc::now());

        let builder = DesiredStateBuilder::new(&self.config)?;

        let routers = self.source.routers().await.map_err(|e| match e {
            Error::DiscoveryUnavailable(_) => e,
            other => Error::discovery(other.to_string()),
        })?;
        report.routers_seen = routers.len();
        debug!("Discovered {} router(s) from {}", routers.len(), self.source.source_name());

        let mut hosts = Vec::new();
        for router in &routers {
            match extract_router_hosts(router, self.extractor.as_ref(), &self.extraction) {
                Ok(RouterHosts::Hosts(extracted)) => hosts.extend(extracted),
                Ok(RouterHosts::Skipped(_)) => report.routers_skipped += 1,
                Err(e) => {
                    warn!(router = %router.name, rule = %router.rule, error = %e, "Skipping router with malformed rule");
                    report.routers_skipped += 1;
                    self.record_failure(&mut report, ItemKind::Router, &router.name, &e);
                }
            }
        }

        let desired = builder.build(hosts);
        report.hosts_desired = desired.len();
        log_desired(&desired);

        if desired.is_empty() {
            report.skipped_empty = true;
            report.finished_at = Utc::now();
            return Ok(report);
        }

        match reconcile_tunnel(self.tunnel.as_ref(), &self.retry, &desired, &self.ingress).await {
            Ok(outcome) => {
                if outcome.pushed {
                    self.emit_event(EngineEvent::IngressReplaced {
                        rules: outcome.rule_count,
                    });
                }
                report.tunnel = outcome;
            }
            Err(e) => {
                error!(error = %e, "Failed to reconcile tunnel ingress");
                let tunnel_id = self.config.tunnel_id.clone();
                self.record_failure(&mut report, ItemKind::Tunnel, tunnel_id, &e);
            }
        }

        match reconcile_dns(
            self.dns.as_ref(),
            &self.retry,
            &desired,
            self.config.engine.dns_concurrency,
        )
        .await
        {
            Ok(pass) => {
                for outcome in pass.outcomes.iter().filter(|o| o.is_mutation()) {
                    self.emit_event(EngineEvent::RecordChanged {
                        hostname: outcome.hostname.clone(),
                        record_type: outcome.record_type,
                        target: outcome.target.clone(),
                        created: outcome.change == DnsChange::Created,
                    });
                }
                report.dns = pass.outcomes;
                for (hostname, e) in pass.failures {
                    self.record_failure(&mut report, ItemKind::Dns, hostname, &e);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to list DNS zones");
                self.record_failure(&mut report, ItemKind::Dns, "zones", &e);
            }
        }

        report.finished_at = Utc::now();
        Ok(report)
    }

    fn record_failure(&self, report: &mut CycleReport, kind: ItemKind, item: impl Into<String>, error: &Error) {
        let item = item.into();
        self.emit_event(EngineEvent::ItemFailed {
            item: format!("{}:{}", kind, item),
            error: error.to_string(),
        });
        report.record_error(kind, item, error);
    }

    /// Poll interval plus uniform jitter
    fn regular_delay(&self) -> Duration {
        jittered_delay(self.config.engine.poll_interval(), self.config.engine.poll_jitter_secs)
    }

    /// `min(interval * 2^failures, failure_backoff_max)`
    fn failure_delay(&self, consecutive_failures: u32) -> Duration {
        failure_backoff(
            self.config.engine.poll_interval(),
            consecutive_failures,
            self.config.engine.failure_backoff_max(),
        )
    }

    /// Emit an engine event
    ///
    /// Events are dropped (with a warning) when the channel is full, and
    /// silently when nobody holds the receiver.
    fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

fn jittered_delay(interval: Duration, jitter_secs: u64) -> Duration {
    if jitter_secs == 0 {
        return interval;
    }
    let extra = rand::thread_rng().gen_range(0.0..=jitter_secs as f64);
    interval + Duration::from_secs_f64(extra)
}

fn failure_backoff(interval: Duration, consecutive_failures: u32, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(consecutive_failures);
    interval.saturating_mul(factor).min(cap)
}

fn log_desired(desired: &DesiredState) {
    for record in desired.records() {
        match record.class {
            DeliveryClass::Tunnel => {
                debug!(hostname = %record.hostname, "tunnel: CNAME -> {}", record.target)
            }
            DeliveryClass::Local => {
                debug!(hostname = %record.hostname, "local: A -> {}", record.target)
            }
        }
    }
}
