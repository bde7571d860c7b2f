// # tunnelsyncd - Tunnel Sync Daemon
//
// This daemon is a THIN integration layer:
// - DO NOT add reconciliation, DNS or retry logic here
// - All sync logic lives in tunnelsync-core
// - Configuration is via environment variables ONLY (optionally seeded from `.env`)
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Constructing the Traefik and Cloudflare collaborators
// 4. Running the sync engine until SIGINT/SIGTERM
//
// ## Configuration
//
// ### Required
// - `CLOUDFLARE_API_TOKEN`: API token (Tunnel edit + DNS edit)
// - `CLOUDFLARE_TUNNEL_ID`: Tunnel whose ingress is managed
// - `TRAEFIK_API_ENDPOINT`: Traefik API root, e.g. `http://traefik:8080`
// - `TRAEFIK_SERVICE_ENDPOINT`: Where the tunnel forwards traffic, e.g. `http://192.168.1.10:8080`
//
// ### Optional
// - `CLOUDFLARE_ACCOUNT_ID`: Defaults to the first account visible to the token
// - `TRAEFIK_ENTRYPOINTS`: Comma-separated entrypoints to watch (fallback `TRAEFIK_ENTRYPOINT`; empty = all)
// - `LOCAL_ENTRYPOINTS`: Entrypoints served by local A records (default `local,office`)
// - `SKIP_TLS_ROUTES`: Skip routers terminating TLS (default `true`)
// - `ORIGIN_NO_TLS_VERIFY`: `noTLSVerify` on generated ingress rules (default `true`)
// - `POLL_INTERVAL`, `POLL_JITTER`: Seconds between cycles (default 10, 5)
// - `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS`, `RETRY_MAX_ATTEMPTS`
// - `DNS_CONCURRENCY`: Parallel DNS reconciliations (default 4)
// - `SYNC_MODE`: `live` or `dry-run`
// - `LOG_LEVEL`: trace, debug, info, warn, error (`RUST_LOG` overrides)
// - `LOG_FORMAT`: `text` or `json`
//
// ## Example
//
// ```bash
// export CLOUDFLARE_API_TOKEN=your_token
// export CLOUDFLARE_TUNNEL_ID=6ff42ae2-765d-4adf-8112-31c55c1551ef
// export TRAEFIK_API_ENDPOINT=http://traefik:8080
// export TRAEFIK_SERVICE_ENDPOINT=http://192.168.1.10:8080
// export TRAEFIK_ENTRYPOINTS=web,local
//
// tunnelsyncd
// ```

mod config;

use anyhow::Result;
use config::{DaemonConfig, LogFormat};
use std::future::Future;
use std::pin::Pin;
use std::process::ExitCode;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tunnelsync_cloudflare::{CloudflareClient, CloudflareDns, CloudflareTunnel};
use tunnelsync_core::{EngineEvent, SyncEngine};
use tunnelsync_traefik::TraefikRouterSource;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match DaemonConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    for warning in &config.warnings {
        warn!("{}", warning);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        tunnel_id = %config.sync.tunnel_id,
        traefik = %config.traefik_endpoint,
        service = %config.sync.service_endpoint,
        dry_run = config.dry_run,
        "Starting tunnelsyncd"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(config) {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return SyncExitCode::ConfigError;
            }
        };

        if let Err(e) = daemon.run().await {
            error!("Daemon error: {:#}", e);
            SyncExitCode::RuntimeError
        } else {
            SyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Install the global subscriber; `RUST_LOG` takes precedence over `LOG_LEVEL`
fn init_tracing(config: &DaemonConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match config.log_format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

/// Resolves with the name of the signal that asked for shutdown
type ShutdownSignal = Pin<Box<dyn Future<Output = &'static str> + Send>>;

/// Everything constructed before the first cycle
struct Daemon {
    engine: SyncEngine,
    events: mpsc::Receiver<EngineEvent>,
    signal: ShutdownSignal,
}

impl Daemon {
    /// Build collaborators and the engine, and install signal handlers
    ///
    /// Must be called inside the runtime. Any error here is a startup error.
    fn start(config: DaemonConfig) -> Result<Self> {
        let client = CloudflareClient::new(config.api_token, config.dry_run)?;
        let tunnel = CloudflareTunnel::new(client.clone(), config.sync.tunnel_id.clone(), config.account_id);
        let dns = CloudflareDns::new(client);
        let source = TraefikRouterSource::new(config.traefik_endpoint)?;

        let (engine, events) = SyncEngine::new(Box::new(source), Box::new(tunnel), Box::new(dns), config.sync)?;
        let signal = shutdown_signal()?;

        Ok(Self { engine, events, signal })
    }

    /// Run the engine until a shutdown signal arrives
    async fn run(self) -> Result<()> {
        let Self { engine, events, signal } = self;
        let event_logger = tokio::spawn(log_events(events));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            let name = signal.await;
            info!("Received shutdown signal: {}", name);
            let _ = shutdown_tx.send(());
        });

        engine.run_forever(shutdown_rx).await?;

        // Dropping the engine closes the event channel and lets the logger drain
        drop(engine);
        if let Err(e) = event_logger.await {
            warn!("Event logger ended abnormally: {}", e);
        }

        info!("Shutting down daemon");
        Ok(())
    }
}

/// Log engine events until the channel closes
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Started { tunnel_id } => debug!(%tunnel_id, "Engine started"),
            EngineEvent::CycleStarted { cycle } => debug!(cycle, "Cycle started"),
            EngineEvent::CycleCompleted {
                cycle,
                hosts_desired,
                mutations,
                errors,
            } => {
                if errors > 0 {
                    warn!(cycle, hosts_desired, mutations, errors, "Cycle completed with errors");
                } else {
                    debug!(cycle, hosts_desired, mutations, "Cycle completed");
                }
            }
            EngineEvent::CycleAborted { cycle, error } => warn!(cycle, %error, "Cycle aborted"),
            EngineEvent::IngressReplaced { rules } => debug!(rules, "Tunnel ingress replaced"),
            EngineEvent::RecordChanged {
                hostname,
                record_type,
                target,
                created,
            } => debug!(%hostname, %record_type, %target, created, "DNS record changed"),
            EngineEvent::ItemFailed { item, error } => debug!(%item, %error, "Item failed"),
            EngineEvent::Stopped { reason } => debug!(%reason, "Engine stopped"),
        }
    }
}

/// Resolve once SIGTERM or SIGINT arrives
#[cfg(unix)]
fn shutdown_signal() -> Result<ShutdownSignal> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(Box::pin(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    }))
}

/// Resolve once Ctrl+C arrives
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<ShutdownSignal> {
    Ok(Box::pin(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending().await
            }
        }
    }))
}
