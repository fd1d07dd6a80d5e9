//! Edge guard (v1)
//!
//! Request gatekeeping in front of an HTTP service.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     EDGE GUARD                       │
//!                     │                                                      │
//!   Client Request    │  ┌────────┐   ┌──────────────────────────────────┐  │
//!   ──────────────────┼─▶│  http  │──▶│           RequestGate            │  │
//!                     │  │ server │   │ lists → ban → rate → behavior →  │  │
//!                     │  └────────┘   │ payload → sanitize               │  │
//!                     │       ▲       └───────────────┬──────────────────┘  │
//!                     │       │                       │                     │
//!   Client Response   │       │ reject                ▼ allow               │
//!   ◀─────────────────┼───────┘              ┌────────────────┐             │
//!                     │                      │ upstream / echo│─────────────┼──▶ Upstream
//!                     │                      └────────────────┘             │
//!                     │                                                      │
//!                     │  ┌────────────┐   ┌────────────────┐  ┌──────────┐  │
//!                     │  │ StateStore │◀──│MetricsCollector│─▶│  admin   │  │
//!                     │  │ (+janitor) │   │ (+alerts)      │  │   API    │  │
//!                     │  └────────────┘   └────────────────┘  └──────────┘  │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use edge_guard::admin::{setup_admin_router, AdminState};
use edge_guard::clock::{Clock, SystemClock};
use edge_guard::config::{load_config, GuardConfig};
use edge_guard::http::GuardServer;
use edge_guard::lifecycle::{signals, startup, GuardRuntime, Shutdown};
use edge_guard::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "edge-guard")]
#[command(about = "Rate limiting and payload inspection in front of an HTTP service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "EDGE_GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("edge-guard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        window_ms = config.rate_limit.window_ms,
        max_requests_per_ip = config.rate_limit.max_requests_per_ip,
        ban_time_ms = config.ban.ban_time_ms,
        config_file = ?args.config,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runtime = GuardRuntime::build(&config, clock.clone())?;
    let shutdown = Shutdown::new();

    startup::spawn_janitor(
        runtime.store.clone(),
        clock.clone(),
        Duration::from_secs(config.store.janitor_interval_secs),
        shutdown.subscribe(),
    );

    if config.monitor.enabled {
        startup::spawn_event_drain(runtime.collector.subscribe());
        runtime.collector.start().await;
    } else {
        tracing::info!("Metrics collector disabled");
    }

    if config.admin.enabled {
        let admin = setup_admin_router(AdminState {
            gate: runtime.gate.clone(),
            collector: runtime.collector.clone(),
            api_key: Arc::new(config.admin.api_key.clone()),
        });
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");

        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    signals::spawn_signal_listener(&shutdown);

    let server = GuardServer::new(config, runtime.gate.clone(), clock);
    server.run(listener, shutdown.subscribe()).await?;

    runtime.collector.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
