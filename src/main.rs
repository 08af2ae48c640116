//! fixme-router — Entry Point
//!
//! Initializes configuration, logging, metrics and the two listeners,
//! then runs the routing event loop until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (path from argv[1]) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create Prometheus registry
//! 4. Bind broker + market listeners (fatal on failure)
//! 5. Create RoutingTable + Router (RegistrationListener)
//! 6. Spawn health server (/live + /ready) and metrics server (/metrics)
//! 7. Spawn ConnectionMultiplexer event loop
//! 8. Wait for SIGINT → graceful shutdown (close clients → drain → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use fixme_router::adapters::metrics::{HealthServer, HealthState, RouterMetrics};
use fixme_router::adapters::net::ConnectionMultiplexer;
use fixme_router::adapters::processing::LogProcessor;
use fixme_router::config;
use fixme_router::ports::{LifecycleMetrics, MessageProcessor, RegistrationListener};
use fixme_router::usecases::{Router, RoutingTable};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.router.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.router.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        "Starting router"
    );

    // ── 3. Shutdown channel + metrics registry ──────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let metrics = Arc::new(RouterMetrics::new().context("Failed to create metrics registry")?);
    let health = Arc::new(HealthState::new());

    // ── 4. Bind listeners (the only fatal runtime error) ────
    let multiplexer = ConnectionMultiplexer::bind(&config.network, &config.workers)
        .await
        .context("Failed to start listeners")?;
    health.mark_listening();

    // ── 5. Routing table + coordinator ──────────────────────
    let broker_port = multiplexer.broker_addr().port();
    let table = Arc::new(RoutingTable::new(broker_port));
    let lifecycle: Arc<dyn LifecycleMetrics> = metrics.clone();
    let router = Arc::new(Router::new(Arc::clone(&table), broker_port, lifecycle));

    // ── 6. Health + metrics servers ─────────────────────────
    let health_handle = tokio::spawn({
        let server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
        let shutdown_rx = shutdown_tx.subscribe();
        async move {
            if let Err(e) = server.run(shutdown_rx).await {
                error!(error = %e, "Health server failed");
            }
        }
    });

    let metrics_handle = config.metrics.enabled.then(|| {
        let registry = Arc::clone(&metrics);
        let bind_address = config.metrics.bind_address.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = registry.serve(bind_address, shutdown_rx).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    });

    // ── 7. Routing event loop ───────────────────────────────
    let listener: Arc<dyn RegistrationListener> = router;
    let processor: Arc<dyn MessageProcessor> = Arc::new(LogProcessor);
    let router_handle = tokio::spawn(multiplexer.run(
        listener,
        processor,
        Arc::clone(&metrics),
        shutdown_tx.subscribe(),
    ));

    info!("Router is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for SIGINT, shutting down");
    } else {
        info!("SIGINT received, initiating graceful shutdown");
    }

    health.mark_shutting_down();
    let _ = shutdown_tx.send(());

    let grace = config.workers.shutdown_grace() + Duration::from_secs(5);
    if tokio::time::timeout(grace, router_handle).await.is_err() {
        warn!("Router event loop did not stop in time");
    }

    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;

    info!(remaining_clients = table.len(), "Shutdown complete");
    Ok(())
}
