//! Prometheus Metrics Registry - Router Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers connection lifecycle, accept failures, drain throughput and
//! latency, and dispatch backlog.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::{ClientRole, DisconnectReason};
use crate::ports::LifecycleMetrics;

/// Centralized Prometheus metrics for the router.
///
/// All metrics follow the naming convention `fixme_router_*`.
pub struct RouterMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Live connections by role.
    pub connections_active: IntGaugeVec,
    /// Accepted and registered connections by role.
    pub connections_total: IntCounterVec,
    /// Disconnects by reason.
    pub disconnects_total: IntCounterVec,
    /// Failed accept attempts.
    pub accept_errors: IntCounter,
    /// Bytes drained from clients, by role.
    pub bytes_received: IntCounterVec,
    /// Completed drain tasks.
    pub drains_total: IntCounter,
    /// Drain tasks that ended in a failure.
    pub drain_failures: IntCounter,
    /// Time spent inside one drain task (microseconds).
    pub drain_latency_us: Histogram,
    /// Ready connections waiting for room in the drain queue.
    pub dispatch_backlog: IntGauge,
}

impl RouterMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let connections_active = IntGaugeVec::new(
            Opts::new("fixme_router_connections_active", "Live routed connections"),
            &["role"],
        )?;

        let connections_total = IntCounterVec::new(
            Opts::new(
                "fixme_router_connections_total",
                "Connections accepted and registered",
            ),
            &["role"],
        )?;

        let disconnects_total = IntCounterVec::new(
            Opts::new("fixme_router_disconnects_total", "Connections torn down"),
            &["reason"],
        )?;

        let accept_errors = IntCounter::new(
            "fixme_router_accept_errors_total",
            "Failed accept attempts",
        )?;

        let bytes_received = IntCounterVec::new(
            Opts::new(
                "fixme_router_bytes_received_total",
                "Bytes drained from routed clients",
            ),
            &["role"],
        )?;

        let drains_total = IntCounter::new("fixme_router_drains_total", "Completed drain tasks")?;

        let drain_failures = IntCounter::new(
            "fixme_router_drain_failures_total",
            "Drain tasks that tore their connection down on error",
        )?;

        let drain_latency_us = Histogram::with_opts(
            HistogramOpts::new(
                "fixme_router_drain_latency_us",
                "Drain task duration in microseconds",
            )
            .buckets(vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 20000.0]),
        )?;

        let dispatch_backlog = IntGauge::new(
            "fixme_router_dispatch_backlog",
            "Ready connections waiting for drain queue capacity",
        )?;

        // Register all metrics
        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(disconnects_total.clone()))?;
        registry.register(Box::new(accept_errors.clone()))?;
        registry.register(Box::new(bytes_received.clone()))?;
        registry.register(Box::new(drains_total.clone()))?;
        registry.register(Box::new(drain_failures.clone()))?;
        registry.register(Box::new(drain_latency_us.clone()))?;
        registry.register(Box::new(dispatch_backlog.clone()))?;

        Ok(Self {
            registry,
            connections_active,
            connections_total,
            disconnects_total,
            accept_errors,
            bytes_received,
            drains_total,
            drain_failures,
            drain_latency_us,
            dispatch_backlog,
        })
    }

    pub fn record_bytes(&self, role: ClientRole, bytes: usize) {
        self.bytes_received
            .with_label_values(&[role.metric_label()])
            .inc_by(bytes as u64);
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl LifecycleMetrics for RouterMetrics {
    fn record_connected(&self, role: ClientRole) {
        self.connections_active.with_label_values(&[role.metric_label()]).inc();
        self.connections_total.with_label_values(&[role.metric_label()]).inc();
    }

    fn record_disconnected(&self, role: ClientRole) {
        self.connections_active.with_label_values(&[role.metric_label()]).dec();
    }

    fn record_disconnect_reason(&self, reason: DisconnectReason) {
        self.disconnects_total.with_label_values(&[reason.as_str()]).inc();
    }
}
