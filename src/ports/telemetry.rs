//! Telemetry Port - Connection Lifecycle Counters
//!
//! The router reports registrations and disconnects through this
//! trait; the Prometheus registry is the production implementation.

use crate::domain::{ClientRole, DisconnectReason};

/// Sink for connection lifecycle measurements.
pub trait LifecycleMetrics: Send + Sync + 'static {
  /// A client was registered under `role`.
  fn record_connected(&self, role: ClientRole);

  /// A registered client of `role` left the routing table.
  fn record_disconnected(&self, role: ClientRole);

  /// A connection was torn down for `reason`.
  fn record_disconnect_reason(&self, reason: DisconnectReason);
}
