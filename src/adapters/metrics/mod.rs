//! Metrics Adapters - Prometheus Export and Health Probes
//!
//! Prometheus export on `/metrics` and the `/live` + `/ready` probes,
//! both served with axum 0.7.

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use self::prometheus::RouterMetrics;
