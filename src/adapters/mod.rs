//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Concrete infrastructure behind the port traits defined in
//! `crate::ports`.
//!
//! Adapter categories:
//! - `net`: listeners, readiness multiplexer and drain worker pool
//! - `processing`: message processors handed every inbound chunk
//! - `metrics`: Prometheus metrics export and health checks

pub mod metrics;
pub mod net;
pub mod processing;
