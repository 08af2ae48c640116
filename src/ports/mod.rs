//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) the networking core requires from
//! its collaborators. The router and test doubles implement these.
//!
//! Port categories:
//! - `RegistrationListener`: connect/disconnect lifecycle callbacks
//! - `MessageProcessor`: consumer of raw inbound bytes
//! - `LifecycleMetrics`: connect/disconnect counters

pub mod processor;
pub mod registration;
pub mod telemetry;

pub use processor::{InboundChunk, MessageProcessor};
pub use registration::RegistrationListener;
pub use telemetry::LifecycleMetrics;
