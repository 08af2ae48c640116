//! Use Cases Layer - Routing Logic
//!
//! Orchestrates the domain types behind the port interfaces.
//!
//! Use cases:
//! - `RoutingTable`: concurrent identifier → connection map
//! - `Router`: lifecycle coordinator and administrative surface

pub mod router;
pub mod routing_table;

pub use router::Router;
pub use routing_table::RoutingTable;
