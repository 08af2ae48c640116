//! Domain layer - Routing identity, connection handles and errors.
//!
//! Holds the types every other layer speaks: identifiers, roles, the
//! shared connection handle and the router error taxonomy.

pub mod client;
pub mod connection;
pub mod error;

// Re-export core types for convenience
pub use client::{CLIENT_ID_SPACE, CLIENT_ID_WIDTH, ClientId, ClientRole};
pub use connection::{Connection, DisconnectReason, RoutedConnection};
pub use error::RouterError;
