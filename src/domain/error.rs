//! Router error taxonomy.
//!
//! Only `Bind` is fatal, and only at startup. Accept, drain and shutdown
//! failures are logged where they happen and never surface here.

use std::io;

use super::client::{ClientId, ClientRole};

/// Errors surfaced by the router core to its callers.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// A listening socket could not be bound.
    #[error("failed to bind {role} listener on {address}: {source}")]
    Bind {
        role: ClientRole,
        address: String,
        #[source]
        source: io::Error,
    },

    /// No live routing entry for the identifier or connection.
    #[error("no routing entry for client {0}")]
    EntryNotFound(String),

    /// Externally supplied identifier is malformed.
    #[error("invalid client identifier {0:?}")]
    InvalidClientId(String),

    /// Every identifier in the space is currently assigned.
    #[error("routing identifier space exhausted ({0} live clients)")]
    IdSpaceExhausted(usize),

    /// I/O error while talking to a routed client.
    #[error("I/O error on client {id}: {source}")]
    ClientIo {
        id: ClientId,
        #[source]
        source: io::Error,
    },
}

impl RouterError {
    pub fn not_found(id: &ClientId) -> Self {
        Self::EntryNotFound(id.to_string())
    }

    /// Whether this is the explicit "not found" lookup outcome.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound(_))
    }
}
