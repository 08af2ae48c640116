//! Router - Lifecycle Coordinator and Administrative Surface
//!
//! Implements the `RegistrationListener` capability on top of the
//! routing table: registers accepted connections, unregisters torn-down
//! ones and emits the lifecycle notices. Also exposes the operations a
//! broker/market protocol layer needs from the core: role and
//! connection lookup, sending to a client, and forced disconnect.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{ClientId, ClientRole, Connection, DisconnectReason, RouterError};
use crate::ports::{LifecycleMetrics, RegistrationListener};

use super::routing_table::RoutingTable;

/// Coordinator between the multiplexer and the routing table.
pub struct Router {
    /// Injected routing table, shared with protocol collaborators.
    table: Arc<RoutingTable>,
    /// Port whose clients are brokers.
    broker_port: u16,
    metrics: Arc<dyn LifecycleMetrics>,
}

impl Router {
    /// Create a router over `table`.
    ///
    /// `broker_port` must be the actual bound port of the broker
    /// listener, not a configured 0.
    pub const fn new(table: Arc<RoutingTable>, broker_port: u16, metrics: Arc<dyn LifecycleMetrics>) -> Self {
        Self {
            table,
            broker_port,
            metrics,
        }
    }

    pub const fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// Role of a live client.
    ///
    /// # Errors
    /// `EntryNotFound` if `id` is not live.
    pub fn client_role(&self, id: &ClientId) -> Result<ClientRole, RouterError> {
        self.table.get_client_type(id)
    }

    /// Connection of a live client.
    ///
    /// # Errors
    /// `EntryNotFound` if `id` is not live.
    pub fn connection(&self, id: &ClientId) -> Result<Arc<Connection>, RouterError> {
        self.table.get_client(id)
    }

    /// Deliver `payload` to the client registered under `id`.
    ///
    /// # Errors
    /// `EntryNotFound` if `id` is not live, `ClientIo` if the write fails.
    pub async fn send(&self, id: &ClientId, payload: &[u8]) -> Result<(), RouterError> {
        let connection = self.table.get_client(id)?;
        connection.send(payload).await.map_err(|source| RouterError::ClientIo {
            id: id.clone(),
            source,
        })?;
        debug!(client_id = %id, bytes = payload.len(), "Payload delivered");
        Ok(())
    }

    /// Force a client off the router.
    ///
    /// The entry is removed before the socket is shut down; the
    /// multiplexer then observes end-of-stream and drops its registration
    /// without calling back into the router.
    ///
    /// # Errors
    /// `EntryNotFound` if `id` is not live.
    pub fn disconnect(&self, id: &ClientId) -> Result<(), RouterError> {
        let connection = self.table.get_client(id)?;
        if !connection.retire() {
            // Another disconnect path already owns this connection.
            return Ok(());
        }

        let role = ClientRole::from_port(connection.local_addr().port(), self.broker_port);
        self.table.remove_client(id);
        self.metrics.record_disconnected(role);
        self.metrics.record_disconnect_reason(DisconnectReason::Admin);
        info!(client_id = %id, role = role.label(), "{} client with ID: {} disconnected by router.", role.label(), id);

        if let Err(e) = connection.shutdown() {
            warn!(client_id = %id, error = %e, "Failed to shut down client socket");
        }
        Ok(())
    }
}

impl RegistrationListener for Router {
    fn on_connected(&self, connection: Arc<Connection>, port: u16) -> Result<ClientId, RouterError> {
        let peer = connection.peer_addr();
        let id = self.table.add_client(connection)?;
        let role = ClientRole::from_port(port, self.broker_port);
        self.metrics.record_connected(role);
        info!(client_id = %id, role = role.label(), peer = %peer, "{} client connected with ID: {}", role.label(), id);
        Ok(id)
    }

    fn on_disconnected(&self, connection: &Connection) {
        let Some(id) = self.table.get_client_id(connection) else {
            debug!(peer = %connection.peer_addr(), "Disconnect for unregistered connection");
            return;
        };

        let role = match self.table.get_client_type(&id) {
            Ok(role) => role,
            // Raced with another removal of the same entry.
            Err(_) => return,
        };
        if self.table.remove_client(&id).is_some() {
            self.metrics.record_disconnected(role);
            info!(
                client_id = %id,
                role = role.label(),
                uptime_secs = connection.uptime_secs(),
                "{} client with ID: {} disconnected.",
                role,
                id
            );
        }
    }
}
