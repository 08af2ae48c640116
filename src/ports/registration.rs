//! Registration Port - Connection Lifecycle Capability
//!
//! The multiplexer reports every accepted and every torn-down
//! connection through this trait. Calls are synchronous and made
//! inline, from the control task on connect and from whichever task
//! runs the disconnect path.

use std::sync::Arc;

use crate::domain::{ClientId, Connection, RouterError};

/// Receiver of connect/disconnect notifications.
pub trait RegistrationListener: Send + Sync + 'static {
  /// A connection was accepted on `port`.
  ///
  /// Returns the routing identifier assigned to it. The multiplexer
  /// does not arm the connection for reads until this returns.
  ///
  /// # Errors
  /// An error rejects the connection; the multiplexer closes it.
  fn on_connected(&self, connection: Arc<Connection>, port: u16) -> Result<ClientId, RouterError>;

  /// A connection reached end-of-stream, failed, timed out, or is
  /// being closed at shutdown. Invoked at most once per connection and
  /// always before the socket is shut down.
  fn on_disconnected(&self, connection: &Connection);
}
