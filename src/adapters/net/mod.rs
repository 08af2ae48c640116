//! Networking Adapters - Listeners, Readiness Dispatch and Drain Workers
//!
//! - `multiplexer`: single control task owning both listeners and the
//!   set of connections armed for read readiness
//! - `worker_pool`: bounded pool draining one chunk per dispatch
//! - `state`: per-connection dispatch state machine

pub mod multiplexer;
pub mod state;
pub mod worker_pool;

pub use multiplexer::ConnectionMultiplexer;
pub use state::{ConnectionState, InvalidTransition};
pub use worker_pool::{DrainContext, DrainOutcome, DrainTask, WorkerPool};

use tracing::warn;

use crate::adapters::metrics::RouterMetrics;
use crate::domain::{Connection, DisconnectReason};
use crate::ports::{LifecycleMetrics, RegistrationListener};

/// Run the disconnect path for `connection`.
///
/// Whichever caller retires the connection first notifies the listener
/// (which drops the routing entry) and only then shuts the socket down.
/// Later callers are no-ops. Returns whether this call did the teardown.
pub(crate) fn disconnect(
    listener: &dyn RegistrationListener,
    metrics: &RouterMetrics,
    connection: &Connection,
    reason: DisconnectReason,
) -> bool {
    if !connection.retire() {
        return false;
    }

    listener.on_disconnected(connection);
    metrics.record_disconnect_reason(reason);

    if let Err(e) = connection.shutdown() {
        warn!(
            peer = %connection.peer_addr(),
            reason = reason.as_str(),
            error = %e,
            "Error closing client connection"
        );
    }
    true
}
