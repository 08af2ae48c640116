//! Per-connection dispatch state machine.
//!
//! ```text
//! Accepted ──▶ AwaitingRead ──▶ Dispatched ──▶ AwaitingRead ──▶ …
//!     │              │               │
//!     └──────────────┴───────────────┴──────▶ Closed
//! ```
//!
//! A connection is only armed for readiness in `AwaitingRead` and only
//! handed to a worker on the `AwaitingRead → Dispatched` edge, so at
//! most one drain task per connection can exist.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, registration in progress.
    Accepted,
    /// Armed for read readiness.
    AwaitingRead,
    /// A drain task owns the read side.
    Dispatched,
    /// Terminal.
    Closed,
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid connection transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    /// Whether `self → next` is a legal edge.
    pub const fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Accepted | Self::Dispatched, Self::AwaitingRead)
                | (Self::AwaitingRead, Self::Dispatched)
                | (Self::Accepted | Self::AwaitingRead | Self::Dispatched, Self::Closed)
        )
    }

    /// Move to `next`, leaving `self` untouched on an illegal edge.
    ///
    /// # Errors
    /// `InvalidTransition` when the edge does not exist.
    pub fn transition(&mut self, next: Self) -> Result<(), InvalidTransition> {
        if self.can_transition(next) {
            *self = next;
            Ok(())
        } else {
            Err(InvalidTransition { from: *self, to: next })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "ACCEPTED",
            Self::AwaitingRead => "AWAITING_READ",
            Self::Dispatched => "DISPATCHED",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn test_read_loop_edges() {
        let mut state = Accepted;
        state.transition(AwaitingRead).unwrap();
        for _ in 0..3 {
            state.transition(Dispatched).unwrap();
            state.transition(AwaitingRead).unwrap();
        }
        state.transition(Closed).unwrap();
        assert_eq!(state, Closed);
    }

    #[test]
    fn test_double_dispatch_rejected() {
        let mut state = AwaitingRead;
        state.transition(Dispatched).unwrap();
        let err = state.transition(Dispatched).unwrap_err();
        assert_eq!(err, InvalidTransition { from: Dispatched, to: Dispatched });
        assert_eq!(state, Dispatched);
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [Accepted, AwaitingRead, Dispatched, Closed] {
            assert!(!Closed.can_transition(next), "CLOSED -> {next} must be rejected");
        }
    }

    #[test]
    fn test_accepted_cannot_dispatch_directly() {
        assert!(!Accepted.can_transition(Dispatched));
    }
}
