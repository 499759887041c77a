//! Session state machine

use crate::{Error, Result};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created around a connected transport, handshake not yet started
    Created,

    /// TLS negotiation in progress
    Handshaking,

    /// Negotiation complete, ready to send
    Established,

    /// Teardown sequence running
    ShuttingDown,

    /// Closed (terminal)
    Closed,
}

impl SessionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Created, Handshaking) | (Handshaking, Established) | (_, ShuttingDown) | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::Established => write!(f, "established"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = SessionState::Created;
        assert!(state.transition(SessionState::Handshaking).is_ok());
        assert!(state.transition(SessionState::Established).is_ok());
        assert!(state.transition(SessionState::ShuttingDown).is_ok());
        assert!(state.transition(SessionState::Closed).is_ok());
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = SessionState::Created;
        assert!(state.transition(SessionState::Established).is_err());
    }

    #[test]
    fn test_close_from_any_state() {
        let mut state = SessionState::Handshaking;
        assert!(state.transition(SessionState::Closed).is_ok());
    }

    #[test]
    fn test_shutdown_allowed_after_peer_close() {
        // A peer close mid-send lands in Closed; teardown may still run.
        let mut state = SessionState::Closed;
        assert!(state.transition(SessionState::ShuttingDown).is_ok());
    }

    #[test]
    fn test_no_reestablish_after_close() {
        let mut state = SessionState::Closed;
        assert!(state.transition(SessionState::Handshaking).is_err());
        assert!(state.transition(SessionState::Established).is_err());
    }
}
