//! Relay lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the relay scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    /// Constructed, not started.
    Idle,
    /// Gateway connection in progress.
    WaitingForGatewayReady,
    /// Poll cycles running on the configured interval.
    Running,
    /// Shutdown requested; no new cycle will start.
    Stopping,
    /// Terminal.
    Stopped,
}

impl RelayState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: RelayState) -> bool {
        use RelayState::*;

        matches!(
            (self, target),
            (Idle, WaitingForGatewayReady) |
            (WaitingForGatewayReady, Running) |
            // Shutdown may arrive before the gateway is ready.
            (WaitingForGatewayReady, Stopping) |
            (Running, Stopping) |
            (Stopping, Stopped)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::WaitingForGatewayReady => "waiting_for_gateway_ready",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        use RelayState::*;
        let path = [Idle, WaitingForGatewayReady, Running, Stopping, Stopped];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn early_shutdown_allowed() {
        assert!(RelayState::WaitingForGatewayReady.can_transition_to(RelayState::Stopping));
    }

    #[test]
    fn invalid_transitions_rejected() {
        assert!(!RelayState::Idle.can_transition_to(RelayState::Running));
        assert!(!RelayState::Stopped.can_transition_to(RelayState::Running));
        assert!(!RelayState::Running.can_transition_to(RelayState::Idle));
        assert!(!RelayState::Stopping.can_transition_to(RelayState::Running));
    }

    #[test]
    fn only_stopped_is_terminal() {
        assert!(RelayState::Stopped.is_terminal());
        assert!(!RelayState::Stopping.is_terminal());
    }

    #[test]
    fn display_snake_case() {
        assert_eq!(
            RelayState::WaitingForGatewayReady.to_string(),
            "waiting_for_gateway_ready"
        );
    }
}
