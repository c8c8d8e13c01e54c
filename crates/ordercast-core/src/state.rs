//! Connection lifecycle state and its transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state held by the connection supervisor.
///
/// Exactly one value is current at any time. Status subscribers only see a
/// change when the new value differs from the current one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No transport and no attempt in flight.
    #[default]
    Disconnected,
    /// A transport is being opened for a tenant.
    Connecting,
    /// The transport is up; authentication has not been acknowledged yet.
    Connected,
    /// The server accepted the credential for the session's tenant.
    Authenticated,
    /// The transport dropped for a transient reason and is retrying by itself.
    Reconnecting,
    /// The transport exhausted its retry budget.
    Failed,
    /// Authentication was refused or the connect attempt failed.
    Error,
}

impl ConnectionState {
    /// All states, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::Authenticated,
        Self::Reconnecting,
        Self::Failed,
        Self::Error,
    ];

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Self-transitions are not transitions: they are suppressed before
    /// reaching subscribers, so they return `false` here.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{
            Authenticated, Connected, Connecting, Disconnected, Error, Failed, Reconnecting,
        };

        if self == next {
            return false;
        }
        // Explicit disconnect is always allowed.
        if next == Disconnected {
            return true;
        }
        matches!(
            (self, next),
            (Disconnected | Failed | Error, Connecting)
                | (Connecting | Reconnecting, Connected)
                | (Connecting | Connected | Authenticated, Error)
                | (Connected, Authenticated)
                | (Connected | Authenticated, Reconnecting)
                | (Reconnecting, Failed)
        )
    }

    /// Whether a live transport is available for `emit`.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated)
    }

    /// Whether a connection attempt is currently in flight.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Whether the supervisor holds a transport handle in this state.
    #[must_use]
    pub fn has_transport(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Authenticated | Self::Reconnecting
        )
    }

    /// Wire/display name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Authenticated => "AUTHENTICATED",
            Self::Reconnecting => "RECONNECTING",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ConnectionState::*;

    #[test]
    fn default_is_disconnected() {
        assert_eq!(ConnectionState::default(), Disconnected);
    }

    #[test]
    fn happy_path_is_legal() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Authenticated));
    }

    #[test]
    fn transient_loss_path_is_legal() {
        assert!(Authenticated.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connected));
        assert!(Reconnecting.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Connecting));
    }

    #[test]
    fn unauthorized_path_is_legal() {
        assert!(Connected.can_transition_to(Error));
        assert!(Authenticated.can_transition_to(Error));
        assert!(Error.can_transition_to(Connecting));
    }

    #[test]
    fn any_state_can_disconnect() {
        for state in ConnectionState::ALL {
            if state != Disconnected {
                assert!(state.can_transition_to(Disconnected), "{state} -> DISCONNECTED");
            }
        }
    }

    #[test]
    fn self_transition_is_not_a_transition() {
        for state in ConnectionState::ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn illegal_shortcuts_rejected() {
        assert!(!Disconnected.can_transition_to(Authenticated));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connecting.can_transition_to(Authenticated));
        assert!(!Reconnecting.can_transition_to(Authenticated));
        assert!(!Authenticated.can_transition_to(Connected));
        assert!(!Failed.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Failed));
    }

    #[test]
    fn connected_states() {
        assert!(Connected.is_connected());
        assert!(Authenticated.is_connected());
        assert!(!Reconnecting.is_connected());
        assert!(!Connecting.is_connected());
    }

    #[test]
    fn in_flight_states() {
        assert!(Connecting.is_in_flight());
        assert!(Reconnecting.is_in_flight());
        assert!(!Authenticated.is_in_flight());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&Authenticated).unwrap();
        assert_eq!(json, "\"AUTHENTICATED\"");
        let back: ConnectionState = serde_json::from_str("\"RECONNECTING\"").unwrap();
        assert_eq!(back, Reconnecting);
    }

    #[test]
    fn display_matches_wire_name() {
        for state in ConnectionState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json.trim_matches('"'), state.to_string());
        }
    }

    fn any_state() -> impl Strategy<Value = ConnectionState> {
        prop::sample::select(ConnectionState::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn legal_transitions_respect_the_handshake(from in any_state(), to in any_state()) {
            if from.can_transition_to(to) {
                prop_assert_ne!(from, to);
                if to == Authenticated {
                    prop_assert_eq!(from, Connected);
                }
                if to == Connected {
                    prop_assert!(from.is_in_flight());
                }
                if to == Failed {
                    prop_assert_eq!(from, Reconnecting);
                }
            }
        }

        #[test]
        fn walks_from_disconnected_never_skip_connecting(
            steps in prop::collection::vec(any_state(), 0..40),
        ) {
            let mut state = Disconnected;
            let mut opened = false;
            for next in steps {
                if !state.can_transition_to(next) {
                    continue;
                }
                if next == Connecting {
                    opened = true;
                }
                if next.has_transport() {
                    prop_assert!(opened, "{state} -> {next} before any connect");
                }
                state = next;
            }
        }
    }
}
