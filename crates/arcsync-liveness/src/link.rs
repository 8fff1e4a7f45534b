//! Link state machine for one session's channel.

use std::fmt;

/// Where a session's link to the authority stands.
///
/// ```text
///            connect ok                 heartbeat silence
///   Idle ─────────────────→ Connected ─────────────────→ Suspect
///    │                        ↑   │                         │
///    │ connect failed         │   │ channel closed          │
///    ▼                        │   ▼                         ▼
///   Reconnecting{n} ──────────┘  Reconnecting{0} ←──────────┘
///    │   ↺ retry failed (n+1)
///    ▼ attempts exhausted
///   Failed ──(explicit connect)──→ Connected | Reconnecting{0}
///
///   any state ──(disconnect)──→ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never connected, or explicitly disconnected.
    Idle,
    /// Subscribed and hearing heartbeats.
    Connected,
    /// Subscribed, but nothing heard for longer than the threshold.
    Suspect,
    /// Waiting for or running retry number `attempt` (0-based).
    Reconnecting { attempt: u32 },
    /// Retries exhausted. Only an explicit connect leaves this state.
    Failed,
}

impl LinkState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: LinkState) -> bool {
        use LinkState::*;
        match (self, next) {
            (_, Idle) => true,
            (Idle | Failed | Reconnecting { .. }, Connected) => true,
            (Idle | Failed, Reconnecting { attempt: 0 }) => true,
            (Connected | Suspect, Reconnecting { attempt: 0 }) => true,
            (Connected, Suspect) => true,
            (Suspect, Connected) => true,
            (Reconnecting { attempt: a }, Reconnecting { attempt: b }) => b == a + 1,
            (Reconnecting { .. }, Failed) => true,
            _ => false,
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Suspect)
    }

    pub fn is_reconnecting(self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connected => f.write_str("connected"),
            Self::Suspect => f.write_str("suspect"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting({attempt})"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LinkState::*;

    #[test]
    fn test_happy_path_transitions_are_legal() {
        assert!(Idle.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Suspect));
        assert!(Suspect.can_transition_to(Reconnecting { attempt: 0 }));
        assert!(Reconnecting { attempt: 0 }.can_transition_to(Reconnecting { attempt: 1 }));
        assert!(Reconnecting { attempt: 1 }.can_transition_to(Connected));
    }

    #[test]
    fn test_reconnecting_attempts_cannot_skip() {
        assert!(!Reconnecting { attempt: 0 }.can_transition_to(Reconnecting { attempt: 2 }));
        assert!(!Reconnecting { attempt: 3 }.can_transition_to(Reconnecting { attempt: 0 }));
    }

    #[test]
    fn test_failed_only_reached_from_reconnecting() {
        assert!(Reconnecting { attempt: 9 }.can_transition_to(Failed));
        assert!(!Connected.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Failed));
    }

    #[test]
    fn test_every_state_can_disconnect() {
        for s in [Idle, Connected, Suspect, Reconnecting { attempt: 4 }, Failed] {
            assert!(s.can_transition_to(Idle), "{s} -> idle");
        }
    }

    #[test]
    fn test_suspect_counts_as_connected() {
        assert!(Suspect.is_connected());
        assert!(!Reconnecting { attempt: 0 }.is_connected());
        assert!(Reconnecting { attempt: 0 }.is_reconnecting());
    }
}
