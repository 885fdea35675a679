//! Link-prober sub-state and peer-view labels.
//!
//! The prober sub-machine itself is owned by the composite coordinator:
//! verdict streams for self and peer feed separate hysteresis windows with
//! the positive/negative thresholds, so the label enums live here and the
//! windows live in `link_manager`.

/// Prober sub-state for the local ToR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkProberState {
    /// Heartbeats answered with our own identity; we carry traffic.
    Active,
    /// Heartbeats unanswered.
    Unknown,
    /// No verdict stream yet.
    Wait,
}

impl LinkProberState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkProberState::Active => "active",
            LinkProberState::Unknown => "unknown",
            LinkProberState::Wait => "wait",
        }
    }
}

impl Default for LinkProberState {
    fn default() -> Self {
        LinkProberState::Wait
    }
}

/// Prober view of the peer ToR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerProberState {
    PeerActive,
    PeerUnknown,
    PeerWait,
}

impl PeerProberState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerProberState::PeerActive => "peer_active",
            PeerProberState::PeerUnknown => "peer_unknown",
            PeerProberState::PeerWait => "peer_wait",
        }
    }
}

impl Default for PeerProberState {
    fn default() -> Self {
        PeerProberState::PeerWait
    }
}
