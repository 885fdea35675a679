//! MUX-state sub-machine driven by hardware/driver reports.

use std::str::FromStr;

use sonic_linkmgr_common::MuxError;

use super::HysteresisFilter;

/// MUX direction as reported by the transceiver driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MuxState {
    Active,
    Standby,
    Unknown,
    Error,
    /// Initial state only; unreachable after the first definite report.
    Wait,
}

impl MuxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MuxState::Active => "active",
            MuxState::Standby => "standby",
            MuxState::Unknown => "unknown",
            MuxState::Error => "error",
            MuxState::Wait => "wait",
        }
    }

    /// True for Active/Standby, the two states the hardware can settle in.
    pub fn is_definite(&self) -> bool {
        matches!(self, MuxState::Active | MuxState::Standby)
    }
}

impl Default for MuxState {
    fn default() -> Self {
        MuxState::Wait
    }
}

impl FromStr for MuxState {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MuxState::Active),
            "standby" => Ok(MuxState::Standby),
            "unknown" => Ok(MuxState::Unknown),
            "error" | "Error" => Ok(MuxState::Error),
            other => Err(MuxError::invalid_input(
                "state",
                format!("unknown mux state: {}", other),
            )),
        }
    }
}

/// Three-way sub-machine over driver reports, with hysteresis.
#[derive(Debug, Clone, Default)]
pub struct MuxStateMachine {
    state: MuxState,
    filter: HysteresisFilter<MuxState>,
}

impl MuxStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    /// Feeds one driver report. Returns the advanced label when the
    /// hysteresis window fills, whether or not it differs from the current
    /// state (a confirming report must still clear a pending toggle).
    pub fn post_event(&mut self, label: MuxState, retry_count: u32) -> Option<MuxState> {
        self.filter.feed(label, retry_count)
    }

    /// Forces the state, bypassing hysteresis. Used for the optimistic
    /// target label on a toggle decision and for warm-restart adoption.
    pub fn set_state(&mut self, label: MuxState) {
        self.state = label;
        self.filter.reset();
    }

    /// Commits an advanced label as the current state.
    pub fn advance(&mut self, label: MuxState) {
        self.state = label;
    }
}
