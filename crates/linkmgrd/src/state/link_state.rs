//! Link-state sub-machine driven by interface oper-status.

use std::str::FromStr;

use sonic_linkmgr_common::MuxError;

use super::HysteresisFilter;

/// Physical link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Up,
    Down,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
        }
    }
}

impl Default for LinkState {
    fn default() -> Self {
        LinkState::Down
    }
}

impl FromStr for LinkState {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(LinkState::Up),
            "down" => Ok(LinkState::Down),
            other => Err(MuxError::invalid_input(
                "oper_status",
                format!("unknown link state: {}", other),
            )),
        }
    }
}

/// Two-state sub-machine over oper-status reports, with hysteresis.
#[derive(Debug, Clone, Default)]
pub struct LinkStateMachine {
    state: LinkState,
    filter: HysteresisFilter<LinkState>,
}

impl LinkStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Feeds one oper-status report; returns the advanced label when the
    /// hysteresis window fills.
    pub fn post_event(&mut self, label: LinkState, retry_count: u32) -> Option<LinkState> {
        self.filter.feed(label, retry_count)
    }

    pub fn advance(&mut self, label: LinkState) {
        self.state = label;
    }
}
