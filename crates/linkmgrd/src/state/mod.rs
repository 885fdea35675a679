//! Observation sub-machines for the per-port composite state.
//!
//! Each sub-machine filters its raw signal stream through a hysteresis
//! window before the composite coordinator sees a state change.

mod link_prober_state;
mod link_state;
mod mux_state;

pub use link_prober_state::{LinkProberState, PeerProberState};
pub use link_state::{LinkState, LinkStateMachine};
pub use mux_state::{MuxState, MuxStateMachine};

/// Hysteresis window over a stream of labels.
///
/// Requires N consecutive identical inputs before reporting an advance; any
/// non-matching input restarts the count for the new label. Firing clears
/// the window, so a sustained stream re-fires every N samples; consumers
/// treat a fire that matches their current state as a no-op.
#[derive(Debug, Clone, Default)]
pub struct HysteresisFilter<S> {
    candidate: Option<S>,
    count: u32,
}

impl<S: Copy + PartialEq> HysteresisFilter<S> {
    pub fn new() -> Self {
        Self {
            candidate: None,
            count: 0,
        }
    }

    /// Feeds one sample; returns the label when it has been seen `required`
    /// consecutive times.
    pub fn feed(&mut self, label: S, required: u32) -> Option<S> {
        if self.candidate == Some(label) {
            self.count = self.count.saturating_add(1);
        } else {
            self.candidate = Some(label);
            self.count = 1;
        }

        if self.count >= required.max(1) {
            self.reset();
            Some(label)
        } else {
            None
        }
    }

    /// Clears the window.
    pub fn reset(&mut self) {
        self.candidate = None;
        self.count = 0;
    }

    /// Current consecutive count for the candidate label.
    pub fn count(&self) -> u32 {
        self.count
    }
}
