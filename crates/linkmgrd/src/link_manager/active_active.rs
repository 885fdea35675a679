//! Active-active transition policy.
//!
//! Both ToRs may forward simultaneously, so local decisions never depend on
//! the local side being standby. Peer signals are handled over the
//! peer-notification channel and never touch local hardware.

use tracing::{info, warn};

use crate::config::Mode;
use crate::link_prober::LinkProberVerdict;
use crate::state::{LinkProberState, LinkState, MuxState, PeerProberState};

use super::{LinkProberMetrics, MachineCore, SwitchCause};

pub struct ActiveActiveStateMachine {
    pub(crate) core: MachineCore,
}

impl ActiveActiveStateMachine {
    pub(crate) fn new(core: MachineCore) -> Self {
        Self { core }
    }

    pub async fn handle_link_prober_verdict(&mut self, verdict: LinkProberVerdict) {
        let cfg = self.core.config().await;
        match verdict {
            LinkProberVerdict::SelfActive => {
                if self
                    .core
                    .prober_filter
                    .feed(
                        LinkProberState::Active,
                        cfg.positive_state_change_retry_count,
                    )
                    .is_some()
                    && self.core.prober_state != LinkProberState::Active
                {
                    let was_unknown = self.core.prober_state == LinkProberState::Unknown;
                    self.core.prober_state = LinkProberState::Active;
                    if was_unknown {
                        self.core
                            .db
                            .post_link_prober_metrics(
                                self.core.port_name(),
                                LinkProberMetrics::UnknownEnd,
                            )
                            .await;
                    }
                    self.on_prober_active().await;
                }
            }
            LinkProberVerdict::SelfUnknown => {
                if self
                    .core
                    .prober_filter
                    .feed(
                        LinkProberState::Unknown,
                        cfg.negative_state_change_retry_count,
                    )
                    .is_some()
                    && self.core.prober_state != LinkProberState::Unknown
                {
                    self.core.prober_state = LinkProberState::Unknown;
                    self.core
                        .db
                        .post_link_prober_metrics(
                            self.core.port_name(),
                            LinkProberMetrics::UnknownStart,
                        )
                        .await;
                    self.on_prober_unknown().await;
                }
            }
            LinkProberVerdict::PeerActive => {
                if self
                    .core
                    .peer_filter
                    .feed(
                        PeerProberState::PeerActive,
                        cfg.positive_state_change_retry_count,
                    )
                    .is_some()
                    && self.core.peer_prober_state != PeerProberState::PeerActive
                {
                    self.core.peer_prober_state = PeerProberState::PeerActive;
                    // The peer answers its own heartbeats, so its side of
                    // the cable is forwarding.
                    self.core.peer_mux_state = MuxState::Active;
                }
            }
            LinkProberVerdict::PeerUnknown => {
                if self
                    .core
                    .peer_filter
                    .feed(
                        PeerProberState::PeerUnknown,
                        cfg.negative_state_change_retry_count,
                    )
                    .is_some()
                    && self.core.peer_prober_state != PeerProberState::PeerUnknown
                {
                    self.core.peer_prober_state = PeerProberState::PeerUnknown;
                    self.on_peer_prober_unknown().await;
                }
            }
            LinkProberVerdict::PeerWait => {
                if let Some(state) = self.core.peer_filter.feed(PeerProberState::PeerWait, 1) {
                    self.core.peer_prober_state = state;
                }
            }
        }
        self.core.publish_health().await;
    }

    async fn on_prober_active(&mut self) {
        if self.core.port_config.mode != Mode::Auto {
            return;
        }
        if self.core.link_sm.state() == LinkState::Up
            && self.core.mux_sm.state() != MuxState::Active
        {
            self.core
                .issue_mux_toggle(MuxState::Active, SwitchCause::LinkProberActive)
                .await;
        }
    }

    async fn on_prober_unknown(&mut self) {
        if self.core.port_config.mode != Mode::Auto {
            return;
        }
        if self.core.link_sm.state() == LinkState::Up
            && self.core.mux_sm.state() != MuxState::Standby
        {
            self.core
                .issue_mux_toggle(MuxState::Standby, SwitchCause::LinkProberUnknown)
                .await;
            self.core.suspend_prober().await;
        }
    }

    /// The peer's heartbeats went missing. Ask it to stand down, but only
    /// while we can actually carry the traffic, and never when detached.
    /// Peer signals never drive local hardware.
    async fn on_peer_prober_unknown(&mut self) {
        if matches!(self.core.port_config.mode, Mode::Detached | Mode::Manual) {
            return;
        }
        if self.core.prober_state != LinkProberState::Active {
            return;
        }
        info!(port = %self.core.port_name(), "Peer heartbeats missing, requesting peer standby");
        self.core
            .db
            .post_switch_cause(self.core.port_name(), SwitchCause::PeerHeartbeatMissing)
            .await;
        self.core
            .db
            .set_peer_mux_state(self.core.port_name(), MuxState::Standby)
            .await;
        self.core.peer_mux_state = MuxState::Standby;
    }

    /// Peer forwarding-state confirmation from the fabric.
    pub async fn handle_peer_mux_state_notification(&mut self, label: MuxState) {
        self.core.peer_mux_state = label;
    }

    pub async fn handle_mux_state_notification(&mut self, label: MuxState) {
        let cfg = self.core.config().await;
        let Some(advanced) = self
            .core
            .mux_sm
            .post_event(label, cfg.mux_state_change_retry_count)
        else {
            return;
        };

        if let Some(pending) = self.core.pending {
            if advanced == pending.target {
                self.core.confirm_pending(advanced).await;
                self.evaluate(SwitchCause::HardwareStateMismatch).await;
            } else if !advanced.is_definite() {
                self.core.pending = None;
                self.core.mux_sm.advance(advanced);
                self.core.start_probe_cycle().await;
            } else {
                warn!(
                    port = %self.core.port_name(),
                    reported = advanced.as_str(),
                    expected = pending.target.as_str(),
                    "Driver report contradicts in-flight toggle, awaiting confirmation"
                );
            }
        } else if advanced.is_definite() {
            self.core.mux_sm.advance(advanced);
            self.core.cancel_probe_cycle();
            self.evaluate(SwitchCause::HardwareStateMismatch).await;
        } else {
            self.core.mux_sm.advance(advanced);
            self.core.start_probe_cycle().await;
        }
        self.core.publish_health().await;
    }

    pub async fn handle_probe_mux_response(&mut self, label: MuxState) {
        let cfg = self.core.config().await;
        let Some(advanced) = self
            .core
            .mux_sm
            .post_event(label, cfg.mux_state_change_retry_count)
        else {
            return;
        };

        match advanced {
            MuxState::Unknown => {
                self.core.pending = None;
                self.core.mux_sm.advance(MuxState::Unknown);
            }
            MuxState::Error => {
                self.core.pending = None;
                self.core.mux_sm.advance(MuxState::Error);
            }
            definite => {
                // The probe resolved the hardware truth. Re-assert the
                // desired direction so orchagent converges on it even when
                // the probed state already matches.
                self.core.pending = None;
                self.core.cancel_probe_cycle();
                match self.desired_target() {
                    Some(target) => {
                        self.core
                            .issue_mux_toggle(target, SwitchCause::HardwareStateMismatch)
                            .await;
                    }
                    None => {
                        self.core.mux_sm.advance(definite);
                    }
                }
            }
        }
        self.core.publish_health().await;
    }

    pub async fn handle_link_state_notification(&mut self, label: LinkState) {
        let cfg = self.core.config().await;
        let Some(advanced) = self
            .core
            .link_sm
            .post_event(label, cfg.link_state_change_retry_count)
        else {
            return;
        };
        if advanced == self.core.link_sm.state() {
            return;
        }

        match advanced {
            LinkState::Up => {
                self.core.link_sm.advance(LinkState::Up);
                info!(port = %self.core.port_name(), "Link up, starting link prober");
                self.core.shutdown_or_restart_prober().await;
                self.evaluate(SwitchCause::LinkProberActive).await;
            }
            LinkState::Down => {
                self.core.link_sm.advance(LinkState::Down);
                if self.core.port_config.mode == Mode::Auto
                    && self.core.mux_sm.state() == MuxState::Active
                {
                    self.core
                        .issue_mux_toggle(MuxState::Standby, SwitchCause::LinkDown)
                        .await;
                }
            }
        }
        self.core.publish_health().await;
    }

    pub async fn handle_mux_config_notification(&mut self, mode: Mode) {
        info!(port = %self.core.port_name(), mode = mode.as_str(), "Mux config changed");
        self.core.port_config.mode = mode;
        match mode {
            Mode::Active | Mode::Standby | Mode::Auto => {
                self.evaluate(SwitchCause::ConfigMuxMode).await;
            }
            Mode::Manual | Mode::Detached => {}
        }
        self.core.publish_health().await;
    }

    fn desired_target(&self) -> Option<MuxState> {
        self.core.desired_mux_state()
    }

    async fn evaluate(&mut self, auto_cause: SwitchCause) {
        if self.core.reconciling {
            return;
        }
        match self.core.port_config.mode {
            Mode::Active => {
                if self.core.mux_sm.state() != MuxState::Active {
                    self.core
                        .issue_mux_toggle(MuxState::Active, SwitchCause::ConfigMuxMode)
                        .await;
                }
            }
            Mode::Standby => {
                if self.core.mux_sm.state() != MuxState::Standby {
                    self.core
                        .issue_mux_toggle(MuxState::Standby, SwitchCause::ConfigMuxMode)
                        .await;
                }
            }
            Mode::Auto => {
                if self.core.link_sm.state() != LinkState::Up {
                    return;
                }
                let desired = match self.core.prober_state {
                    LinkProberState::Active => Some(MuxState::Active),
                    LinkProberState::Unknown => Some(MuxState::Standby),
                    LinkProberState::Wait => None,
                };
                if let Some(target) = desired {
                    if self.core.mux_sm.state() != target {
                        self.core.issue_mux_toggle(target, auto_cause).await;
                    }
                }
            }
            Mode::Manual | Mode::Detached => {}
        }
    }
}
