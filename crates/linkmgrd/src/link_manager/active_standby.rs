//! Active-standby transition policy.
//!
//! Exactly one ToR forwards at a time. The local prober verdict is the
//! primary signal: hearing our own heartbeats means we should own the
//! active side, losing them means we should yield it.

use tracing::{info, warn};

use crate::config::Mode;
use crate::link_prober::LinkProberVerdict;
use crate::state::{LinkProberState, LinkState, MuxState, PeerProberState};

use super::{LinkProberMetrics, MachineCore, SwitchCause};

pub struct ActiveStandbyStateMachine {
    pub(crate) core: MachineCore,
}

impl ActiveStandbyStateMachine {
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
                if let Some(state) = self.core.peer_filter.feed(
                    PeerProberState::PeerActive,
                    cfg.positive_state_change_retry_count,
                ) {
                    self.core.peer_prober_state = state;
                }
            }
            LinkProberVerdict::PeerUnknown => {
                if let Some(state) = self.core.peer_filter.feed(
                    PeerProberState::PeerUnknown,
                    cfg.negative_state_change_retry_count,
                ) {
                    self.core.peer_prober_state = state;
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

    /// Our heartbeats are answered again: claim the active side.
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

    /// Heartbeats lost: yield to the peer and quiet the prober while the
    /// hardware switches over.
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
                // The in-flight request landed the hardware nowhere
                // definite; re-read it over i2c.
                self.core.pending = None;
                self.core.mux_sm.advance(advanced);
                self.core.start_probe_cycle().await;
            } else {
                // Stale driver report racing the in-flight toggle; the
                // deadline path resolves the truth.
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
                // Driver still cannot read the mux; the retry cycle keeps
                // probing until its budget runs out.
                self.core.pending = None;
                self.core.mux_sm.advance(MuxState::Unknown);
            }
            MuxState::Error => {
                self.core.pending = None;
                self.core.mux_sm.advance(MuxState::Error);
            }
            definite => {
                let confirmed = self
                    .core
                    .pending
                    .map(|p| p.target == definite)
                    .unwrap_or(false);
                if confirmed {
                    self.core.confirm_pending(definite).await;
                } else {
                    self.core.pending = None;
                    self.core.mux_sm.advance(definite);
                    self.core.cancel_probe_cycle();
                }
                self.evaluate(SwitchCause::HardwareStateMismatch).await;
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
                // Fail-safe yield: a dead link must not hold the active side.
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

    /// Re-checks the composite against the desired direction and issues a
    /// toggle when they disagree. `auto_cause` labels prober-driven
    /// decisions; operator pins always record `config_mux_mode`.
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
