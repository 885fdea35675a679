//! Composite coordinator: fuses prober, MUX and link observations into
//! toggle/probe/health decisions.
//!
//! The sub-machines observe; this module decides. Each port owns one
//! [`LinkManagerStateMachine`], a tagged variant over the two cable types
//! with a shared handler surface, dispatched statically.

mod active_active;
mod active_standby;

pub use active_active::ActiveActiveStateMachine;
pub use active_standby::ActiveStandbyStateMachine;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{DefaultRoute, Mode, MuxConfig, MuxPortConfig, PortCableType};
use crate::db_interface::DbInterface;
use crate::link_prober::{LinkProberControl, LinkProberVerdict};
use crate::state::{
    HysteresisFilter, LinkProberState, LinkState, LinkStateMachine, MuxState, MuxStateMachine,
    PeerProberState,
};

/// Snapshot of the per-port 3-tuple that drives all decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeState {
    pub link_prober: LinkProberState,
    pub mux: MuxState,
    pub link: LinkState,
}

/// Linkmgr health as published to STATE_DB for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLabel {
    Uninitialized,
    Unhealthy,
    Healthy,
}

impl HealthLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Uninitialized => "uninitialized",
            HealthLabel::Unhealthy => "unhealthy",
            HealthLabel::Healthy => "healthy",
        }
    }
}

/// Switchover timing markers posted to STATE_DB MUX_METRICS_TABLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metrics {
    SwitchingStart,
    SwitchingEnd,
}

impl Metrics {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metrics::SwitchingStart => "start",
            Metrics::SwitchingEnd => "end",
        }
    }
}

/// Prober outage markers posted to STATE_DB LINK_PROBE_STATS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProberMetrics {
    UnknownStart,
    UnknownEnd,
}

/// Why a toggle was requested; posted alongside the switchover record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCause {
    LinkProberActive,
    LinkProberUnknown,
    LinkDown,
    ConfigMuxMode,
    HardwareStateMismatch,
    PeerHeartbeatMissing,
}

impl SwitchCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchCause::LinkProberActive => "link_prober_active",
            SwitchCause::LinkProberUnknown => "link_prober_unknown",
            SwitchCause::LinkDown => "link_down",
            SwitchCause::ConfigMuxMode => "config_mux_mode",
            SwitchCause::HardwareStateMismatch => "hardware_state_mismatch",
            SwitchCause::PeerHeartbeatMissing => "peer_heartbeat_missing",
        }
    }
}

/// An in-flight hardware toggle awaiting a confirming driver report.
#[derive(Debug, Clone, Copy)]
pub struct PendingToggle {
    pub target: MuxState,
    pub generation: u64,
}

/// Timer needs surfaced by a handler; the owning port task arms them and
/// re-enters the machine with the matching expiry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    MuxWait { generation: u64, delay: Duration },
    ProbeRetry { generation: u64, delay: Duration },
    Suspend { delay: Duration },
}

/// State and helpers shared by both cable-type variants.
pub(crate) struct MachineCore {
    pub port_config: MuxPortConfig,
    pub mux_config: Arc<RwLock<MuxConfig>>,
    pub db: Arc<dyn DbInterface>,
    pub prober: Arc<dyn LinkProberControl>,

    pub prober_state: LinkProberState,
    pub prober_filter: HysteresisFilter<LinkProberState>,
    pub peer_prober_state: PeerProberState,
    pub peer_filter: HysteresisFilter<PeerProberState>,
    pub peer_mux_state: MuxState,
    pub peer_link_state: LinkState,
    pub mux_sm: MuxStateMachine,
    pub link_sm: LinkStateMachine,

    pub health: HealthLabel,
    pub default_route: DefaultRoute,
    pub pending: Option<PendingToggle>,
    pub toggle_generation: u64,
    pub probe_generation: u64,
    pub probe_attempts: u32,
    /// Probe retries exhausted without a definite report.
    pub degraded: bool,
    pub tx_suspended: bool,
    pub reconciling: bool,
    pub activated: bool,

    timer_requests: Vec<TimerRequest>,
}

impl MachineCore {
    pub fn new(
        port_config: MuxPortConfig,
        mux_config: Arc<RwLock<MuxConfig>>,
        db: Arc<dyn DbInterface>,
        prober: Arc<dyn LinkProberControl>,
    ) -> Self {
        Self {
            port_config,
            mux_config,
            db,
            prober,
            prober_state: LinkProberState::Wait,
            prober_filter: HysteresisFilter::new(),
            peer_prober_state: PeerProberState::PeerWait,
            peer_filter: HysteresisFilter::new(),
            peer_mux_state: MuxState::Wait,
            peer_link_state: LinkState::Down,
            mux_sm: MuxStateMachine::new(),
            link_sm: LinkStateMachine::new(),
            health: HealthLabel::Uninitialized,
            default_route: DefaultRoute::Na,
            pending: None,
            toggle_generation: 0,
            probe_generation: 0,
            probe_attempts: 0,
            degraded: false,
            tx_suspended: false,
            reconciling: false,
            activated: false,
            timer_requests: Vec::new(),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_config.port_name
    }

    pub fn composite(&self) -> CompositeState {
        CompositeState {
            link_prober: self.prober_state,
            mux: self.mux_sm.state(),
            link: self.link_sm.state(),
        }
    }

    pub async fn config(&self) -> MuxConfig {
        self.mux_config.read().await.clone()
    }

    pub fn request_timer(&mut self, request: TimerRequest) {
        self.timer_requests.push(request);
    }

    pub fn take_timer_requests(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.timer_requests)
    }

    /// Publishes the initial health label and begins evaluation.
    pub async fn activate(&mut self) {
        if self.activated {
            return;
        }
        self.activated = true;
        self.db
            .set_mux_linkmgr_state(self.port_name(), HealthLabel::Uninitialized)
            .await;
        info!(port = %self.port_name(), "Link manager state machine activated");
    }

    /// The MUX direction the policy currently wants, or None when neither
    /// the operator nor the prober has expressed one.
    pub fn desired_mux_state(&self) -> Option<MuxState> {
        match self.port_config.mode {
            Mode::Active => Some(MuxState::Active),
            Mode::Standby => Some(MuxState::Standby),
            Mode::Manual | Mode::Detached => None,
            Mode::Auto => match self.prober_state {
                LinkProberState::Active => Some(MuxState::Active),
                LinkProberState::Unknown => Some(MuxState::Standby),
                LinkProberState::Wait => None,
            },
        }
    }

    /// True when automatic remediation (toggles, probes) is allowed.
    pub fn remediation_enabled(&self) -> bool {
        self.activated
            && !self.reconciling
            && !matches!(self.port_config.mode, Mode::Manual | Mode::Detached)
    }

    /// Requests a hardware toggle toward `target`.
    ///
    /// Coalesces into an identical pending request; defers when a different
    /// target is already in flight (the confirming report, an
    /// unknown/error report, or the deadline releases it). The composite
    /// mux label optimistically shows the target until then.
    pub async fn issue_mux_toggle(&mut self, target: MuxState, cause: SwitchCause) {
        if !self.remediation_enabled() {
            return;
        }
        if let Some(pending) = self.pending {
            if pending.target == target {
                debug!(port = %self.port_name(), target = target.as_str(), "Toggle already in flight");
            } else {
                debug!(
                    port = %self.port_name(),
                    in_flight = pending.target.as_str(),
                    wanted = target.as_str(),
                    "Deferring toggle until the in-flight request resolves"
                );
            }
            return;
        }

        let cfg = self.config().await;
        self.toggle_generation += 1;
        let generation = self.toggle_generation;

        info!(
            port = %self.port_name(),
            target = target.as_str(),
            cause = cause.as_str(),
            "Requesting mux toggle"
        );

        self.db.post_switch_cause(self.port_name(), cause).await;
        if cfg.enable_switchover_measurement {
            self.db
                .post_metrics_event(self.port_name(), Metrics::SwitchingStart, target)
                .await;
        }
        self.db.set_mux_state(self.port_name(), target).await;

        self.mux_sm.set_state(target);
        self.pending = Some(PendingToggle { target, generation });
        self.request_timer(TimerRequest::MuxWait {
            generation,
            delay: cfg.mux_wait_timeout(),
        });
    }

    /// Clears the pending toggle after a confirming report.
    pub async fn confirm_pending(&mut self, label: MuxState) {
        self.pending = None;
        self.mux_sm.advance(label);
        self.cancel_probe_cycle();

        let cfg = self.config().await;
        if cfg.enable_switchover_measurement {
            self.db
                .post_metrics_event(self.port_name(), Metrics::SwitchingEnd, label)
                .await;
        }
        debug!(port = %self.port_name(), state = label.as_str(), "Mux toggle confirmed");
    }

    /// Issues an i2c probe and arms the retry cycle.
    pub async fn start_probe_cycle(&mut self) {
        if !self.remediation_enabled() {
            return;
        }
        let cfg = self.config().await;
        self.probe_generation += 1;
        self.probe_attempts = 0;
        self.db.probe_mux_state(self.port_name()).await;
        self.request_timer(TimerRequest::ProbeRetry {
            generation: self.probe_generation,
            delay: cfg.probe_backoff(0),
        });
    }

    /// Re-probes after a retry deadline; gives up into degraded health once
    /// the retry budget is spent.
    pub async fn handle_probe_retry_timeout(&mut self, generation: u64) {
        if generation != self.probe_generation {
            return;
        }
        let cfg = self.config().await;
        self.probe_attempts += 1;
        if self.probe_attempts <= cfg.mux_state_change_retry_count {
            debug!(
                port = %self.port_name(),
                attempt = self.probe_attempts,
                "Probe unanswered, re-probing"
            );
            self.db.probe_mux_state(self.port_name()).await;
            self.request_timer(TimerRequest::ProbeRetry {
                generation,
                delay: cfg.probe_backoff(self.probe_attempts),
            });
        } else {
            info!(
                port = %self.port_name(),
                "Probe retries exhausted, marking unhealthy and continuing to observe"
            );
            self.degraded = true;
            self.publish_health().await;
        }
    }

    /// Any definite driver/probe report ends the probe cycle.
    pub fn cancel_probe_cycle(&mut self) {
        self.probe_generation += 1;
        self.probe_attempts = 0;
        self.degraded = false;
    }

    /// Confirmation deadline: re-probe, keep the pending target.
    pub async fn handle_mux_wait_timeout(&mut self, generation: u64) {
        let Some(pending) = self.pending else {
            return;
        };
        if pending.generation != generation {
            return;
        }
        info!(
            port = %self.port_name(),
            target = pending.target.as_str(),
            "Mux toggle unconfirmed within deadline, probing hardware"
        );
        self.start_probe_cycle().await;
    }

    fn compute_health(&self, cfg: &MuxConfig) -> HealthLabel {
        let route_ok = !cfg.enable_default_route_feature || self.default_route == DefaultRoute::Ok;
        if !self.degraded
            && self.prober_state == LinkProberState::Active
            && self.mux_sm.state() == MuxState::Active
            && self.link_sm.state() == LinkState::Up
            && route_ok
        {
            HealthLabel::Healthy
        } else {
            HealthLabel::Unhealthy
        }
    }

    /// Re-evaluates health and publishes it on change.
    pub async fn publish_health(&mut self) {
        if !self.activated {
            return;
        }
        let cfg = self.config().await;
        let label = self.compute_health(&cfg);
        if label != self.health {
            self.health = label;
            self.db
                .set_mux_linkmgr_state(self.port_name(), label)
                .await;
        }
    }

    /// Suspends prober transmission for the configured window.
    pub async fn suspend_prober(&mut self) {
        let cfg = self.config().await;
        self.tx_suspended = true;
        self.prober.suspend_tx(cfg.suspend_timeout()).await;
        self.request_timer(TimerRequest::Suspend {
            delay: cfg.suspend_timeout(),
        });
    }

    /// Suspension window elapsed: restart transmission unless a later
    /// decision already did, or the default-route gate holds it down.
    pub async fn handle_suspend_timer_expiry(&mut self) {
        if !self.tx_suspended {
            return;
        }
        self.tx_suspended = false;
        let cfg = self.config().await;
        if cfg.enable_default_route_feature && self.default_route == DefaultRoute::Na {
            return;
        }
        self.prober.restart_tx().await;
    }

    /// Applies the default-route gate to prober transmission.
    pub async fn shutdown_or_restart_prober(&mut self) {
        let cfg = self.config().await;
        if cfg.enable_default_route_feature && self.default_route == DefaultRoute::Na {
            self.prober.shutdown_tx().await;
        } else {
            self.prober.restart_tx().await;
            self.tx_suspended = false;
        }
    }

    pub async fn handle_default_route_state(&mut self, route: DefaultRoute) {
        self.default_route = route;
        self.shutdown_or_restart_prober().await;
        self.publish_health().await;
    }

    pub async fn handle_reset_loss_count(&mut self) {
        self.prober.reset_icmp_packet_counts().await;
    }

    pub async fn handle_pck_loss_ratio(&mut self, unknown: u64, expected: u64) {
        self.db
            .post_pck_loss_ratio(self.port_name(), unknown, expected)
            .await;
    }

    /// Enters the warm-restart reconciliation window: publish only, adopt
    /// the hardware state once read back.
    pub async fn start_reconciliation(&mut self) {
        self.reconciling = true;
        self.db.get_mux_state(self.port_name()).await;
    }

    /// Adopts the state read back during reconciliation. Returns true when
    /// this completed the port's reconciliation.
    pub async fn handle_get_mux_state_response(&mut self, label: MuxState) -> bool {
        if !self.reconciling {
            return false;
        }
        info!(
            port = %self.port_name(),
            state = label.as_str(),
            "Adopting hardware state after warm restart"
        );
        self.mux_sm.set_state(label);
        self.reconciling = false;
        self.publish_health().await;
        true
    }

    /// Reconciliation window expired process-wide.
    pub fn handle_reconciliation_timeout(&mut self) {
        self.reconciling = false;
    }

    pub fn handle_peer_link_state(&mut self, label: LinkState) {
        self.peer_link_state = label;
    }
}

/// The per-port composite coordinator, one variant per cable type.
pub enum LinkManagerStateMachine {
    ActiveStandby(ActiveStandbyStateMachine),
    ActiveActive(ActiveActiveStateMachine),
}

impl LinkManagerStateMachine {
    pub fn new(
        port_config: MuxPortConfig,
        mux_config: Arc<RwLock<MuxConfig>>,
        db: Arc<dyn DbInterface>,
        prober: Arc<dyn LinkProberControl>,
    ) -> Self {
        let cable_type = port_config.cable_type;
        let core = MachineCore::new(port_config, mux_config, db, prober);
        match cable_type {
            PortCableType::ActiveStandby => {
                LinkManagerStateMachine::ActiveStandby(ActiveStandbyStateMachine::new(core))
            }
            PortCableType::ActiveActive => {
                LinkManagerStateMachine::ActiveActive(ActiveActiveStateMachine::new(core))
            }
        }
    }

    fn core(&self) -> &MachineCore {
        match self {
            LinkManagerStateMachine::ActiveStandby(sm) => &sm.core,
            LinkManagerStateMachine::ActiveActive(sm) => &sm.core,
        }
    }

    fn core_mut(&mut self) -> &mut MachineCore {
        match self {
            LinkManagerStateMachine::ActiveStandby(sm) => &mut sm.core,
            LinkManagerStateMachine::ActiveActive(sm) => &mut sm.core,
        }
    }

    pub async fn activate(&mut self) {
        self.core_mut().activate().await;
    }

    pub fn composite_state(&self) -> CompositeState {
        self.core().composite()
    }

    pub fn health(&self) -> HealthLabel {
        self.core().health
    }

    pub fn mode(&self) -> Mode {
        self.core().port_config.mode
    }

    pub fn peer_prober_state(&self) -> PeerProberState {
        self.core().peer_prober_state
    }

    pub fn peer_mux_state(&self) -> MuxState {
        self.core().peer_mux_state
    }

    pub fn peer_link_state(&self) -> LinkState {
        self.core().peer_link_state
    }

    pub fn take_timer_requests(&mut self) -> Vec<TimerRequest> {
        self.core_mut().take_timer_requests()
    }

    pub async fn handle_link_prober_verdict(&mut self, verdict: LinkProberVerdict) {
        match self {
            LinkManagerStateMachine::ActiveStandby(sm) => {
                sm.handle_link_prober_verdict(verdict).await
            }
            LinkManagerStateMachine::ActiveActive(sm) => {
                sm.handle_link_prober_verdict(verdict).await
            }
        }
    }

    pub async fn handle_mux_state_notification(&mut self, label: MuxState) {
        match self {
            LinkManagerStateMachine::ActiveStandby(sm) => {
                sm.handle_mux_state_notification(label).await
            }
            LinkManagerStateMachine::ActiveActive(sm) => {
                sm.handle_mux_state_notification(label).await
            }
        }
    }

    pub async fn handle_probe_mux_response(&mut self, label: MuxState) {
        match self {
            LinkManagerStateMachine::ActiveStandby(sm) => {
                sm.handle_probe_mux_response(label).await
            }
            LinkManagerStateMachine::ActiveActive(sm) => sm.handle_probe_mux_response(label).await,
        }
    }

    pub async fn handle_link_state_notification(&mut self, label: LinkState) {
        match self {
            LinkManagerStateMachine::ActiveStandby(sm) => {
                sm.handle_link_state_notification(label).await
            }
            LinkManagerStateMachine::ActiveActive(sm) => {
                sm.handle_link_state_notification(label).await
            }
        }
    }

    pub async fn handle_mux_config_notification(&mut self, mode: Mode) {
        match self {
            LinkManagerStateMachine::ActiveStandby(sm) => {
                sm.handle_mux_config_notification(mode).await
            }
            LinkManagerStateMachine::ActiveActive(sm) => {
                sm.handle_mux_config_notification(mode).await
            }
        }
    }

    pub async fn handle_peer_mux_state_notification(&mut self, label: MuxState) {
        if let LinkManagerStateMachine::ActiveActive(sm) = self {
            sm.handle_peer_mux_state_notification(label).await;
        }
    }

    pub fn handle_peer_link_state_notification(&mut self, label: LinkState) {
        self.core_mut().handle_peer_link_state(label);
    }

    pub async fn handle_default_route_state(&mut self, route: DefaultRoute) {
        self.core_mut().handle_default_route_state(route).await;
    }

    pub async fn handle_suspend_timer_expiry(&mut self) {
        self.core_mut().handle_suspend_timer_expiry().await;
    }

    pub async fn handle_mux_wait_timeout(&mut self, generation: u64) {
        self.core_mut().handle_mux_wait_timeout(generation).await;
    }

    pub async fn handle_probe_retry_timeout(&mut self, generation: u64) {
        self.core_mut().handle_probe_retry_timeout(generation).await;
    }

    pub async fn handle_reset_loss_count(&mut self) {
        self.core_mut().handle_reset_loss_count().await;
    }

    pub async fn handle_pck_loss_ratio(&mut self, unknown: u64, expected: u64) {
        self.core_mut().handle_pck_loss_ratio(unknown, expected).await;
    }

    pub async fn start_reconciliation(&mut self) {
        self.core_mut().start_reconciliation().await;
    }

    pub async fn handle_get_mux_state_response(&mut self, label: MuxState) -> bool {
        self.core_mut().handle_get_mux_state_response(label).await
    }

    pub fn handle_reconciliation_timeout(&mut self) {
        self.core_mut().handle_reconciliation_timeout();
    }
}
