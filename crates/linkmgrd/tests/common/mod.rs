//! Test doubles and a driving fixture for the composite state machines.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use sonic_linkmgrd::config::{DefaultRoute, Mode, MuxConfig, MuxPortConfig, PortCableType};
use sonic_linkmgrd::db_interface::DbInterface;
use sonic_linkmgrd::link_manager::{
    CompositeState, HealthLabel, LinkManagerStateMachine, LinkProberMetrics, Metrics, SwitchCause,
    TimerRequest,
};
use sonic_linkmgrd::link_prober::{LinkProberControl, LinkProberVerdict};
use sonic_linkmgrd::state::{LinkProberState, LinkState, MuxState, PeerProberState};

/// Everything the fake fabric adapter records.
#[derive(Debug, Default, Clone)]
pub struct FakeDbState {
    pub set_mux_state_invoke_count: u32,
    pub last_set_mux_state: Option<MuxState>,
    pub set_peer_mux_state_invoke_count: u32,
    pub last_set_peer_mux_state: Option<MuxState>,
    pub probe_mux_state_invoke_count: u32,
    pub get_mux_state_invoke_count: u32,
    pub last_mux_linkmgr_state: Option<HealthLabel>,
    pub switch_causes: Vec<SwitchCause>,
    pub metrics_events: Vec<(Metrics, MuxState)>,
    pub link_prober_metrics: Vec<LinkProberMetrics>,
    pub pck_loss_posts: Vec<(u64, u64)>,
    pub warm_restart_reconciled: bool,
}

/// Recording [`DbInterface`] double.
#[derive(Default)]
pub struct FakeDbInterface {
    state: Mutex<FakeDbState>,
}

impl FakeDbInterface {
    pub fn snapshot(&self) -> FakeDbState {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl DbInterface for FakeDbInterface {
    async fn set_mux_state(&self, _port: &str, label: MuxState) {
        let mut state = self.state.lock().unwrap();
        state.set_mux_state_invoke_count += 1;
        state.last_set_mux_state = Some(label);
    }

    async fn set_peer_mux_state(&self, _port: &str, label: MuxState) {
        let mut state = self.state.lock().unwrap();
        state.set_peer_mux_state_invoke_count += 1;
        state.last_set_peer_mux_state = Some(label);
    }

    async fn get_mux_state(&self, _port: &str) {
        self.state.lock().unwrap().get_mux_state_invoke_count += 1;
    }

    async fn probe_mux_state(&self, _port: &str) {
        self.state.lock().unwrap().probe_mux_state_invoke_count += 1;
    }

    async fn set_mux_linkmgr_state(&self, _port: &str, label: HealthLabel) {
        self.state.lock().unwrap().last_mux_linkmgr_state = Some(label);
    }

    async fn post_metrics_event(&self, _port: &str, metrics: Metrics, label: MuxState) {
        self.state.lock().unwrap().metrics_events.push((metrics, label));
    }

    async fn post_switch_cause(&self, _port: &str, cause: SwitchCause) {
        self.state.lock().unwrap().switch_causes.push(cause);
    }

    async fn post_link_prober_metrics(&self, _port: &str, metrics: LinkProberMetrics) {
        self.state.lock().unwrap().link_prober_metrics.push(metrics);
    }

    async fn post_pck_loss_ratio(&self, _port: &str, unknown: u64, expected: u64) {
        self.state.lock().unwrap().pck_loss_posts.push((unknown, expected));
    }

    async fn set_warm_restart_state_reconciled(&self) {
        self.state.lock().unwrap().warm_restart_reconciled = true;
    }
}

/// Recording [`LinkProberControl`] double.
#[derive(Default)]
pub struct FakeLinkProber {
    pub counts: Mutex<FakeProberCounts>,
}

#[derive(Debug, Default, Clone)]
pub struct FakeProberCounts {
    pub suspend_tx_call_count: u32,
    pub restart_tx_call_count: u32,
    pub shutdown_tx_call_count: u32,
    pub reset_counts_call_count: u32,
}

impl FakeLinkProber {
    pub fn snapshot(&self) -> FakeProberCounts {
        self.counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkProberControl for FakeLinkProber {
    async fn suspend_tx(&self, _duration: Duration) {
        self.counts.lock().unwrap().suspend_tx_call_count += 1;
    }

    async fn restart_tx(&self) {
        self.counts.lock().unwrap().restart_tx_call_count += 1;
    }

    async fn shutdown_tx(&self) {
        self.counts.lock().unwrap().shutdown_tx_call_count += 1;
    }

    async fn reset_icmp_packet_counts(&self) {
        self.counts.lock().unwrap().reset_counts_call_count += 1;
    }
}

/// Drives a composite state machine the way the dispatcher would,
/// repeating raw signals often enough to clear each hysteresis window.
pub struct Fixture {
    pub db: Arc<FakeDbInterface>,
    pub prober: Arc<FakeLinkProber>,
    pub mux_config: Arc<RwLock<MuxConfig>>,
    pub sm: LinkManagerStateMachine,
    pub timers: Vec<TimerRequest>,
    positive_count: u32,
    negative_count: u32,
    mux_count: u32,
    link_count: u32,
}

impl Fixture {
    pub fn new(cable_type: PortCableType) -> Self {
        Self::with_config(cable_type, MuxConfig::default())
    }

    pub fn with_config(cable_type: PortCableType, config: MuxConfig) -> Self {
        let positive_count = config.positive_state_change_retry_count;
        let negative_count = config.negative_state_change_retry_count;
        let mux_count = config.mux_state_change_retry_count;
        let link_count = config.link_state_change_retry_count;

        let db = Arc::new(FakeDbInterface::default());
        let prober = Arc::new(FakeLinkProber::default());
        let mux_config = Arc::new(RwLock::new(config));
        let port_config = MuxPortConfig::new("Ethernet0", 0).with_cable_type(cable_type);
        let sm = LinkManagerStateMachine::new(
            port_config,
            Arc::clone(&mux_config),
            db.clone() as Arc<dyn DbInterface>,
            prober.clone() as Arc<dyn LinkProberControl>,
        );

        Self {
            db,
            prober,
            mux_config,
            sm,
            timers: Vec::new(),
            positive_count,
            negative_count,
            mux_count,
            link_count,
        }
    }

    fn collect_timers(&mut self) {
        self.timers.extend(self.sm.take_timer_requests());
    }

    pub async fn activate(&mut self) {
        self.sm.activate().await;
        self.collect_timers();
    }

    pub async fn post_link_prober_event(&mut self, state: LinkProberState) {
        let (verdict, count) = match state {
            LinkProberState::Active => (LinkProberVerdict::SelfActive, self.positive_count),
            LinkProberState::Unknown => (LinkProberVerdict::SelfUnknown, self.negative_count),
            LinkProberState::Wait => return,
        };
        for _ in 0..count {
            self.sm.handle_link_prober_verdict(verdict).await;
        }
        self.collect_timers();
    }

    pub async fn post_peer_link_prober_event(&mut self, state: PeerProberState) {
        let (verdict, count) = match state {
            PeerProberState::PeerActive => (LinkProberVerdict::PeerActive, self.positive_count),
            PeerProberState::PeerUnknown => (LinkProberVerdict::PeerUnknown, self.negative_count),
            PeerProberState::PeerWait => (LinkProberVerdict::PeerWait, 1),
        };
        for _ in 0..count {
            self.sm.handle_link_prober_verdict(verdict).await;
        }
        self.collect_timers();
    }

    pub async fn post_link_event(&mut self, state: LinkState) {
        for _ in 0..self.link_count {
            self.sm.handle_link_state_notification(state).await;
        }
        self.collect_timers();
    }

    pub async fn handle_mux_state(&mut self, label: MuxState) {
        for _ in 0..self.mux_count {
            self.sm.handle_mux_state_notification(label).await;
        }
        self.collect_timers();
    }

    pub async fn handle_probe_mux_state(&mut self, label: MuxState) {
        for _ in 0..self.mux_count {
            self.sm.handle_probe_mux_response(label).await;
        }
        self.collect_timers();
    }

    pub async fn handle_peer_mux_state(&mut self, label: MuxState) {
        self.sm.handle_peer_mux_state_notification(label).await;
        self.collect_timers();
    }

    pub async fn handle_mux_config(&mut self, mode: Mode) {
        self.sm.handle_mux_config_notification(mode).await;
        self.collect_timers();
    }

    pub async fn post_default_route_event(&mut self, route: DefaultRoute) {
        self.sm.handle_default_route_state(route).await;
        self.collect_timers();
    }

    pub async fn fire_mux_wait_timeout(&mut self) {
        if let Some(generation) = self.last_mux_wait_generation() {
            self.sm.handle_mux_wait_timeout(generation).await;
            self.collect_timers();
        }
    }

    pub async fn fire_probe_retry_timeout(&mut self) {
        if let Some(generation) = self.last_probe_retry_generation() {
            self.sm.handle_probe_retry_timeout(generation).await;
            self.collect_timers();
        }
    }

    pub fn last_mux_wait_generation(&self) -> Option<u64> {
        self.timers.iter().rev().find_map(|t| match t {
            TimerRequest::MuxWait { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    pub fn last_probe_retry_generation(&self) -> Option<u64> {
        self.timers.iter().rev().find_map(|t| match t {
            TimerRequest::ProbeRetry { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    pub fn composite(&self) -> CompositeState {
        self.sm.composite_state()
    }

    /// Boots the machine into a confirmed `(Active, Active, Up)`.
    pub async fn set_mux_active(&mut self) {
        self.activate().await;
        assert_composite(self, LinkProberState::Wait, MuxState::Wait, LinkState::Down);

        self.post_link_event(LinkState::Up).await;
        assert_composite(self, LinkProberState::Wait, MuxState::Wait, LinkState::Up);

        self.post_link_prober_event(LinkProberState::Active).await;
        assert_composite(self, LinkProberState::Active, MuxState::Active, LinkState::Up);
        let db = self.db.snapshot();
        assert_eq!(db.set_mux_state_invoke_count, 1);
        assert_eq!(db.last_set_mux_state, Some(MuxState::Active));

        self.handle_mux_state(MuxState::Active).await;
        assert_composite(self, LinkProberState::Active, MuxState::Active, LinkState::Up);
    }

    /// Boots the machine into a confirmed `(Unknown, Standby, Up)`.
    pub async fn set_mux_standby(&mut self) {
        self.activate().await;
        assert_composite(self, LinkProberState::Wait, MuxState::Wait, LinkState::Down);

        self.post_link_event(LinkState::Up).await;
        assert_composite(self, LinkProberState::Wait, MuxState::Wait, LinkState::Up);

        self.post_link_prober_event(LinkProberState::Unknown).await;
        assert_composite(
            self,
            LinkProberState::Unknown,
            MuxState::Standby,
            LinkState::Up,
        );
        let db = self.db.snapshot();
        assert_eq!(db.set_mux_state_invoke_count, 1);
        assert_eq!(db.last_set_mux_state, Some(MuxState::Standby));

        self.handle_mux_state(MuxState::Standby).await;
        assert_composite(
            self,
            LinkProberState::Unknown,
            MuxState::Standby,
            LinkState::Up,
        );
    }
}

/// Asserts the composite `(prober, mux, link)` tuple.
pub fn assert_composite(
    fixture: &Fixture,
    link_prober: LinkProberState,
    mux: MuxState,
    link: LinkState,
) {
    let composite = fixture.composite();
    assert_eq!(composite.link_prober, link_prober, "prober label mismatch");
    assert_eq!(composite.mux, mux, "mux label mismatch");
    assert_eq!(composite.link, link, "link label mismatch");
}

/// Asserts the peer `(prober, mux)` view.
pub fn assert_peer_state(fixture: &Fixture, prober: PeerProberState, mux: MuxState) {
    assert_eq!(fixture.sm.peer_prober_state(), prober, "peer prober mismatch");
    assert_eq!(fixture.sm.peer_mux_state(), mux, "peer mux mismatch");
}
