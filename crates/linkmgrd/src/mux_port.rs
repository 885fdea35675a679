//! Per-port supervisor.
//!
//! Each MUX port runs one task draining a dedicated event channel, so every
//! state-machine callback executes mutually exclusively with respect to its
//! own port. Fabric strings are parsed here; unparsable values are logged
//! and dropped without disturbing the machine.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{DefaultRoute, Mode, MuxConfig, MuxPortConfig};
use crate::db_interface::DbInterface;
use crate::link_manager::{LinkManagerStateMachine, TimerRequest};
use crate::link_prober::{LinkProberControl, LinkProberVerdict};
use crate::mux_manager::ManagerEvent;
use crate::state::{LinkState, MuxState};

/// Events serialized onto a port's domain.
#[derive(Debug, Clone)]
pub enum PortEvent {
    LinkProberVerdict(LinkProberVerdict),
    MuxStateNotification(String),
    ProbeMuxResponse(String),
    GetMuxStateResponse(String),
    LinkStateNotification(String),
    PeerLinkStateNotification(String),
    PeerMuxStateNotification(String),
    MuxConfigChange(Mode),
    DefaultRouteState(DefaultRoute),
    ResetLossCount,
    PckLossRatio { unknown: u64, expected: u64 },
    SuspendTimerExpiry,
    MuxWaitTimeout(u64),
    ProbeRetryTimeout(u64),
    StartReconciliation,
    ReconciliationTimeout,
    Shutdown,
}

/// One MUX port: composite state machine plus its serialization domain.
pub struct MuxPort {
    port_name: String,
    state_machine: LinkManagerStateMachine,
    event_tx: mpsc::UnboundedSender<PortEvent>,
    manager_tx: mpsc::UnboundedSender<ManagerEvent>,
}

impl MuxPort {
    /// Spawns the port task; the returned sender is the only way in.
    pub fn spawn(
        port_config: MuxPortConfig,
        mux_config: Arc<tokio::sync::RwLock<MuxConfig>>,
        db: Arc<dyn DbInterface>,
        prober: Arc<dyn LinkProberControl>,
        manager_tx: mpsc::UnboundedSender<ManagerEvent>,
    ) -> (mpsc::UnboundedSender<PortEvent>, JoinHandle<()>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let port = MuxPort {
            port_name: port_config.port_name.clone(),
            state_machine: LinkManagerStateMachine::new(port_config, mux_config, db, prober),
            event_tx: event_tx.clone(),
            manager_tx,
        };
        let join = tokio::spawn(port.run(event_rx));
        (event_tx, join)
    }

    async fn run(mut self, mut event_rx: mpsc::UnboundedReceiver<PortEvent>) {
        self.state_machine.activate().await;
        self.arm_timers();

        while let Some(event) = event_rx.recv().await {
            let stop = matches!(event, PortEvent::Shutdown);
            self.dispatch(event).await;
            self.arm_timers();
            if stop {
                break;
            }
        }
        debug!(port = %self.port_name, "Port supervisor exiting");
    }

    async fn dispatch(&mut self, event: PortEvent) {
        match event {
            PortEvent::LinkProberVerdict(verdict) => {
                self.state_machine.handle_link_prober_verdict(verdict).await;
            }
            PortEvent::MuxStateNotification(state) => {
                if let Some(label) = self.parse_mux_state(&state) {
                    self.state_machine.handle_mux_state_notification(label).await;
                }
            }
            PortEvent::ProbeMuxResponse(state) => {
                if let Some(label) = self.parse_mux_state(&state) {
                    self.state_machine.handle_probe_mux_response(label).await;
                }
            }
            PortEvent::GetMuxStateResponse(state) => {
                if let Some(label) = self.parse_mux_state(&state) {
                    let reconciled = self
                        .state_machine
                        .handle_get_mux_state_response(label)
                        .await;
                    if reconciled {
                        let _ = self
                            .manager_tx
                            .send(ManagerEvent::PortReconciled(self.port_name.clone()));
                    }
                }
            }
            PortEvent::LinkStateNotification(state) => {
                match state.parse::<LinkState>() {
                    Ok(label) => {
                        self.state_machine
                            .handle_link_state_notification(label)
                            .await;
                    }
                    Err(e) => warn!(port = %self.port_name, error = %e, "Dropping link state"),
                }
            }
            PortEvent::PeerLinkStateNotification(state) => match state.parse::<LinkState>() {
                Ok(label) => self.state_machine.handle_peer_link_state_notification(label),
                Err(e) => warn!(port = %self.port_name, error = %e, "Dropping peer link state"),
            },
            PortEvent::PeerMuxStateNotification(state) => {
                if let Some(label) = self.parse_mux_state(&state) {
                    self.state_machine
                        .handle_peer_mux_state_notification(label)
                        .await;
                }
            }
            PortEvent::MuxConfigChange(mode) => {
                self.state_machine.handle_mux_config_notification(mode).await;
            }
            PortEvent::DefaultRouteState(route) => {
                self.state_machine.handle_default_route_state(route).await;
            }
            PortEvent::ResetLossCount => {
                self.state_machine.handle_reset_loss_count().await;
            }
            PortEvent::PckLossRatio { unknown, expected } => {
                self.state_machine
                    .handle_pck_loss_ratio(unknown, expected)
                    .await;
            }
            PortEvent::SuspendTimerExpiry => {
                self.state_machine.handle_suspend_timer_expiry().await;
            }
            PortEvent::MuxWaitTimeout(generation) => {
                self.state_machine.handle_mux_wait_timeout(generation).await;
            }
            PortEvent::ProbeRetryTimeout(generation) => {
                self.state_machine
                    .handle_probe_retry_timeout(generation)
                    .await;
            }
            PortEvent::StartReconciliation => {
                self.state_machine.start_reconciliation().await;
            }
            PortEvent::ReconciliationTimeout => {
                self.state_machine.handle_reconciliation_timeout();
            }
            PortEvent::Shutdown => {}
        }
    }

    fn parse_mux_state(&self, state: &str) -> Option<MuxState> {
        match state.parse::<MuxState>() {
            Ok(label) => Some(label),
            Err(e) => {
                warn!(port = %self.port_name, error = %e, "Dropping mux state");
                None
            }
        }
    }

    /// Arms the timers the last handler asked for. Expiries re-enter the
    /// port's domain as events; generation counters drop stale ones.
    fn arm_timers(&mut self) {
        for request in self.state_machine.take_timer_requests() {
            let tx = self.event_tx.clone();
            match request {
                TimerRequest::MuxWait { generation, delay } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(PortEvent::MuxWaitTimeout(generation));
                    });
                }
                TimerRequest::ProbeRetry { generation, delay } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(PortEvent::ProbeRetryTimeout(generation));
                    });
                }
                TimerRequest::Suspend { delay } => {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(PortEvent::SuspendTimerExpiry);
                    });
                }
            }
        }
    }
}
