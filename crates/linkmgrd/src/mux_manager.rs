//! Process-wide MUX manager.
//!
//! Owns the port map, fans fabric notifications out onto per-port domains,
//! aggregates default-route state, and runs the warm-restart reconciler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sonic_linkmgr_common::LogVerbosityHandle;

use crate::config::{
    server_id_from_port_name, DefaultRoute, Mode, MuxConfig, MuxPortConfig, PortCableType,
};
use crate::db_interface::{DbInterface, DbNotification, PortSeed};
use crate::link_prober::{ChannelLinkProber, LinkProberControl};
use crate::mux_port::{MuxPort, PortEvent};

/// Events ports raise back to the manager.
#[derive(Debug)]
pub enum ManagerEvent {
    PortReconciled(String),
}

struct PortHandle {
    event_tx: mpsc::UnboundedSender<PortEvent>,
    join: JoinHandle<()>,
}

type ProberFactory = Box<dyn Fn(&str) -> Arc<dyn LinkProberControl> + Send + Sync>;

pub struct MuxManager {
    mux_config: Arc<RwLock<MuxConfig>>,
    db: Arc<dyn DbInterface>,
    ports: HashMap<String, PortHandle>,
    internal_tx: mpsc::UnboundedSender<ManagerEvent>,
    prober_factory: ProberFactory,
    log_handle: Option<LogVerbosityHandle>,

    ipv4_default_route: DefaultRoute,
    ipv6_default_route: DefaultRoute,

    reconciliation_pending: usize,
    reconciliation_active: bool,
    reconciliation_deadline: Option<tokio::time::Instant>,
}

impl MuxManager {
    pub fn new(
        mux_config: Arc<RwLock<MuxConfig>>,
        db: Arc<dyn DbInterface>,
        log_handle: Option<LogVerbosityHandle>,
    ) -> (Self, mpsc::UnboundedReceiver<ManagerEvent>) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let manager = Self {
            mux_config,
            db,
            ports: HashMap::new(),
            internal_tx,
            prober_factory: Box::new(default_prober_factory),
            log_handle,
            ipv4_default_route: DefaultRoute::Na,
            ipv6_default_route: DefaultRoute::Na,
            reconciliation_pending: 0,
            reconciliation_active: false,
            reconciliation_deadline: None,
        };
        (manager, internal_rx)
    }

    /// Overrides how port probers are constructed (test seam).
    pub fn with_prober_factory(mut self, factory: ProberFactory) -> Self {
        self.prober_factory = factory;
        self
    }

    /// Creates supervisors for the ports configured at startup.
    pub fn seed_ports(&mut self, seeds: Vec<PortSeed>) {
        for seed in seeds {
            info!(
                port = %seed.port,
                server_ipv4 = ?seed.server_ipv4,
                cable_type = ?seed.cable_type,
                "Discovered mux port"
            );
            self.get_or_create_port(&seed.port, Some(seed.cable_type), seed.server_ipv4);
        }
    }

    /// Starts the warm-restart reconciliation window over all known ports.
    pub async fn start_warm_restart_reconciliation(&mut self, platform_timer_sec: u32) {
        let timeout = if platform_timer_sec == 0 {
            self.mux_config.read().await.reconciliation_timeout()
        } else {
            Duration::from_secs(platform_timer_sec as u64)
        };

        info!(?timeout, "Warm restart context detected, starting reconciliation");
        self.reconciliation_active = true;
        self.reconciliation_deadline = Some(tokio::time::Instant::now() + timeout);
        self.reconciliation_pending = self.ports.len();

        for handle in self.ports.values() {
            let _ = handle.event_tx.send(PortEvent::StartReconciliation);
        }
        if self.reconciliation_pending == 0 {
            self.finish_reconciliation().await;
        }
    }

    fn get_or_create_port(
        &mut self,
        port_name: &str,
        cable_type: Option<PortCableType>,
        server_ipv4: Option<std::net::Ipv4Addr>,
    ) {
        if !self.ports.contains_key(port_name) {
            let mut port_config = MuxPortConfig::new(
                port_name.to_string(),
                server_id_from_port_name(port_name),
            )
            .with_cable_type(cable_type.unwrap_or_default());
            port_config.server_ipv4 = server_ipv4;

            let prober = (self.prober_factory)(port_name);
            let (event_tx, join) = MuxPort::spawn(
                port_config,
                Arc::clone(&self.mux_config),
                Arc::clone(&self.db),
                prober,
                self.internal_tx.clone(),
            );

            // Ports discovered inside the reconciliation window join it.
            if self.reconciliation_active {
                let _ = event_tx.send(PortEvent::StartReconciliation);
                self.reconciliation_pending += 1;
            }

            self.ports
                .insert(port_name.to_string(), PortHandle { event_tx, join });
        }
    }

    fn send_to_port(&self, port_name: &str, event: PortEvent) {
        if let Some(handle) = self.ports.get(port_name) {
            let _ = handle.event_tx.send(event);
        } else {
            debug!(port = port_name, "Notification for unknown port dropped");
        }
    }

    /// Sender for injecting events onto a port's domain (prober engines).
    pub fn port_event_sender(&self, port_name: &str) -> Option<mpsc::UnboundedSender<PortEvent>> {
        self.ports.get(port_name).map(|h| h.event_tx.clone())
    }

    /// Main event loop; returns after a shutdown signal.
    pub async fn run(
        mut self,
        mut notif_rx: mpsc::UnboundedReceiver<DbNotification>,
        mut internal_rx: mpsc::UnboundedReceiver<ManagerEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let deadline = if self.reconciliation_active {
                self.reconciliation_deadline
            } else {
                None
            };

            tokio::select! {
                maybe = notif_rx.recv() => match maybe {
                    Some(notification) => self.handle_notification(notification).await,
                    None => {
                        warn!("Fabric notification channel closed");
                        break;
                    }
                },
                maybe = internal_rx.recv() => {
                    if let Some(event) = maybe {
                        self.handle_manager_event(event).await;
                    }
                },
                _ = shutdown_rx.changed() => {
                    info!("Shutdown requested");
                    break;
                },
                _ = maybe_sleep(deadline) => {
                    warn!("Reconciliation timed out after warm restart, forcing reconciled");
                    for handle in self.ports.values() {
                        let _ = handle.event_tx.send(PortEvent::ReconciliationTimeout);
                    }
                    self.finish_reconciliation().await;
                },
            }
        }
        self.shutdown().await;
    }

    async fn handle_manager_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::PortReconciled(port) => {
                debug!(port = %port, "Port reconciled");
                if self.reconciliation_active {
                    self.reconciliation_pending = self.reconciliation_pending.saturating_sub(1);
                    if self.reconciliation_pending == 0 {
                        self.finish_reconciliation().await;
                    }
                }
            }
        }
    }

    async fn finish_reconciliation(&mut self) {
        self.reconciliation_active = false;
        self.reconciliation_deadline = None;
        self.db.set_warm_restart_state_reconciled().await;
        info!("Warm restart reconciliation complete");
    }

    async fn handle_notification(&mut self, notification: DbNotification) {
        match notification {
            DbNotification::MuxPortConfigChange {
                port,
                state,
                cable_type,
                pck_loss_data_reset,
            } => {
                let cable_type = cable_type.and_then(|raw| raw.parse::<PortCableType>().ok());
                self.get_or_create_port(&port, cable_type, None);

                if let Some(state) = state {
                    warn!(port = %port, config = %state, "Mux port config");
                    match state.parse::<Mode>() {
                        Ok(mode) => self.send_to_port(&port, PortEvent::MuxConfigChange(mode)),
                        Err(e) => warn!(port = %port, error = %e, "Ignoring mux mode"),
                    }
                }
                if pck_loss_data_reset {
                    warn!(port = %port, "Resetting ICMP packet loss counters");
                    self.send_to_port(&port, PortEvent::ResetLossCount);
                }
            }
            DbNotification::LinkProberTunable { field, value } => {
                let mut config = self.mux_config.write().await;
                match config.apply_link_prober_field(&field, &value) {
                    Ok(()) => info!(field = %field, value = %value, "Applied link prober tunable"),
                    // Previous value is retained.
                    Err(e) => {
                        warn!(field = %field, value = %value, error = %e, "Rejected link prober tunable")
                    }
                }
            }
            DbNotification::LogVerbosity { verbosity } => match &self.log_handle {
                Some(handle) => match handle.set_verbosity(&verbosity) {
                    Ok(()) => error!(verbosity = %verbosity, "Updated log level"),
                    Err(e) => warn!(verbosity = %verbosity, error = %e, "Rejected log verbosity"),
                },
                None => debug!(verbosity = %verbosity, "No log handle installed"),
            },
            DbNotification::LinkState { port, state } => {
                warn!(port = %port, state = %state, "Link state");
                self.get_or_create_port(&port, None, None);
                self.send_to_port(&port, PortEvent::LinkStateNotification(state));
            }
            DbNotification::MuxResponse { port, state } => {
                info!(port = %port, response = %state, "Mux probe response");
                self.send_to_port(&port, PortEvent::ProbeMuxResponse(state));
            }
            DbNotification::MuxState { port, state } => {
                warn!(port = %port, state = %state, "State db mux state");
                self.get_or_create_port(&port, None, None);
                self.send_to_port(&port, PortEvent::MuxStateNotification(state));
            }
            DbNotification::GetMuxStateResponse { port, state } => {
                self.send_to_port(&port, PortEvent::GetMuxStateResponse(state));
            }
            DbNotification::DefaultRoute { is_v4, state } => {
                self.handle_default_route(is_v4, &state);
            }
            DbNotification::PeerLinkState { port, state } => {
                warn!(port = %port, state = %state, "Peer link state");
                self.get_or_create_port(&port, None, None);
                self.send_to_port(&port, PortEvent::PeerLinkStateNotification(state));
            }
            DbNotification::PeerMuxState { port, state } => {
                self.send_to_port(&port, PortEvent::PeerMuxStateNotification(state));
            }
        }
    }

    /// Aggregates per-family route state; ports only care whether the IPv4
    /// default route is healthy.
    fn handle_default_route(&mut self, is_v4: bool, state: &str) {
        let parsed = match state.parse::<DefaultRoute>() {
            Ok(route) => route,
            Err(e) => {
                warn!(error = %e, "Ignoring default route state");
                return;
            }
        };
        if is_v4 {
            self.ipv4_default_route = parsed;
        } else {
            self.ipv6_default_route = parsed;
        }

        let next = self.ipv4_default_route;
        info!(state = ?next, "Default route state");
        for handle in self.ports.values() {
            let _ = handle.event_tx.send(PortEvent::DefaultRouteState(next));
        }
    }

    /// Stops all port supervisors and waits for them to drain.
    async fn shutdown(self) {
        for handle in self.ports.values() {
            let _ = handle.event_tx.send(PortEvent::Shutdown);
        }
        for (port, handle) in self.ports {
            if handle.join.await.is_err() {
                warn!(port = %port, "Port supervisor panicked during shutdown");
            }
        }
        info!("All port supervisors drained");
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn maybe_sleep(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Default prober wiring: a command channel drained by a placeholder task
/// until an ICMP engine binds to the port.
fn default_prober_factory(port_name: &str) -> Arc<dyn LinkProberControl> {
    let (prober, mut command_rx) = ChannelLinkProber::new(port_name);
    let port = port_name.to_string();
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            debug!(port = %port, ?command, "Prober command (no engine attached)");
        }
    });
    Arc::new(prober)
}
