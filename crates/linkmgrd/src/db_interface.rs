//! Redis-backed key-value fabric adapter.
//!
//! State machines talk to [`DbInterface`], a fire-and-forget surface whose
//! production implementation enqueues writes onto a single producer queue
//! task. Inbound table changes are detected by a poller task that diffs
//! snapshots and emits typed [`DbNotification`]s; the manager dispatches
//! them onto per-port serialization domains.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sonic_linkmgr_common::{MuxError, MuxResult};

use crate::config::PortCableType;
use crate::link_manager::{HealthLabel, LinkProberMetrics, Metrics, SwitchCause};
use crate::state::MuxState;
use crate::tables::*;

/// Timestamp format used in MUX metrics and prober stats records.
const METRICS_TIME_FORMAT: &str = "%Y-%b-%d %H:%M:%S%.6f";

/// Redis database indexes of the fabric databases linkmgrd touches.
const APPL_DB_INDEX: u8 = 0;
const CONFIG_DB_INDEX: u8 = 4;
const STATE_DB_INDEX: u8 = 6;

/// Fire-and-forget operations the state machines issue toward the fabric.
#[async_trait]
pub trait DbInterface: Send + Sync {
    /// Requests a hardware toggle: APPL_DB `MUX_CABLE_TABLE|<port> state`.
    async fn set_mux_state(&self, port: &str, label: MuxState);

    /// Requests the peer yield: APPL_DB `HW_FORWARDING_STATE_PEER|<port>`.
    async fn set_peer_mux_state(&self, port: &str, label: MuxState);

    /// Reads the driver's current state back; the answer arrives later as
    /// [`DbNotification::GetMuxStateResponse`].
    async fn get_mux_state(&self, port: &str);

    /// Asks the transceiver driver to re-read hardware state over i2c.
    async fn probe_mux_state(&self, port: &str);

    /// Publishes linkmgr health for the CLI.
    async fn set_mux_linkmgr_state(&self, port: &str, label: HealthLabel);

    /// Posts a switchover timing marker.
    async fn post_metrics_event(&self, port: &str, metrics: Metrics, label: MuxState);

    /// Records why a switchover was requested.
    async fn post_switch_cause(&self, port: &str, cause: SwitchCause);

    /// Posts a prober outage marker.
    async fn post_link_prober_metrics(&self, port: &str, metrics: LinkProberMetrics);

    /// Publishes heartbeat loss counters.
    async fn post_pck_loss_ratio(&self, port: &str, unknown: u64, expected: u64);

    /// Marks the daemon reconciled after a warm restart.
    async fn set_warm_restart_state_reconciled(&self);
}

/// Typed inbound change from the fabric. The poller parses raw table
/// entries down to the fields linkmgrd reacts to; everything else is
/// dropped at this boundary.
#[derive(Debug, Clone)]
pub enum DbNotification {
    /// CONFIG_DB MUX_CABLE entry changed.
    MuxPortConfigChange {
        port: String,
        /// Requested mode (`auto`, `active`, `manual`, `standby`, `detach`).
        state: Option<String>,
        cable_type: Option<String>,
        /// The operator asked for the ICMP loss counters to be cleared.
        pck_loss_data_reset: bool,
    },
    /// One `MUX_LINKMGR|LINK_PROBER` tunable.
    LinkProberTunable { field: String, value: String },
    /// `MUX_LINKMGR|MUXLOGGER` verbosity change.
    LogVerbosity { verbosity: String },
    LinkState { port: String, state: String },
    MuxResponse { port: String, state: String },
    MuxState { port: String, state: String },
    GetMuxStateResponse { port: String, state: String },
    DefaultRoute { is_v4: bool, state: String },
    PeerLinkState { port: String, state: String },
    PeerMuxState { port: String, state: String },
}

/// Operations carried to the producer-queue task.
#[derive(Debug)]
enum DbWriteOp {
    SetMuxState {
        port: String,
        label: MuxState,
    },
    SetPeerMuxState {
        port: String,
        label: MuxState,
    },
    GetMuxState {
        port: String,
    },
    ProbeMuxState {
        port: String,
    },
    SetMuxLinkmgrState {
        port: String,
        label: HealthLabel,
    },
    PostMetrics {
        port: String,
        metrics: Metrics,
        label: MuxState,
        time: DateTime<Utc>,
    },
    PostSwitchCause {
        port: String,
        cause: SwitchCause,
        time: DateTime<Utc>,
    },
    PostLinkProberMetrics {
        port: String,
        metrics: LinkProberMetrics,
        time: DateTime<Utc>,
    },
    PostPckLossRatio {
        port: String,
        unknown: u64,
        expected: u64,
    },
    SetWarmRestartStateReconciled,
}

fn config_key(table: &str, key: &str) -> String {
    format!("{}|{}", table, key)
}

fn appl_key(table: &str, key: &str) -> String {
    format!("{}:{}", table, key)
}

fn state_key(table: &str, key: &str) -> String {
    format!("{}|{}", table, key)
}

/// Validates a `xx:xx:xx:xx:xx:xx` MAC address string.
pub fn parse_mac_address(mac: &str) -> MuxResult<[u8; 6]> {
    let octets: Vec<&str> = mac.split(':').collect();
    if octets.len() != 6 {
        return Err(MuxError::config_not_found(format!(
            "Invalid ToR MAC address {}",
            mac
        )));
    }
    let mut parsed = [0u8; 6];
    for (i, octet) in octets.iter().enumerate() {
        parsed[i] = u8::from_str_radix(octet, 16).map_err(|_| {
            MuxError::config_not_found(format!("Invalid ToR MAC address {}", mac))
        })?;
    }
    Ok(parsed)
}

/// Live connections to the three fabric databases.
#[derive(Clone)]
pub struct DbConnections {
    pub appl: ConnectionManager,
    pub config: ConnectionManager,
    pub state: ConnectionManager,
}

impl DbConnections {
    pub async fn connect(host: &str, port: u16) -> MuxResult<Self> {
        Ok(Self {
            appl: Self::open(host, port, "APPL_DB", APPL_DB_INDEX).await?,
            config: Self::open(host, port, "CONFIG_DB", CONFIG_DB_INDEX).await?,
            state: Self::open(host, port, "STATE_DB", STATE_DB_INDEX).await?,
        })
    }

    async fn open(host: &str, port: u16, name: &str, index: u8) -> MuxResult<ConnectionManager> {
        let uri = format!("redis://{}:{}/{}", host, port, index);
        let client = redis::Client::open(uri.as_str())
            .map_err(|e| MuxError::database("open", format!("{}: {}", uri, e)))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| MuxError::database("connect", format!("{}: {}", name, e)))?;
        info!(db = name, host, port, "Connected to fabric database");
        Ok(conn)
    }

    /// Reads the ToR MAC address. Missing or malformed is fatal.
    pub async fn get_tor_mac_address(&mut self) -> MuxResult<[u8; 6]> {
        let key = config_key(CFG_DEVICE_METADATA_TABLE_NAME, metadata_fields::LOCALHOST_KEY);
        let mac: Option<String> = self
            .config
            .hget(&key, metadata_fields::MAC)
            .await
            .map_err(|e| MuxError::database("hget", e.to_string()))?;
        match mac {
            Some(mac) => parse_mac_address(&mac),
            None => Err(MuxError::config_not_found("ToR MAC address is not found")),
        }
    }

    /// Reads the Loopback2 IPv4 source address. Missing is fatal.
    pub async fn get_loopback2_ipv4(&mut self) -> MuxResult<Ipv4Addr> {
        let pattern = format!("{}|Loopback2|*", CFG_LOOPBACK_INTERFACE_TABLE_NAME);
        let keys: Vec<String> = self
            .config
            .keys(&pattern)
            .await
            .map_err(|e| MuxError::database("keys", e.to_string()))?;

        for key in keys {
            let Some(prefix) = key.split('|').nth(2) else {
                continue;
            };
            let ip = prefix.split('/').next().unwrap_or(prefix);
            match ip.parse::<Ipv4Addr>() {
                Ok(addr) => {
                    info!(ip = %addr, "Loopback2 source address");
                    return Ok(addr);
                }
                Err(_) => {
                    // IPv6 loopback entries are expected; skip them.
                    debug!(prefix = ip, "Skipping non-IPv4 Loopback2 entry");
                }
            }
        }
        Err(MuxError::config_not_found("Loopback2 IPv4 address missing"))
    }

    /// Reads the per-port MUX cable configuration present at startup.
    pub async fn get_mux_port_seeds(&mut self) -> MuxResult<Vec<PortSeed>> {
        let pattern = format!("{}|*", CFG_MUX_CABLE_TABLE_NAME);
        let keys: Vec<String> = self
            .config
            .keys(&pattern)
            .await
            .map_err(|e| MuxError::database("keys", e.to_string()))?;

        let mut seeds = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(port) = key.split('|').nth(1) else {
                continue;
            };
            let fvs: HashMap<String, String> = self
                .config
                .hgetall(&key)
                .await
                .map_err(|e| MuxError::database("hgetall", e.to_string()))?;

            let server_ipv4 = fvs.get(mux_cable_fields::SERVER_IPV4).and_then(|raw| {
                let ip = raw.split('/').next().unwrap_or(raw);
                match ip.parse::<Ipv4Addr>() {
                    Ok(addr) => Some(addr),
                    Err(_) => {
                        warn!(port, server_ipv4 = %raw, "Received invalid server IP");
                        None
                    }
                }
            });
            let cable_type = fvs
                .get(mux_cable_fields::CABLE_TYPE)
                .map(String::as_str)
                .unwrap_or("active-standby")
                .parse::<PortCableType>()
                .unwrap_or_else(|e| {
                    warn!(port, error = %e, "Defaulting to active-standby");
                    PortCableType::ActiveStandby
                });

            seeds.push(PortSeed {
                port: port.to_string(),
                server_ipv4,
                cable_type,
            });
        }
        Ok(seeds)
    }

    /// True when the platform reports a warm-restart context.
    pub async fn is_warm_start(&mut self) -> bool {
        let key = state_key(
            STATE_WARM_RESTART_ENABLE_TABLE_NAME,
            warm_restart_fields::SYSTEM_KEY,
        );
        let enable: Option<String> = match self.state.hget(&key, warm_restart_fields::ENABLE).await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to read warm restart context, assuming cold start");
                None
            }
        };
        enable.as_deref() == Some("true")
    }

    /// Platform-configured reconciliation window in seconds, 0 when unset.
    pub async fn get_warm_start_timer(&mut self) -> u32 {
        let key = config_key(
            CFG_WARM_RESTART_TABLE_NAME,
            warm_restart_fields::LINKMGRD_KEY,
        );
        let timer: Option<String> = match self.config.hget(&key, warm_restart_fields::TIMER).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to read warm restart timer");
                None
            }
        };
        timer.and_then(|t| t.parse().ok()).unwrap_or(0)
    }
}

/// Configuration snapshot read at startup for one MUX port.
#[derive(Debug, Clone)]
pub struct PortSeed {
    pub port: String,
    pub server_ipv4: Option<Ipv4Addr>,
    pub cable_type: PortCableType,
}

/// Production [`DbInterface`]: enqueues every write onto the producer queue.
pub struct RedisDbInterface {
    write_tx: mpsc::UnboundedSender<DbWriteOp>,
}

impl RedisDbInterface {
    /// Spawns the producer-queue task and returns the shared handle.
    pub fn spawn(
        conns: DbConnections,
        notif_tx: mpsc::UnboundedSender<DbNotification>,
    ) -> std::sync::Arc<Self> {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(conns, write_rx, notif_tx));
        std::sync::Arc::new(Self { write_tx })
    }

    fn enqueue(&self, op: DbWriteOp) {
        if self.write_tx.send(op).is_err() {
            warn!("Fabric writer task is gone, dropping write");
        }
    }
}

#[async_trait]
impl DbInterface for RedisDbInterface {
    async fn set_mux_state(&self, port: &str, label: MuxState) {
        self.enqueue(DbWriteOp::SetMuxState {
            port: port.to_string(),
            label,
        });
    }

    async fn set_peer_mux_state(&self, port: &str, label: MuxState) {
        self.enqueue(DbWriteOp::SetPeerMuxState {
            port: port.to_string(),
            label,
        });
    }

    async fn get_mux_state(&self, port: &str) {
        self.enqueue(DbWriteOp::GetMuxState {
            port: port.to_string(),
        });
    }

    async fn probe_mux_state(&self, port: &str) {
        self.enqueue(DbWriteOp::ProbeMuxState {
            port: port.to_string(),
        });
    }

    async fn set_mux_linkmgr_state(&self, port: &str, label: HealthLabel) {
        self.enqueue(DbWriteOp::SetMuxLinkmgrState {
            port: port.to_string(),
            label,
        });
    }

    async fn post_metrics_event(&self, port: &str, metrics: Metrics, label: MuxState) {
        self.enqueue(DbWriteOp::PostMetrics {
            port: port.to_string(),
            metrics,
            label,
            time: Utc::now(),
        });
    }

    async fn post_switch_cause(&self, port: &str, cause: SwitchCause) {
        self.enqueue(DbWriteOp::PostSwitchCause {
            port: port.to_string(),
            cause,
            time: Utc::now(),
        });
    }

    async fn post_link_prober_metrics(&self, port: &str, metrics: LinkProberMetrics) {
        self.enqueue(DbWriteOp::PostLinkProberMetrics {
            port: port.to_string(),
            metrics,
            time: Utc::now(),
        });
    }

    async fn post_pck_loss_ratio(&self, port: &str, unknown: u64, expected: u64) {
        self.enqueue(DbWriteOp::PostPckLossRatio {
            port: port.to_string(),
            unknown,
            expected,
        });
    }

    async fn set_warm_restart_state_reconciled(&self) {
        self.enqueue(DbWriteOp::SetWarmRestartStateReconciled);
    }
}

/// Producer-queue task: serializes all fabric writes in arrival order so a
/// toggle request reaches the fabric before any later local processing.
async fn run_writer(
    mut conns: DbConnections,
    mut write_rx: mpsc::UnboundedReceiver<DbWriteOp>,
    notif_tx: mpsc::UnboundedSender<DbNotification>,
) {
    while let Some(op) = write_rx.recv().await {
        if let Err(e) = apply_write(&mut conns, &notif_tx, op).await {
            // Transient adapter failure: log and keep servicing the queue.
            warn!(error = %e, "Fabric write failed");
        }
    }
    debug!("Fabric writer task exiting");
}

async fn apply_write(
    conns: &mut DbConnections,
    notif_tx: &mpsc::UnboundedSender<DbNotification>,
    op: DbWriteOp,
) -> MuxResult<()> {
    match op {
        DbWriteOp::SetMuxState { port, label } => {
            // Only the direction requests reach orchagent.
            if matches!(label, MuxState::Active | MuxState::Standby | MuxState::Unknown) {
                let key = appl_key(APP_MUX_CABLE_TABLE_NAME, &port);
                conns
                    .appl
                    .hset::<_, _, _, ()>(&key, state_fields::STATE, label.as_str())
                    .await
                    .map_err(|e| MuxError::database("hset", e.to_string()))?;
            }
        }
        DbWriteOp::SetPeerMuxState { port, label } => {
            let key = appl_key(APP_PEER_FORWARDING_STATE_TABLE_NAME, &port);
            conns
                .appl
                .hset::<_, _, _, ()>(&key, state_fields::STATE, label.as_str())
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
        DbWriteOp::GetMuxState { port } => {
            let key = state_key(STATE_MUX_CABLE_TABLE_NAME, &port);
            let state: Option<String> = conns
                .state
                .hget(&key, state_fields::STATE)
                .await
                .map_err(|e| MuxError::database("hget", e.to_string()))?;
            if let Some(state) = state {
                let _ = notif_tx.send(DbNotification::GetMuxStateResponse { port, state });
            }
        }
        DbWriteOp::ProbeMuxState { port } => {
            let key = appl_key(APP_MUX_CABLE_COMMAND_TABLE_NAME, &port);
            conns
                .appl
                .hset::<_, _, _, ()>(
                    &key,
                    command_fields::COMMAND,
                    command_fields::COMMAND_PROBE,
                )
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
        DbWriteOp::SetMuxLinkmgrState { port, label } => {
            let key = state_key(STATE_MUX_LINKMGR_TABLE_NAME, &port);
            conns
                .state
                .hset::<_, _, _, ()>(&key, state_fields::STATE, label.as_str())
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
        DbWriteOp::PostMetrics {
            port,
            metrics,
            label,
            time,
        } => {
            let key = state_key(STATE_MUX_METRICS_TABLE_NAME, &port);
            // A new switchover clears the previous record.
            if metrics == Metrics::SwitchingStart {
                conns
                    .state
                    .del::<_, ()>(&key)
                    .await
                    .map_err(|e| MuxError::database("del", e.to_string()))?;
            }
            let field = format!("linkmgrd_switch_{}_{}", label.as_str(), metrics.as_str());
            conns
                .state
                .hset::<_, _, _, ()>(&key, field, time.format(METRICS_TIME_FORMAT).to_string())
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
        DbWriteOp::PostSwitchCause { port, cause, time } => {
            let key = state_key(STATE_MUX_METRICS_TABLE_NAME, &port);
            conns
                .state
                .hset::<_, _, _, ()>(&key, "linkmgrd_switch_cause", cause.as_str())
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
            conns
                .state
                .hset::<_, _, _, ()>(
                    &key,
                    "linkmgrd_switch_cause_time",
                    time.format(METRICS_TIME_FORMAT).to_string(),
                )
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
        DbWriteOp::PostLinkProberMetrics {
            port,
            metrics,
            time,
        } => {
            let key = state_key(STATE_LINK_PROBE_STATS_TABLE_NAME, &port);
            // A fresh outage clears the previous start/end pair.
            if metrics == LinkProberMetrics::UnknownStart {
                conns
                    .state
                    .hdel::<_, _, ()>(&key, probe_stats_fields::UNKNOWN_START)
                    .await
                    .map_err(|e| MuxError::database("hdel", e.to_string()))?;
                conns
                    .state
                    .hdel::<_, _, ()>(&key, probe_stats_fields::UNKNOWN_END)
                    .await
                    .map_err(|e| MuxError::database("hdel", e.to_string()))?;
            }
            let field = match metrics {
                LinkProberMetrics::UnknownStart => probe_stats_fields::UNKNOWN_START,
                LinkProberMetrics::UnknownEnd => probe_stats_fields::UNKNOWN_END,
            };
            conns
                .state
                .hset::<_, _, _, ()>(&key, field, time.format(METRICS_TIME_FORMAT).to_string())
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
        DbWriteOp::PostPckLossRatio {
            port,
            unknown,
            expected,
        } => {
            let key = state_key(STATE_LINK_PROBE_STATS_TABLE_NAME, &port);
            conns
                .state
                .hset::<_, _, _, ()>(&key, probe_stats_fields::PCK_LOSS_COUNT, unknown.to_string())
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
            conns
                .state
                .hset::<_, _, _, ()>(
                    &key,
                    probe_stats_fields::PCK_EXPECTED_COUNT,
                    expected.to_string(),
                )
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
        DbWriteOp::SetWarmRestartStateReconciled => {
            let key = state_key(STATE_WARM_RESTART_TABLE_NAME, warm_restart_fields::LINKMGRD_KEY);
            conns
                .state
                .hset::<_, _, _, ()>(
                    &key,
                    warm_restart_fields::STATE,
                    warm_restart_fields::STATE_RECONCILED,
                )
                .await
                .map_err(|e| MuxError::database("hset", e.to_string()))?;
        }
    }
    Ok(())
}

/// Which fabric database a watched table lives in. APPL_DB keys are
/// colon-separated; CONFIG_DB and STATE_DB keys use pipes.
#[derive(Debug, Clone, Copy)]
enum WatchedDb {
    Appl,
    Config,
    State,
}

impl WatchedDb {
    fn key_separator(&self) -> char {
        match self {
            WatchedDb::Appl => ':',
            WatchedDb::Config | WatchedDb::State => '|',
        }
    }
}

/// One table the poller watches.
struct WatchedTable {
    db: WatchedDb,
    table: &'static str,
}

const WATCHED_TABLES: &[WatchedTable] = &[
    WatchedTable {
        db: WatchedDb::Config,
        table: CFG_MUX_LINKMGR_TABLE_NAME,
    },
    WatchedTable {
        db: WatchedDb::Config,
        table: CFG_MUX_CABLE_TABLE_NAME,
    },
    WatchedTable {
        db: WatchedDb::Appl,
        table: APP_PORT_TABLE_NAME,
    },
    WatchedTable {
        db: WatchedDb::Appl,
        table: APP_MUX_CABLE_RESPONSE_TABLE_NAME,
    },
    WatchedTable {
        db: WatchedDb::State,
        table: STATE_MUX_CABLE_TABLE_NAME,
    },
    WatchedTable {
        db: WatchedDb::State,
        table: STATE_ROUTE_TABLE_NAME,
    },
    WatchedTable {
        db: WatchedDb::State,
        table: STATE_MUX_CABLE_INFO_TABLE_NAME,
    },
    WatchedTable {
        db: WatchedDb::State,
        table: STATE_PEER_FORWARDING_STATE_TABLE_NAME,
    },
];

/// Poller that diffs table snapshots into [`DbNotification`]s.
///
/// The fabric lacks a native subscription path from this process, so the
/// poller re-reads the watched tables every interval and emits a
/// notification per key whose fields changed.
pub struct SubscriptionPoller {
    conns: DbConnections,
    notif_tx: mpsc::UnboundedSender<DbNotification>,
    snapshots: HashMap<&'static str, HashMap<String, HashMap<String, String>>>,
}

impl SubscriptionPoller {
    pub fn new(conns: DbConnections, notif_tx: mpsc::UnboundedSender<DbNotification>) -> Self {
        Self {
            conns,
            notif_tx,
            snapshots: HashMap::new(),
        }
    }

    /// Runs until the notification channel closes.
    pub async fn run(mut self, poll_interval: std::time::Duration) {
        loop {
            if self.notif_tx.is_closed() {
                debug!("Notification channel closed, poller exiting");
                return;
            }
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Fabric poll failed");
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// One pass over the watched tables.
    pub async fn poll_once(&mut self) -> MuxResult<()> {
        for watched in WATCHED_TABLES {
            let entries = self.read_table(watched).await?;
            let snapshot = self.snapshots.entry(watched.table).or_default();

            for (key, fvs) in &entries {
                if snapshot.get(key) != Some(fvs) {
                    for notification in make_notifications(watched.table, key, fvs) {
                        let _ = self.notif_tx.send(notification);
                    }
                }
            }
            *snapshot = entries;
        }
        Ok(())
    }

    async fn read_table(
        &mut self,
        watched: &WatchedTable,
    ) -> MuxResult<HashMap<String, HashMap<String, String>>> {
        let conn = match watched.db {
            WatchedDb::Appl => &mut self.conns.appl,
            WatchedDb::Config => &mut self.conns.config,
            WatchedDb::State => &mut self.conns.state,
        };

        let separator = watched.db.key_separator();
        let pattern = format!("{}{}*", watched.table, separator);
        let keys: Vec<String> = conn
            .keys(&pattern)
            .await
            .map_err(|e| MuxError::database("keys", e.to_string()))?;

        let mut entries = HashMap::with_capacity(keys.len());
        for full_key in keys {
            let Some((_, key)) = full_key.split_once(separator) else {
                continue;
            };
            let fvs: HashMap<String, String> = conn
                .hgetall(&full_key)
                .await
                .map_err(|e| MuxError::database("hgetall", e.to_string()))?;
            entries.insert(key.to_string(), fvs);
        }
        Ok(entries)
    }
}

/// Maps one changed table entry to notifications.
fn make_notifications(
    table: &str,
    key: &str,
    fvs: &HashMap<String, String>,
) -> Vec<DbNotification> {
    match table {
        CFG_MUX_LINKMGR_TABLE_NAME => match key {
            linkmgr_fields::LINK_PROBER_KEY => fvs
                .iter()
                .map(|(field, value)| DbNotification::LinkProberTunable {
                    field: field.clone(),
                    value: value.clone(),
                })
                .collect(),
            linkmgr_fields::MUXLOGGER_KEY => fvs
                .get(linkmgr_fields::LOG_VERBOSITY)
                .map(|verbosity| DbNotification::LogVerbosity {
                    verbosity: verbosity.clone(),
                })
                .into_iter()
                .collect(),
            _ => vec![],
        },
        CFG_MUX_CABLE_TABLE_NAME => vec![DbNotification::MuxPortConfigChange {
            port: key.to_string(),
            state: fvs.get(mux_cable_fields::STATE).cloned(),
            cable_type: fvs.get(mux_cable_fields::CABLE_TYPE).cloned(),
            pck_loss_data_reset: fvs.contains_key(mux_cable_fields::PCK_LOSS_DATA_RESET),
        }],
        APP_PORT_TABLE_NAME => fvs
            .get(port_fields::OPER_STATUS)
            .map(|state| DbNotification::LinkState {
                port: key.to_string(),
                state: state.clone(),
            })
            .into_iter()
            .collect(),
        APP_MUX_CABLE_RESPONSE_TABLE_NAME => fvs
            .get(command_fields::RESPONSE)
            .map(|state| DbNotification::MuxResponse {
                port: key.to_string(),
                state: state.clone(),
            })
            .into_iter()
            .collect(),
        STATE_MUX_CABLE_TABLE_NAME => fvs
            .get(state_fields::STATE)
            .map(|state| DbNotification::MuxState {
                port: key.to_string(),
                state: state.clone(),
            })
            .into_iter()
            .collect(),
        STATE_ROUTE_TABLE_NAME => {
            let is_v4 = match key {
                route_keys::DEFAULT_V4 => true,
                route_keys::DEFAULT_V6 => false,
                _ => return vec![],
            };
            fvs.get(state_fields::STATE)
                .map(|state| DbNotification::DefaultRoute {
                    is_v4,
                    state: state.clone(),
                })
                .into_iter()
                .collect()
        }
        STATE_MUX_CABLE_INFO_TABLE_NAME => fvs
            .get(state_fields::LINK_STATUS_PEER)
            .map(|state| DbNotification::PeerLinkState {
                port: key.to_string(),
                state: state.clone(),
            })
            .into_iter()
            .collect(),
        STATE_PEER_FORWARDING_STATE_TABLE_NAME => fvs
            .get(state_fields::STATE)
            .map(|state| DbNotification::PeerMuxState {
                port: key.to_string(),
                state: state.clone(),
            })
            .into_iter()
            .collect(),
        _ => vec![],
    }
}
