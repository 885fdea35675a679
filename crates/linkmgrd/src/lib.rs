//! Dual-ToR MUX cable link manager daemon.
//!
//! Each dual-homed server attaches to both ToR switches through a MUX
//! cable; linkmgrd decides, per port and in real time, whether this ToR is
//! the active or standby egress. The decision fuses three observation
//! streams:
//!
//! 1. ICMP link-prober verdicts (is our heartbeat answered?)
//! 2. Hardware MUX-state reports from the transceiver driver
//! 3. Physical link oper-status
//!
//! into a composite `(prober, mux, link)` state per port and maps every
//! change to remediation: hardware toggle requests, i2c probes, peer
//! coordination and health publication.
//!
//! # Tables
//!
//! | Database | Table | Direction |
//! |----------|-------|-----------|
//! | CONFIG_DB | MUX_CABLE, MUX_LINKMGR, DEVICE_METADATA, LOOPBACK_INTERFACE | read / subscribe |
//! | APPL_DB | MUX_CABLE_TABLE, MUX_CABLE_COMMAND_TABLE, HW_FORWARDING_STATE_PEER | write |
//! | APPL_DB | PORT_TABLE, MUX_CABLE_RESPONSE_TABLE | subscribe |
//! | STATE_DB | HW_MUX_CABLE_TABLE, ROUTE_TABLE, MUX_CABLE_INFO, PEER_HW_FORWARDING_STATE_TABLE | subscribe |
//! | STATE_DB | MUX_LINKMGR_TABLE, MUX_METRICS_TABLE, LINK_PROBE_STATS | write |

pub mod config;
pub mod db_interface;
pub mod link_manager;
pub mod link_prober;
pub mod mux_manager;
pub mod mux_port;
pub mod state;
pub mod tables;

pub use config::{DefaultRoute, Mode, MuxConfig, MuxPortConfig, PortCableType};
pub use db_interface::{DbConnections, DbInterface, DbNotification, RedisDbInterface};
pub use link_manager::{
    CompositeState, HealthLabel, LinkManagerStateMachine, LinkProberMetrics, Metrics, SwitchCause,
    TimerRequest,
};
pub use link_prober::{ChannelLinkProber, LinkProberControl, LinkProberVerdict, ProberCommand};
pub use mux_manager::{ManagerEvent, MuxManager};
pub use mux_port::{MuxPort, PortEvent};
pub use state::{LinkProberState, LinkState, MuxState, PeerProberState};
