//! Table and field name constants for linkmgrd.
//!
//! These match the schema used by orchagent, xcvrd and the mux CLI.

// CONFIG_DB tables
pub const CFG_MUX_CABLE_TABLE_NAME: &str = "MUX_CABLE";
pub const CFG_MUX_LINKMGR_TABLE_NAME: &str = "MUX_LINKMGR";
pub const CFG_DEVICE_METADATA_TABLE_NAME: &str = "DEVICE_METADATA";
pub const CFG_LOOPBACK_INTERFACE_TABLE_NAME: &str = "LOOPBACK_INTERFACE";
pub const CFG_WARM_RESTART_TABLE_NAME: &str = "WARM_RESTART";

// APPL_DB tables
pub const APP_MUX_CABLE_TABLE_NAME: &str = "MUX_CABLE_TABLE";
pub const APP_MUX_CABLE_COMMAND_TABLE_NAME: &str = "MUX_CABLE_COMMAND_TABLE";
pub const APP_MUX_CABLE_RESPONSE_TABLE_NAME: &str = "MUX_CABLE_RESPONSE_TABLE";
pub const APP_PORT_TABLE_NAME: &str = "PORT_TABLE";
pub const APP_PEER_FORWARDING_STATE_TABLE_NAME: &str = "HW_FORWARDING_STATE_PEER";

// STATE_DB tables
pub const STATE_MUX_CABLE_TABLE_NAME: &str = "HW_MUX_CABLE_TABLE";
pub const STATE_PEER_FORWARDING_STATE_TABLE_NAME: &str = "PEER_HW_FORWARDING_STATE_TABLE";
pub const STATE_MUX_LINKMGR_TABLE_NAME: &str = "MUX_LINKMGR_TABLE";
pub const STATE_MUX_METRICS_TABLE_NAME: &str = "MUX_METRICS_TABLE";
pub const STATE_LINK_PROBE_STATS_TABLE_NAME: &str = "LINK_PROBE_STATS";
pub const STATE_ROUTE_TABLE_NAME: &str = "ROUTE_TABLE";
pub const STATE_MUX_CABLE_INFO_TABLE_NAME: &str = "MUX_CABLE_INFO";
pub const STATE_WARM_RESTART_ENABLE_TABLE_NAME: &str = "WARM_RESTART_ENABLE_TABLE";
pub const STATE_WARM_RESTART_TABLE_NAME: &str = "WARM_RESTART_TABLE";

/// DEVICE_METADATA fields.
pub mod metadata_fields {
    pub const LOCALHOST_KEY: &str = "localhost";
    pub const MAC: &str = "mac";
}

/// MUX_CABLE (CONFIG_DB) fields.
pub mod mux_cable_fields {
    pub const SERVER_IPV4: &str = "server_ipv4";
    pub const SERVER_IPV6: &str = "server_ipv6";
    pub const CABLE_TYPE: &str = "cable_type";
    pub const STATE: &str = "state";
    pub const PCK_LOSS_DATA_RESET: &str = "pck_loss_data_reset";
}

/// MUX_LINKMGR (CONFIG_DB) keys and fields.
pub mod linkmgr_fields {
    pub const LINK_PROBER_KEY: &str = "LINK_PROBER";
    pub const INTERVAL_V4: &str = "interval_v4";
    pub const INTERVAL_V6: &str = "interval_v6";
    pub const POSITIVE_SIGNAL_COUNT: &str = "positive_signal_count";
    pub const NEGATIVE_SIGNAL_COUNT: &str = "negative_signal_count";
    pub const SUSPEND_TIMER: &str = "suspend_timer";

    pub const MUXLOGGER_KEY: &str = "MUXLOGGER";
    pub const LOG_VERBOSITY: &str = "log_verbosity";
}

/// PORT_TABLE (APPL_DB) fields.
pub mod port_fields {
    pub const OPER_STATUS: &str = "oper_status";
}

/// MUX_CABLE_COMMAND_TABLE / MUX_CABLE_RESPONSE_TABLE fields.
pub mod command_fields {
    pub const COMMAND: &str = "command";
    pub const COMMAND_PROBE: &str = "probe";
    pub const RESPONSE: &str = "response";
}

/// State-table fields shared by several tables.
pub mod state_fields {
    pub const STATE: &str = "state";
    pub const LINK_STATUS_PEER: &str = "link_status_peer";
}

/// ROUTE_TABLE (STATE_DB) keys.
pub mod route_keys {
    pub const DEFAULT_V4: &str = "0.0.0.0/0";
    pub const DEFAULT_V6: &str = "::/0";
}

/// LINK_PROBE_STATS fields.
pub mod probe_stats_fields {
    pub const UNKNOWN_START: &str = "link_prober_unknown_start";
    pub const UNKNOWN_END: &str = "link_prober_unknown_end";
    pub const PCK_LOSS_COUNT: &str = "pck_loss_count";
    pub const PCK_EXPECTED_COUNT: &str = "pck_expected_count";
}

/// Warm-restart tables fields.
pub mod warm_restart_fields {
    pub const SYSTEM_KEY: &str = "system";
    pub const ENABLE: &str = "enable";
    pub const LINKMGRD_KEY: &str = "linkmgrd";
    pub const TIMER: &str = "timer";
    pub const STATE: &str = "state";
    pub const STATE_RECONCILED: &str = "reconciled";
}
