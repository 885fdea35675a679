//! Global and per-port MUX configuration.
//!
//! `MuxConfig` holds process-wide tunables. It lives behind an
//! `Arc<RwLock<..>>` owned by the manager; only the config-subscription path
//! writes it, and port supervisors copy the values they need at the start of
//! each task.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use sonic_linkmgr_common::MuxError;

/// Default ICMP heartbeat interval for the IPv4 prober path.
pub const DEFAULT_INTERVAL_V4_MSEC: u32 = 100;

/// Default ICMP heartbeat interval for the IPv6 prober path (stub contract).
pub const DEFAULT_INTERVAL_V6_MSEC: u32 = 1000;

/// Consecutive positive (Active) verdicts required to advance the prober state.
pub const DEFAULT_POSITIVE_STATE_CHANGE_RETRY_COUNT: u32 = 3;

/// Consecutive negative (Unknown) verdicts required to advance the prober state.
pub const DEFAULT_NEGATIVE_STATE_CHANGE_RETRY_COUNT: u32 = 3;

/// Consecutive identical driver reports required to advance the MUX state.
pub const DEFAULT_MUX_STATE_CHANGE_RETRY_COUNT: u32 = 3;

/// Consecutive identical oper-status reports required to advance the link state.
pub const DEFAULT_LINK_STATE_CHANGE_RETRY_COUNT: u32 = 2;

/// Duration the prober halts transmission after a fail-over to standby.
pub const DEFAULT_SUSPEND_TIMEOUT_MSEC: u32 = 500;

/// Deadline for a toggle request to be confirmed by a driver report.
pub const DEFAULT_MUX_WAIT_TIMEOUT_MSEC: u32 = 1000;

/// Warm-restart reconciliation window.
pub const DEFAULT_MUX_RECONCILIATION_TIMEOUT_SEC: u32 = 10;

/// Process-wide tunables, mutable from CONFIG_DB notifications.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    pub number_of_threads: u32,
    pub interval_v4_msec: u32,
    pub interval_v6_msec: u32,
    pub positive_state_change_retry_count: u32,
    pub negative_state_change_retry_count: u32,
    pub mux_state_change_retry_count: u32,
    pub link_state_change_retry_count: u32,
    pub suspend_timeout_msec: u32,
    pub mux_wait_timeout_msec: u32,
    pub mux_reconciliation_timeout_sec: u32,
    pub enable_switchover_measurement: bool,
    pub enable_default_route_feature: bool,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            number_of_threads: num_cpus::get() as u32,
            interval_v4_msec: DEFAULT_INTERVAL_V4_MSEC,
            interval_v6_msec: DEFAULT_INTERVAL_V6_MSEC,
            positive_state_change_retry_count: DEFAULT_POSITIVE_STATE_CHANGE_RETRY_COUNT,
            negative_state_change_retry_count: DEFAULT_NEGATIVE_STATE_CHANGE_RETRY_COUNT,
            mux_state_change_retry_count: DEFAULT_MUX_STATE_CHANGE_RETRY_COUNT,
            link_state_change_retry_count: DEFAULT_LINK_STATE_CHANGE_RETRY_COUNT,
            suspend_timeout_msec: DEFAULT_SUSPEND_TIMEOUT_MSEC,
            mux_wait_timeout_msec: DEFAULT_MUX_WAIT_TIMEOUT_MSEC,
            mux_reconciliation_timeout_sec: DEFAULT_MUX_RECONCILIATION_TIMEOUT_SEC,
            enable_switchover_measurement: false,
            enable_default_route_feature: false,
        }
    }
}

impl MuxConfig {
    /// Applies one `MUX_LINKMGR|LINK_PROBER` field. Unparsable values are
    /// rejected so the caller can log and retain the previous value.
    pub fn apply_link_prober_field(&mut self, field: &str, value: &str) -> Result<(), MuxError> {
        let parsed: u32 = value
            .parse()
            .map_err(|_| MuxError::invalid_input(field, format!("not an integer: {}", value)))?;
        if parsed == 0 {
            return Err(MuxError::invalid_input(field, "must be positive"));
        }

        match field {
            "interval_v4" => self.interval_v4_msec = parsed,
            "interval_v6" => self.interval_v6_msec = parsed,
            "positive_signal_count" => self.positive_state_change_retry_count = parsed,
            "negative_signal_count" => self.negative_state_change_retry_count = parsed,
            "suspend_timer" => self.suspend_timeout_msec = parsed,
            other => {
                return Err(MuxError::invalid_input(other, "unknown LINK_PROBER field"));
            }
        }
        Ok(())
    }

    pub fn suspend_timeout(&self) -> Duration {
        Duration::from_millis(self.suspend_timeout_msec as u64)
    }

    pub fn mux_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.mux_wait_timeout_msec as u64)
    }

    pub fn reconciliation_timeout(&self) -> Duration {
        Duration::from_secs(self.mux_reconciliation_timeout_sec as u64)
    }

    /// Probe retry delay for the given attempt: exponential from the
    /// heartbeat interval, bounded by the mux-wait timeout.
    pub fn probe_backoff(&self, attempt: u32) -> Duration {
        let base = self.interval_v4_msec as u64;
        let capped = base
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.mux_wait_timeout_msec as u64);
        Duration::from_millis(capped)
    }
}

/// MUX port administrative mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Automatic toggling driven by the composite state.
    Auto,
    /// Pin the port active; keep remediating toward active.
    Active,
    /// Freeze all decisions; keep observing.
    Manual,
    /// Pin the port standby; keep remediating toward standby.
    Standby,
    /// Active-active only: observe, publish, but issue no local toggles and
    /// no peer-switch requests.
    Detached,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::Active => "active",
            Mode::Manual => "manual",
            Mode::Standby => "standby",
            Mode::Detached => "detach",
        }
    }
}

impl FromStr for Mode {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Mode::Auto),
            "active" => Ok(Mode::Active),
            "manual" => Ok(Mode::Manual),
            "standby" => Ok(Mode::Standby),
            "detach" | "detached" => Ok(Mode::Detached),
            other => Err(MuxError::invalid_input(
                "state",
                format!("unknown mux mode: {}", other),
            )),
        }
    }
}

/// Cable wiring variant of a MUX port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortCableType {
    ActiveStandby,
    ActiveActive,
}

impl Default for PortCableType {
    fn default() -> Self {
        PortCableType::ActiveStandby
    }
}

impl FromStr for PortCableType {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active-standby" => Ok(PortCableType::ActiveStandby),
            "active-active" => Ok(PortCableType::ActiveActive),
            other => Err(MuxError::invalid_input(
                "cable_type",
                format!("unknown cable type: {}", other),
            )),
        }
    }
}

/// Default-route health as reported by routeorch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultRoute {
    Ok,
    Na,
}

impl FromStr for DefaultRoute {
    type Err = MuxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(DefaultRoute::Ok),
            "na" => Ok(DefaultRoute::Na),
            other => Err(MuxError::invalid_input(
                "state",
                format!("unknown default route state: {}", other),
            )),
        }
    }
}

/// Per-port configuration.
#[derive(Debug, Clone)]
pub struct MuxPortConfig {
    pub port_name: String,
    pub server_id: u16,
    pub server_ipv4: Option<Ipv4Addr>,
    pub cable_type: PortCableType,
    pub mode: Mode,
}

impl MuxPortConfig {
    pub fn new(port_name: impl Into<String>, server_id: u16) -> Self {
        Self {
            port_name: port_name.into(),
            server_id,
            server_ipv4: None,
            cable_type: PortCableType::default(),
            mode: Mode::Auto,
        }
    }

    pub fn with_cable_type(mut self, cable_type: PortCableType) -> Self {
        self.cable_type = cable_type;
        self
    }
}

/// Derives the server/blade id from the trailing digits of a port name.
pub fn server_id_from_port_name(port_name: &str) -> u16 {
    let digits: String = port_name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MuxConfig::default();
        assert_eq!(config.interval_v4_msec, 100);
        assert_eq!(config.positive_state_change_retry_count, 3);
        assert_eq!(config.negative_state_change_retry_count, 3);
        assert_eq!(config.link_state_change_retry_count, 2);
        assert!(!config.enable_switchover_measurement);
        assert!(!config.enable_default_route_feature);
    }

    #[test]
    fn test_apply_link_prober_field() {
        let mut config = MuxConfig::default();

        config
            .apply_link_prober_field("interval_v4", "200")
            .unwrap();
        assert_eq!(config.interval_v4_msec, 200);

        config
            .apply_link_prober_field("positive_signal_count", "5")
            .unwrap();
        assert_eq!(config.positive_state_change_retry_count, 5);

        // Bad integer: previous value retained by the caller.
        assert!(config
            .apply_link_prober_field("suspend_timer", "soon")
            .is_err());
        assert_eq!(config.suspend_timeout_msec, DEFAULT_SUSPEND_TIMEOUT_MSEC);

        assert!(config.apply_link_prober_field("interval_v4", "0").is_err());
        assert!(config
            .apply_link_prober_field("warp_factor", "9")
            .is_err());
    }

    #[test]
    fn test_probe_backoff_bounded() {
        let config = MuxConfig::default();
        assert_eq!(config.probe_backoff(0), Duration::from_millis(100));
        assert_eq!(config.probe_backoff(1), Duration::from_millis(200));
        assert_eq!(config.probe_backoff(2), Duration::from_millis(400));
        // Bounded by the mux-wait timeout.
        assert_eq!(config.probe_backoff(6), Duration::from_millis(1000));
        assert_eq!(config.probe_backoff(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<Mode>().unwrap(), Mode::Auto);
        assert_eq!("active".parse::<Mode>().unwrap(), Mode::Active);
        assert_eq!("manual".parse::<Mode>().unwrap(), Mode::Manual);
        assert_eq!("standby".parse::<Mode>().unwrap(), Mode::Standby);
        assert_eq!("detach".parse::<Mode>().unwrap(), Mode::Detached);
        assert!("automatic".parse::<Mode>().is_err());
    }

    #[test]
    fn test_cable_type_parsing() {
        assert_eq!(
            "active-standby".parse::<PortCableType>().unwrap(),
            PortCableType::ActiveStandby
        );
        assert_eq!(
            "active-active".parse::<PortCableType>().unwrap(),
            PortCableType::ActiveActive
        );
        assert!("duplex".parse::<PortCableType>().is_err());
    }

    #[test]
    fn test_server_id_from_port_name() {
        assert_eq!(server_id_from_port_name("Ethernet0"), 0);
        assert_eq!(server_id_from_port_name("Ethernet124"), 124);
        assert_eq!(server_id_from_port_name("PortChannel"), 0);
    }
}
