//! Link-prober interface.
//!
//! The ICMP heartbeat engine is an external collaborator; linkmgrd consumes
//! its verdict stream and drives it through [`LinkProberControl`]. The
//! contract the engine is expected to honor:
//!
//! - at most one verdict per heartbeat interval (`interval_v4`)
//! - `suspend_tx` halts transmission for the requested duration
//! - loss counters are reported through the port supervisor on demand
//!
//! The verdict and control contracts carry no address family, so an IPv6
//! engine can attach to the same seam.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Per-heartbeat classification emitted by the prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProberVerdict {
    /// Our own heartbeat came back: this ToR carries traffic.
    SelfActive,
    /// Our heartbeat went unanswered.
    SelfUnknown,
    /// The peer ToR's heartbeat was observed.
    PeerActive,
    /// The peer ToR's heartbeat went missing.
    PeerUnknown,
    /// No peer classification yet.
    PeerWait,
}

impl LinkProberVerdict {
    /// True for verdicts about the local ToR.
    pub fn is_self(&self) -> bool {
        matches!(self, LinkProberVerdict::SelfActive | LinkProberVerdict::SelfUnknown)
    }
}

/// Control operations the supervisor issues toward the prober engine.
#[async_trait]
pub trait LinkProberControl: Send + Sync {
    /// Halt heartbeat transmission for the given duration.
    async fn suspend_tx(&self, duration: Duration);

    /// Resume (or start) heartbeat transmission.
    async fn restart_tx(&self);

    /// Stop heartbeat transmission until restarted.
    async fn shutdown_tx(&self);

    /// Clear ICMP loss/expected counters.
    async fn reset_icmp_packet_counts(&self);
}

/// Commands carried over the channel to an external prober engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberCommand {
    Suspend(Duration),
    Restart,
    Shutdown,
    ResetCounters,
}

/// Channel-backed [`LinkProberControl`] for wiring an external engine.
///
/// Commands are fire-and-forget; a full or closed channel is logged and
/// dropped so a stalled engine can never block a port supervisor.
pub struct ChannelLinkProber {
    port_name: String,
    tx: mpsc::UnboundedSender<ProberCommand>,
}

impl ChannelLinkProber {
    pub fn new(port_name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<ProberCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                port_name: port_name.into(),
                tx,
            },
            rx,
        )
    }

    fn send(&self, command: ProberCommand) {
        if self.tx.send(command).is_err() {
            warn!(port = %self.port_name, ?command, "Link prober engine is gone, dropping command");
        }
    }
}

#[async_trait]
impl LinkProberControl for ChannelLinkProber {
    async fn suspend_tx(&self, duration: Duration) {
        self.send(ProberCommand::Suspend(duration));
    }

    async fn restart_tx(&self) {
        self.send(ProberCommand::Restart);
    }

    async fn shutdown_tx(&self) {
        self.send(ProberCommand::Shutdown);
    }

    async fn reset_icmp_packet_counts(&self) {
        self.send(ProberCommand::ResetCounters);
    }
}
