//! linkmgrd daemon entry point.
//!
//! Builds the runtime, connects to the key-value fabric, performs the
//! mandatory startup reads, then hands control to the MUX manager until a
//! termination signal arrives.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info, warn};

use sonic_linkmgr_common::{logging, MuxResult};
use sonic_linkmgrd::config::MuxConfig;
use sonic_linkmgrd::db_interface::{DbConnections, RedisDbInterface, SubscriptionPoller};
use sonic_linkmgrd::mux_manager::MuxManager;

/// Fabric poll cadence, matching the classic 1s select timeout.
const POLL_INTERVAL_MS: u64 = 1000;

#[derive(Parser, Debug)]
#[command(name = "linkmgrd")]
#[command(about = "Dual-ToR MUX cable link manager", long_about = None)]
struct Args {
    /// Measure and publish switchover timing
    #[arg(short = 'm', long)]
    enable_switchover_measurement: bool,

    /// Gate prober transmission and health on default-route state
    #[arg(short = 'd', long)]
    enable_default_route: bool,

    /// Redis server hostname or IP
    #[arg(long, default_value = "127.0.0.1")]
    redis_host: String,

    /// Redis server port
    #[arg(long, default_value = "6379")]
    redis_port: u16,

    /// Initial log verbosity (trace, debug, info, warning, error)
    #[arg(short = 'v', long, default_value = "warning")]
    verbosity: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_handle = match logging::init(&args.verbosity) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("linkmgrd: failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut config = MuxConfig::default();
    config.enable_switchover_measurement = args.enable_switchover_measurement;
    config.enable_default_route_feature = args.enable_default_route;

    // One thread stays with the fabric poller and one with the writer.
    let workers = config.number_of_threads.saturating_sub(2).max(1) as usize;
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("linkmgrd: failed to build runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args, config, log_handle)) {
        Ok(()) => {
            info!("linkmgrd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "linkmgrd exiting with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    args: Args,
    config: MuxConfig,
    log_handle: logging::LogVerbosityHandle,
) -> MuxResult<()> {
    info!("--- Starting linkmgrd ---");

    let mut conns = DbConnections::connect(&args.redis_host, args.redis_port).await?;

    // Mandatory configuration; missing entries abort before any supervisor
    // is created.
    let tor_mac = conns.get_tor_mac_address().await?;
    info!(
        mac = %format_mac(&tor_mac),
        "ToR MAC address"
    );
    let loopback_ipv4 = conns.get_loopback2_ipv4().await?;
    info!(ip = %loopback_ipv4, "Probe source address");

    let seeds = conns.get_mux_port_seeds().await?;
    let warm_start = conns.is_warm_start().await;
    let warm_start_timer = if warm_start {
        conns.get_warm_start_timer().await
    } else {
        0
    };

    let mux_config = Arc::new(RwLock::new(config));
    let (notif_tx, notif_rx) = mpsc::unbounded_channel();
    let db = RedisDbInterface::spawn(conns.clone(), notif_tx.clone());

    let (mut manager, internal_rx) =
        MuxManager::new(Arc::clone(&mux_config), db, Some(log_handle));
    manager.seed_ports(seeds);
    if warm_start {
        manager
            .start_warm_restart_reconciliation(warm_start_timer)
            .await;
    }

    let poller = SubscriptionPoller::new(conns, notif_tx);
    tokio::spawn(poller.run(Duration::from_millis(POLL_INTERVAL_MS)));

    let shutdown_rx = spawn_signal_handlers();

    manager.run(notif_rx, internal_rx, shutdown_rx).await;
    Ok(())
}

/// SIGINT/SIGTERM request orderly shutdown; SIGUSR1/SIGUSR2 are caught,
/// logged and re-armed.
fn spawn_signal_handlers() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => info!("Got signal: SIGINT"),
            _ = sigterm.recv() => info!("Got signal: SIGTERM"),
        }
        let _ = shutdown_tx.send(true);
    });

    for kind in [SignalKind::user_defined1(), SignalKind::user_defined2()] {
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "Failed to install user signal handler");
                    return;
                }
            };
            while stream.recv().await.is_some() {
                info!("Got user signal, ignoring");
            }
        });
    }

    shutdown_rx
}

fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|octet| format!("{:02x}", octet))
        .collect::<Vec<_>>()
        .join(":")
}
