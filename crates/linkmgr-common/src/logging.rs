//! Tracing setup with runtime verbosity reload.
//!
//! The `MUXLOGGER.log_verbosity` tunable maps onto a reloadable
//! `EnvFilter`, so operators can raise verbosity on a live daemon.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

use crate::error::{MuxError, MuxResult};

/// Handle for changing the active log level at runtime.
pub struct LogVerbosityHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogVerbosityHandle {
    /// Applies a fabric verbosity string.
    pub fn set_verbosity(&self, verbosity: &str) -> MuxResult<()> {
        let directive = level_directive(verbosity)?;
        self.handle
            .reload(EnvFilter::new(directive))
            .map_err(|e| MuxError::internal(format!("failed to reload log filter: {}", e)))
    }
}

/// Maps the fabric verbosity vocabulary onto tracing levels.
fn level_directive(verbosity: &str) -> MuxResult<&'static str> {
    match verbosity {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warning" => Ok("warn"),
        "error" | "fatal" => Ok("error"),
        other => Err(MuxError::invalid_input(
            "log_verbosity",
            format!("unknown verbosity: {}", other),
        )),
    }
}

/// Installs the global subscriber. Call once at startup.
pub fn init(verbosity: &str) -> MuxResult<LogVerbosityHandle> {
    let directive = level_directive(verbosity)?;
    let (filter, handle) = reload::Layer::new(EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false),
        )
        .try_init()
        .map_err(|e| MuxError::internal(format!("failed to set subscriber: {}", e)))?;

    Ok(LogVerbosityHandle { handle })
}
