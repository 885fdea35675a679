//! Common infrastructure for the SONiC MUX link manager daemon.
//!
//! This crate carries the pieces of linkmgrd that are not specific to any
//! one state machine:
//!
//! - [`error`]: the daemon-wide error taxonomy
//! - [`logging`]: tracing setup with runtime verbosity reload
//!
//! Startup distinguishes fatal errors (mandatory configuration missing)
//! from conditions the daemon degrades through while it keeps observing;
//! see [`MuxError::is_fatal`].

pub mod error;
pub mod logging;

pub use error::{MuxError, MuxResult};
pub use logging::LogVerbosityHandle;
