//! pfnotify daemon library.
//!
//! Exposes the daemon's building blocks for integration testing.
//! In production, `pfnotify-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod daemon;
pub mod logging;
pub mod metrics_server;
pub mod sink;

pub use daemon::Daemon;
