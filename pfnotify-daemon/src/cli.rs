//! CLI argument definitions for pfnotify-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use pfnotify_core::config::PfnotifyConfig;

/// pfSense log notifier.
///
/// Follows the pfSense log file, decodes firewall and DHCP records, resolves
/// addresses and prints one notification per accepted line.
#[derive(Parser, Debug)]
#[command(name = "pfnotify-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to pfnotify.toml configuration file.
    #[arg(short, long, default_value = "/etc/pfnotify/pfnotify.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the followed pfSense log file.
    #[arg(long)]
    pub log_file: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Applies the command-line overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut PfnotifyConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.firewall_log.log_file = log_file.clone();
        }
    }
}
