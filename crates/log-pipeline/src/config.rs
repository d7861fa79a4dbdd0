//! Log pipeline settings.
//!
//! [`PipelineConfig`] flattens the parts of
//! [`PfnotifyConfig`](pfnotify_core::config::PfnotifyConfig) the pipeline uses.
//!
//! # Example
//! ```ignore
//! use pfnotify_core::config::PfnotifyConfig;
//! use pfnotify_log_pipeline::config::PipelineConfig;
//!
//! let core_config = PfnotifyConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::path::{Component, Path};
use std::time::Duration;

use pfnotify_core::config::PfnotifyConfig;
use serde::{Deserialize, Serialize};

use crate::error::LogPipelineError;

/// Upper bound on the grace period before a line is formatted.
const MAX_DELAY_SECS: u64 = 300;
/// Upper bound on the line channel capacity.
const MAX_CHANNEL_CAPACITY: usize = 1_000_000;

/// Log pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Log file to follow
    pub log_file: String,
    /// Seconds to wait before formatting an entry, giving lookups time to finish
    pub delay_secs: u64,
    /// Reverse-resolve firewall addresses
    pub reverse_dns_lookup: bool,
    /// Annotate DHCP records with the MAC vendor
    pub vendor_lookup: bool,
    /// Regular expressions; matching lines are dropped
    pub ignore_patterns: Vec<String>,
    pub poll_interval_ms: u64,
    /// Start at the beginning of the file instead of its end
    pub read_from_start: bool,
    pub max_line_length: usize,
    /// Capacity of the line and notification channels
    pub channel_capacity: usize,
    /// Bound on a single reverse lookup
    pub lookup_timeout_ms: u64,
    /// Emit a notification when following starts
    pub announce_start: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_file: "/var/log/pfsense.log".to_owned(),
            delay_secs: 2,
            reverse_dns_lookup: true,
            vendor_lookup: true,
            ignore_patterns: Vec::new(),
            poll_interval_ms: 500,
            read_from_start: false,
            max_line_length: 64 * 1024,
            channel_capacity: 1024,
            lookup_timeout_ms: 5000,
            announce_start: true,
        }
    }
}

impl PipelineConfig {
    /// Builds the pipeline settings from the daemon configuration.
    pub fn from_core(core: &PfnotifyConfig) -> Self {
        let log = &core.firewall_log;
        Self {
            log_file: log.log_file.clone(),
            delay_secs: log.delay_secs,
            reverse_dns_lookup: log.reverse_dns_lookup,
            vendor_lookup: log.vendor_lookup,
            ignore_patterns: log.ignore_patterns.clone(),
            poll_interval_ms: log.poll_interval_ms,
            read_from_start: log.read_from_start,
            max_line_length: log.max_line_length,
            channel_capacity: log.channel_capacity,
            lookup_timeout_ms: core.resolver.lookup_timeout_ms,
            announce_start: core.notify.announce_start,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Rejects empty, relative or `..`-containing paths.
    fn validate_log_file(path_str: &str) -> Result<(), LogPipelineError> {
        if path_str.is_empty() {
            return Err(LogPipelineError::Config {
                field: "log_file".to_owned(),
                reason: "log file must not be empty".to_owned(),
            });
        }

        let path = Path::new(path_str);
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(LogPipelineError::Config {
                field: "log_file".to_owned(),
                reason: format!("log file '{path_str}' contains path traversal pattern '..'"),
            });
        }

        if !path.is_absolute() {
            return Err(LogPipelineError::Config {
                field: "log_file".to_owned(),
                reason: format!("log file '{path_str}' must be an absolute path"),
            });
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), LogPipelineError> {
        Self::validate_log_file(&self.log_file)?;

        if self.delay_secs > MAX_DELAY_SECS {
            return Err(LogPipelineError::Config {
                field: "delay_secs".to_owned(),
                reason: format!("must be 0-{MAX_DELAY_SECS}"),
            });
        }

        if self.poll_interval_ms == 0 {
            return Err(LogPipelineError::Config {
                field: "poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_line_length == 0 {
            return Err(LogPipelineError::Config {
                field: "max_line_length".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(LogPipelineError::Config {
                field: "channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            });
        }

        if self.reverse_dns_lookup && self.lookup_timeout_ms == 0 {
            return Err(LogPipelineError::Config {
                field: "lookup_timeout_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        for (idx, pattern) in self.ignore_patterns.iter().enumerate() {
            regex::Regex::new(pattern).map_err(|e| LogPipelineError::Config {
                field: format!("ignore_patterns[{idx}]"),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_file(mut self, path: impl Into<String>) -> Self {
        self.config.log_file = path.into();
        self
    }

    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.config.delay_secs = secs;
        self
    }

    pub fn reverse_dns_lookup(mut self, enabled: bool) -> Self {
        self.config.reverse_dns_lookup = enabled;
        self
    }

    pub fn vendor_lookup(mut self, enabled: bool) -> Self {
        self.config.vendor_lookup = enabled;
        self
    }

    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn read_from_start(mut self, enabled: bool) -> Self {
        self.config.read_from_start = enabled;
        self
    }

    pub fn lookup_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lookup_timeout_ms = ms;
        self
    }

    pub fn announce_start(mut self, enabled: bool) -> Self {
        self.config.announce_start = enabled;
        self
    }

    /// Validates and returns the settings.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
