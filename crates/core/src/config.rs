//! Configuration: `pfnotify.toml` parsing and runtime settings.
//!
//! [`PfnotifyConfig`] is the top-level structure; each component reads its
//! own section.
//!
//! # Precedence
//! 1. CLI arguments (applied by the daemon)
//! 2. Environment variables (`PFNOTIFY_FIREWALL_LOG_DELAY_SECS=5`)
//! 3. Config file (`pfnotify.toml`)
//! 4. Defaults (`Default` impls)
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), pfnotify_core::error::PfnotifyError> {
//! use pfnotify_core::config::PfnotifyConfig;
//!
//! // file + env overrides + validation
//! let config = PfnotifyConfig::load("pfnotify.toml").await?;
//!
//! // straight from a TOML string
//! let config = PfnotifyConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PfnotifyError};

/// Top-level pfnotify configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PfnotifyConfig {
    /// Logging
    #[serde(default)]
    pub general: GeneralConfig,
    /// Followed log file, classification and grace period
    #[serde(default)]
    pub firewall_log: FirewallLogConfig,
    /// Reverse DNS resolution
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Notification sink
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl PfnotifyConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PfnotifyError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file without environment overrides or validation.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PfnotifyError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PfnotifyError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PfnotifyError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, PfnotifyError> {
        toml::from_str(toml_str).map_err(|e| {
            PfnotifyError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Applies environment overrides.
    ///
    /// Naming: `PFNOTIFY_{SECTION}_{FIELD}`, e.g. `PFNOTIFY_RESOLVER_LOOKUP_TIMEOUT_MS=2000`.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PFNOTIFY_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PFNOTIFY_GENERAL_LOG_FORMAT");

        // Firewall log
        override_string(
            &mut self.firewall_log.log_file,
            "PFNOTIFY_FIREWALL_LOG_LOG_FILE",
        );
        override_u64(
            &mut self.firewall_log.delay_secs,
            "PFNOTIFY_FIREWALL_LOG_DELAY_SECS",
        );
        override_bool(
            &mut self.firewall_log.reverse_dns_lookup,
            "PFNOTIFY_FIREWALL_LOG_REVERSE_DNS_LOOKUP",
        );
        override_bool(
            &mut self.firewall_log.vendor_lookup,
            "PFNOTIFY_FIREWALL_LOG_VENDOR_LOOKUP",
        );
        override_csv(
            &mut self.firewall_log.ignore_patterns,
            "PFNOTIFY_FIREWALL_LOG_IGNORE_PATTERNS",
        );
        override_u64(
            &mut self.firewall_log.poll_interval_ms,
            "PFNOTIFY_FIREWALL_LOG_POLL_INTERVAL_MS",
        );
        override_bool(
            &mut self.firewall_log.read_from_start,
            "PFNOTIFY_FIREWALL_LOG_READ_FROM_START",
        );
        override_usize(
            &mut self.firewall_log.max_line_length,
            "PFNOTIFY_FIREWALL_LOG_MAX_LINE_LENGTH",
        );
        override_usize(
            &mut self.firewall_log.channel_capacity,
            "PFNOTIFY_FIREWALL_LOG_CHANNEL_CAPACITY",
        );

        // Resolver
        override_u64(
            &mut self.resolver.lookup_timeout_ms,
            "PFNOTIFY_RESOLVER_LOOKUP_TIMEOUT_MS",
        );

        // Notify
        override_string(&mut self.notify.target, "PFNOTIFY_NOTIFY_TARGET");
        override_bool(
            &mut self.notify.announce_start,
            "PFNOTIFY_NOTIFY_ANNOUNCE_START",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "PFNOTIFY_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "PFNOTIFY_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "PFNOTIFY_METRICS_PORT");
    }

    /// Validates field values.
    pub fn validate(&self) -> Result<(), PfnotifyError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.firewall_log.log_file.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "firewall_log.log_file".to_owned(),
                reason: "log file must not be empty".to_owned(),
            }
            .into());
        }

        for (idx, pattern) in self.firewall_log.ignore_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(ConfigError::InvalidValue {
                    field: format!("firewall_log.ignore_patterns[{idx}]"),
                    reason: e.to_string(),
                }
                .into());
            }
        }

        if self.firewall_log.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "firewall_log.poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.firewall_log.max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "firewall_log.max_line_length".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.firewall_log.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "firewall_log.channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.resolver.lookup_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.lookup_timeout_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port".to_owned(),
                reason: "port must not be 0 when metrics are enabled".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// Followed log file and line processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallLogConfig {
    /// pfSense log file to follow
    pub log_file: String,
    /// Grace period before formatting, giving the resolver time to answer (seconds)
    pub delay_secs: u64,
    /// Reverse-resolve source and destination addresses
    pub reverse_dns_lookup: bool,
    /// Annotate DHCP entries with the MAC vendor
    pub vendor_lookup: bool,
    /// Regular expressions; a matching line is dropped before parsing
    pub ignore_patterns: Vec<String>,
    /// File poll interval (milliseconds)
    pub poll_interval_ms: u64,
    /// Read the existing file content instead of starting at its end
    pub read_from_start: bool,
    /// Longer lines are truncated (bytes)
    pub max_line_length: usize,
    /// Capacity of the follower -> pipeline channel
    pub channel_capacity: usize,
}

impl Default for FirewallLogConfig {
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
        }
    }
}

/// Reverse DNS resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound for a single PTR lookup (milliseconds)
    pub lookup_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 5000,
        }
    }
}

/// Notification sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Free-form destination identifier attached to each notification
    pub target: String,
    /// Send a notification when the follower starts
    pub announce_start: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            target: "#bots".to_owned(),
            announce_start: true,
        }
    }
}

/// Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the endpoint
    pub enabled: bool,
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub port: u16,
    /// Scrape path
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- env override helpers ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
