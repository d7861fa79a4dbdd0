//! Error types shared across the workspace.

/// Top-level pfnotify error.
#[derive(Debug, thiserror::Error)]
pub enum PfnotifyError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline lifecycle or channel error
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Log line parse error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file does not exist
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// TOML could not be parsed
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds an invalid value
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Sending on a channel failed
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// Receiving from a channel failed
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// Pipeline could not be initialised
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// `start()` called on a running pipeline
    #[error("pipeline already running")]
    AlreadyRunning,

    /// `stop()` called on a pipeline that is not running
    #[error("pipeline not running")]
    NotRunning,
}

/// Parse errors.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Unsupported input format
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Parsing failed
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },

    /// Input exceeds the size limit
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// Failure of a [`VendorLookup`](crate::pipeline::VendorLookup).
///
/// Callers never propagate this; a failed lookup is rendered as
/// `unknown vendor`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VendorLookupError {
    /// The OUI is not in the database
    #[error("no vendor registered for {mac}")]
    NotFound { mac: String },

    /// The MAC address could not be parsed
    #[error("invalid mac address '{mac}'")]
    InvalidMac { mac: String },

    /// The vendor database is unavailable
    #[error("vendor database unavailable: {0}")]
    Unavailable(String),
}
