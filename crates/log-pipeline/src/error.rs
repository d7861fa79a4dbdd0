//! Log pipeline error types.
//!
//! [`LogPipelineError`] covers everything that can fail inside the pipeline.
//! `From<LogPipelineError> for PfnotifyError` lets upper layers propagate it
//! with `?`.
//!
//! Per-line failures ([`LogPipelineError::is_line_error`]) are isolated to the
//! offending line: the pipeline logs them and moves on.

use pfnotify_core::error::{ConfigError, ParseError, PfnotifyError, PipelineError};

/// Log pipeline domain error.
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// Malformed syslog envelope
    #[error("parse error: {format} at offset {offset}: {reason}")]
    Parse {
        /// Envelope format (syslog)
        format: String,
        /// Byte offset of the failure
        offset: usize,
        /// Failure reason
        reason: String,
    },

    /// Malformed firewall payload
    #[error("decode error: field '{field}': {reason}")]
    Decode {
        /// Field that could not be consumed
        field: &'static str,
        /// Failure reason
        reason: String,
    },

    /// Firewall record for an IP version other than 4
    #[error("decode error: unsupported ip version {0}")]
    UnsupportedIpVersion(u8),

    /// Line source failure (file I/O)
    #[error("collector error: {source_type}: {reason}")]
    Collector {
        /// Source kind (file)
        source_type: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid configuration
    #[error("config error: {field}: {reason}")]
    Config {
        /// Config field
        field: String,
        /// Failure reason
        reason: String,
    },

    /// Channel closed
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex compilation error
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl LogPipelineError {
    /// Returns `true` for failures confined to a single input line.
    pub fn is_line_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Decode { .. } | Self::UnsupportedIpVersion(_)
        )
    }

    /// Metric label for per-line failures.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Decode { .. } | Self::UnsupportedIpVersion(_) => "decode",
            Self::Collector { .. } => "collector",
            Self::Config { .. } => "config",
            Self::Channel(_) => "channel",
            Self::Io(_) => "io",
            Self::Regex(_) => "regex",
        }
    }
}

impl From<LogPipelineError> for PfnotifyError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Parse { offset, reason, .. } => {
                PfnotifyError::Parse(ParseError::Failed { offset, reason })
            }
            err @ (LogPipelineError::Decode { .. } | LogPipelineError::UnsupportedIpVersion(_)) => {
                PfnotifyError::Parse(ParseError::Failed {
                    offset: 0,
                    reason: err.to_string(),
                })
            }
            LogPipelineError::Config { field, reason } => {
                PfnotifyError::Config(ConfigError::InvalidValue { field, reason })
            }
            LogPipelineError::Io(e) => PfnotifyError::Io(e),
            other => PfnotifyError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}
