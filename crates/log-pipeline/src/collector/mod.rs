//! Line sources.
//!
//! - [`FileCollector`]: follows a growing log file (`tail -f` style)
//!
//! A collector runs in its own tokio task and hands each line to the pipeline
//! as a [`RawLog`] over a bounded `tokio::mpsc` channel.

pub mod file;

pub use file::{FileCollector, FileCollectorConfig};

use std::borrow::Cow;
use std::time::SystemTime;

use bytes::Bytes;

/// One raw line as read from a source.
#[derive(Debug, Clone)]
pub struct RawLog {
    /// Line bytes without the terminator
    pub data: Bytes,
    /// Source identifier, e.g. `file:/var/log/filter.log`
    pub source: String,
    pub received_at: SystemTime,
}

impl RawLog {
    pub fn new(data: Bytes, source: impl Into<String>) -> Self {
        Self {
            data,
            source: source.into(),
            received_at: SystemTime::now(),
        }
    }

    /// The line as text; invalid UTF-8 is replaced.
    pub fn line(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// Collector lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    Idle,
    Running,
    /// Stopped on an error
    Error(String),
    Stopped,
}
