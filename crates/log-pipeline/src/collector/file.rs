//! File follower.
//!
//! Polls a log file and emits every newly appended complete line, like
//! `tail -f`.
//!
//! # Rotation
//! - inode change (logrotate moved the file away): reopen from the start
//! - size smaller than the read offset (truncation): rewind to the start
//!
//! A line without its terminating newline is held back until the newline
//! arrives. At most `max_line_length` bytes of a line are buffered; the rest
//! is skipped up to the next newline.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CollectorStatus, RawLog};
use crate::error::LogPipelineError;

/// File follower settings.
#[derive(Debug, Clone)]
pub struct FileCollectorConfig {
    /// File to follow
    pub path: PathBuf,
    /// Delay between checks for new data
    pub poll_interval: Duration,
    /// Start at the beginning of the file instead of its current end
    pub read_from_start: bool,
    /// Longer lines are cut to this many bytes
    pub max_line_length: usize,
}

impl Default for FileCollectorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/pfsense.log"),
            poll_interval: Duration::from_millis(500),
            read_from_start: false,
            max_line_length: 64 * 1024,
        }
    }
}

/// Read position in the followed file.
#[derive(Debug)]
struct FileState {
    reader: BufReader<File>,
    offset: u64,
    #[cfg(unix)]
    inode: Option<u64>,
    /// Bytes of a line whose newline has not arrived yet
    partial: Vec<u8>,
    /// Bytes of the current line skipped past the length limit
    skipped: usize,
}

/// Follows one log file until cancelled.
pub struct FileCollector {
    config: FileCollectorConfig,
    tx: mpsc::Sender<RawLog>,
    cancel: CancellationToken,
    source: String,
    status: CollectorStatus,
}

impl FileCollector {
    pub fn new(
        config: FileCollectorConfig,
        tx: mpsc::Sender<RawLog>,
        cancel: CancellationToken,
    ) -> Self {
        let source = format!("file:{}", config.path.display());
        Self {
            config,
            tx,
            cancel,
            source,
            status: CollectorStatus::Idle,
        }
    }

    /// Follows the file until cancelled or the receiver is dropped.
    ///
    /// Fails if the file cannot be opened at start or a read fails.
    /// Run it in its own task with `tokio::spawn`.
    pub async fn run(&mut self) -> Result<(), LogPipelineError> {
        let result = self.follow().await;
        self.status = match &result {
            Ok(()) => CollectorStatus::Stopped,
            Err(e) => CollectorStatus::Error(e.to_string()),
        };
        result
    }

    async fn follow(&mut self) -> Result<(), LogPipelineError> {
        let mut state = self.open(!self.config.read_from_start).await?;
        self.status = CollectorStatus::Running;
        info!(
            path = %self.config.path.display(),
            offset = state.offset,
            "following log file"
        );

        loop {
            if !self.read_available(&mut state).await? {
                debug!(path = %self.config.path.display(), "line receiver closed");
                return Ok(());
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!(path = %self.config.path.display(), "file collector cancelled");
                    return Ok(());
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }

            self.check_rotation(&mut state).await?;
        }
    }

    async fn open(&self, seek_to_end: bool) -> Result<FileState, LogPipelineError> {
        let file = File::open(&self.config.path)
            .await
            .map_err(|e| self.collector_error(format!("cannot open: {e}")))?;
        let metadata = file.metadata().await?;

        let mut reader = BufReader::new(file);
        let offset = if seek_to_end {
            reader.seek(SeekFrom::End(0)).await?
        } else {
            0
        };

        Ok(FileState {
            reader,
            offset,
            #[cfg(unix)]
            inode: inode_of(&metadata),
            partial: Vec::new(),
            skipped: 0,
        })
    }

    /// Emits every complete line currently available.
    ///
    /// Returns `false` once the receiver is gone or cancellation was requested.
    async fn read_available(&self, state: &mut FileState) -> Result<bool, LogPipelineError> {
        // room for the line plus a CRLF terminator
        let cap = self.config.max_line_length + 2;

        loop {
            let buf = state.reader.fill_buf().await?;
            if buf.is_empty() {
                // EOF, possibly in the middle of a line
                return Ok(true);
            }

            let (chunk, complete) = match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => (&buf[..=pos], true),
                None => (buf, false),
            };
            let used = chunk.len();
            let keep = used.min(cap.saturating_sub(state.partial.len()));
            state.partial.extend_from_slice(&chunk[..keep]);
            state.skipped += used - keep;
            state.reader.consume(used);
            state.offset += used as u64;

            if !complete {
                continue;
            }

            let line = self.take_line(state);
            if line.is_empty() {
                continue;
            }

            let raw = RawLog::new(line, self.source.clone());
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(false),
                sent = self.tx.send(raw) => {
                    if sent.is_err() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Drains the buffered line, stripping the terminator and enforcing the
    /// length limit.
    fn take_line(&self, state: &mut FileState) -> Bytes {
        let mut line = std::mem::take(&mut state.partial);
        let skipped = std::mem::take(&mut state.skipped);
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if skipped > 0 || line.len() > self.config.max_line_length {
            warn!(
                path = %self.config.path.display(),
                len = line.len() + skipped,
                max = self.config.max_line_length,
                "line truncated"
            );
            line.truncate(self.config.max_line_length);
        }
        Bytes::from(line)
    }

    async fn check_rotation(&self, state: &mut FileState) -> Result<(), LogPipelineError> {
        let metadata = match tokio::fs::metadata(&self.config.path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                // mid-rotation: keep reading the old handle until the new file appears
                debug!(path = %self.config.path.display(), error = %e, "log file missing");
                return Ok(());
            }
        };

        #[cfg(unix)]
        {
            let inode = inode_of(&metadata);
            if inode.is_some() && inode != state.inode {
                info!(path = %self.config.path.display(), "log file rotated, reopening");
                *state = self.open(false).await?;
                return Ok(());
            }
        }

        if metadata.len() < state.offset {
            info!(
                path = %self.config.path.display(),
                size = metadata.len(),
                offset = state.offset,
                "log file truncated, rewinding"
            );
            state.reader.seek(SeekFrom::Start(0)).await?;
            state.offset = 0;
            state.partial.clear();
            state.skipped = 0;
        }

        Ok(())
    }

    fn collector_error(&self, reason: String) -> LogPipelineError {
        LogPipelineError::Collector {
            source_type: self.source.clone(),
            reason,
        }
    }

    pub fn status(&self) -> &CollectorStatus {
        &self.status
    }

    /// Source identifier stamped on every emitted line.
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}
