//! Pipeline orchestration: follow, classify, enrich, notify.
//!
//! [`LogPipeline`] implements the core [`Pipeline`] trait so the daemon drives
//! it through the same start/stop/health_check lifecycle as any component.
//!
//! # Architecture
//! ```text
//! FileCollector -> mpsc<RawLog> -> LineProcessor -> mpsc<Notification> -> sink
//!                                     │    ^
//!                            resolve  │    │ Resolution (try_recv before formatting)
//!                                     v    │
//!                               ResolverService (one worker task)
//! ```
//!
//! Lines are processed one at a time. After classification each entry waits
//! out the grace period, picks up whatever lookups completed meanwhile and is
//! rendered. A lookup that finishes later is still cached for the next line
//! that mentions the address.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use pfnotify_core::error::{PfnotifyError, PipelineError};
use pfnotify_core::metrics as m;
use pfnotify_core::pipeline::{HealthStatus, Pipeline, VendorLookup};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::collector::{FileCollector, FileCollectorConfig, RawLog};
use crate::config::PipelineConfig;
use crate::entry::LogEntry;
use crate::error::LogPipelineError;
use crate::parser::{Classified, LineClassifier};
use crate::resolver::{
    HickoryReverseLookup, ResolutionCache, ResolutionReceiver, ResolutionSender, ResolverService,
    ReverseLookup, resolution_channel,
};
use crate::vendor::OuiVendorLookup;

/// Notification kind of the start announcement.
pub const STATUS_KIND: &str = "status";

/// A rendered entry on its way to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Display text
    pub text: String,
    /// Entry kind (`firewall`, `dhcp`, `unparsed`, `status`)
    pub kind: &'static str,
    /// Line source, e.g. `file:/var/log/pfsense.log`
    pub source: String,
    pub received_at: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Initialized,
    Running,
    Stopped,
}

/// Line counters shared with the processing task.
#[derive(Debug, Default)]
struct PipelineStats {
    lines: AtomicU64,
    suppressed: AtomicU64,
    parse_errors: AtomicU64,
    notifications: AtomicU64,
}

/// pfSense log pipeline.
///
/// # Example
/// ```ignore
/// use pfnotify_log_pipeline::{LogPipelineBuilder, PipelineConfig};
/// use pfnotify_core::pipeline::Pipeline;
///
/// let (mut pipeline, notifications) = LogPipelineBuilder::new()
///     .config(config)
///     .build()?;
/// pipeline.start().await?;
/// ```
pub struct LogPipeline {
    config: PipelineConfig,
    state: PipelineState,
    notify_tx: mpsc::Sender<Notification>,
    vendor_lookup: Option<Arc<dyn VendorLookup>>,
    reverse_lookup: Option<Arc<dyn ReverseLookup>>,
    resolver: Option<ResolverService>,
    cancel: CancellationToken,
    collector_task: Option<JoinHandle<Result<(), LogPipelineError>>>,
    processor_task: Option<JoinHandle<()>>,
    stats: Arc<PipelineStats>,
}

impl LogPipeline {
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// Lines read from the source.
    pub fn processed_count(&self) -> u64 {
        self.stats.lines.load(Ordering::Relaxed)
    }

    /// Lines dropped by an ignore pattern or the DHCP subtype filter.
    pub fn suppressed_count(&self) -> u64 {
        self.stats.suppressed.load(Ordering::Relaxed)
    }

    /// Lines skipped because they failed to parse or decode.
    pub fn parse_error_count(&self) -> u64 {
        self.stats.parse_errors.load(Ordering::Relaxed)
    }

    /// Notifications handed to the sink.
    pub fn notification_count(&self) -> u64 {
        self.stats.notifications.load(Ordering::Relaxed)
    }

    /// The resolution cache while running with reverse lookups enabled.
    pub fn resolver_cache(&self) -> Option<&ResolutionCache> {
        self.resolver.as_ref().map(ResolverService::cache)
    }

    /// Resolves when the line source stops.
    ///
    /// Returns the follower's error if it failed (e.g. the log file could not
    /// be read). Returns immediately if the pipeline is not running.
    /// Cancel-safe.
    pub async fn wait(&mut self) -> Result<(), LogPipelineError> {
        let Some(handle) = self.collector_task.as_mut() else {
            return Ok(());
        };
        let joined = handle.await;
        self.collector_task = None;
        match joined {
            Ok(result) => result,
            Err(e) => Err(LogPipelineError::Collector {
                source_type: format!("file:{}", self.config.log_file),
                reason: format!("collector task failed: {e}"),
            }),
        }
    }

    fn build_classifier(
        &self,
        resolver: Option<(ResolutionCache, ResolutionSender)>,
    ) -> Result<LineClassifier, LogPipelineError> {
        let mut builder = LineClassifier::builder()
            .max_line_length(self.config.max_line_length)
            .ignore_pattern_strs(&self.config.ignore_patterns)?;

        if let Some((cache, results)) = resolver {
            builder = builder.resolver(cache, Some(results));
        }

        if self.config.vendor_lookup {
            let lookup = self
                .vendor_lookup
                .clone()
                .unwrap_or_else(|| Arc::new(OuiVendorLookup::new()));
            builder = builder.vendor_lookup(lookup);
        }

        Ok(builder.build())
    }

    async fn start_inner(&mut self) -> Result<(), LogPipelineError> {
        tokio::fs::metadata(&self.config.log_file)
            .await
            .map_err(|e| LogPipelineError::Collector {
                source_type: format!("file:{}", self.config.log_file),
                reason: format!("cannot access log file: {e}"),
            })?;

        self.cancel = CancellationToken::new();

        let (resolver, results_rx) = if self.config.reverse_dns_lookup {
            let timeout = self.config.lookup_timeout();
            let lookup = self
                .reverse_lookup
                .clone()
                .unwrap_or_else(|| Arc::new(HickoryReverseLookup::from_system_conf(timeout)));
            let service = ResolverService::start(lookup, timeout);
            let (results_tx, results_rx) = resolution_channel();
            let cache = service.cache().clone();
            self.resolver = Some(service);
            (Some((cache, results_tx)), Some(results_rx))
        } else {
            (None, None)
        };

        let resolver_cache = resolver.as_ref().map(|(cache, _)| cache.clone());
        let classifier = self.build_classifier(resolver)?;

        let (line_tx, line_rx) = mpsc::channel(self.config.channel_capacity);
        let mut collector = FileCollector::new(
            FileCollectorConfig {
                path: self.config.log_file.clone().into(),
                poll_interval: self.config.poll_interval(),
                read_from_start: self.config.read_from_start,
                max_line_length: self.config.max_line_length,
            },
            line_tx,
            self.cancel.child_token(),
        );

        if self.config.announce_start {
            self.notify_tx
                .send(Notification {
                    text: format!("Following {}", self.config.log_file),
                    kind: STATUS_KIND,
                    source: collector.source().to_owned(),
                    received_at: SystemTime::now(),
                })
                .await
                .map_err(|e| LogPipelineError::Channel(e.to_string()))?;
        }

        self.collector_task = Some(tokio::spawn(async move { collector.run().await }));

        let processor = LineProcessor {
            classifier,
            resolver: resolver_cache,
            results: results_rx,
            delay: self.config.delay(),
            notify_tx: self.notify_tx.clone(),
            stats: Arc::clone(&self.stats),
            cancel: self.cancel.child_token(),
        };
        self.processor_task = Some(tokio::spawn(processor.run(line_rx)));

        Ok(())
    }

    async fn shutdown_tasks(&mut self) {
        self.cancel.cancel();

        if let Some(task) = self.processor_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "line processor task failed");
        }

        if let Some(task) = self.collector_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "file collector stopped with error"),
                Err(e) => warn!(error = %e, "file collector task failed"),
            }
        }

        if let Some(mut resolver) = self.resolver.take() {
            resolver.stop().await;
        }
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), PfnotifyError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(
            log_file = %self.config.log_file,
            reverse_dns_lookup = self.config.reverse_dns_lookup,
            delay_secs = self.config.delay_secs,
            "starting log pipeline"
        );

        if let Err(e) = self.start_inner().await {
            self.shutdown_tasks().await;
            return Err(PfnotifyError::Pipeline(PipelineError::InitFailed(
                e.to_string(),
            )));
        }

        self.state = PipelineState::Running;
        info!("log pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PfnotifyError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping log pipeline");
        self.shutdown_tasks().await;

        self.state = PipelineState::Stopped;
        info!(
            lines = self.processed_count(),
            notifications = self.notification_count(),
            "log pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                if self.collector_task.as_ref().is_none_or(|t| t.is_finished()) {
                    return HealthStatus::Unhealthy("log follower stopped".to_owned());
                }
                if self.resolver.as_ref().is_some_and(|r| !r.is_running()) {
                    return HealthStatus::Degraded("resolver worker stopped".to_owned());
                }
                HealthStatus::Healthy
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// Consumes lines and emits notifications, one line at a time.
struct LineProcessor {
    classifier: LineClassifier,
    resolver: Option<ResolutionCache>,
    results: Option<ResolutionReceiver>,
    delay: Duration,
    notify_tx: mpsc::Sender<Notification>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
}

impl LineProcessor {
    async fn run(mut self, mut lines: mpsc::Receiver<RawLog>) {
        debug!("line processor started");
        loop {
            let raw = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                raw = lines.recv() => match raw {
                    Some(raw) => raw,
                    None => break,
                },
            };

            if !self.process(raw).await {
                break;
            }
        }
        debug!("line processor stopped");
    }

    /// Handles one line. Returns `false` when processing must stop.
    async fn process(&mut self, raw: RawLog) -> bool {
        self.stats.lines.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::LOG_PIPELINE_LINES_TOTAL).increment(1);

        let line = raw.line();
        let mut entry = match self.classifier.classify(&line) {
            Ok(Classified::Entry(entry)) => entry,
            Ok(Classified::Suppressed(reason)) => {
                trace!(reason = reason.label(), "line suppressed");
                self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::LOG_PIPELINE_LINES_SUPPRESSED_TOTAL, m::LABEL_KIND => reason.label())
                    .increment(1);
                return true;
            }
            Err(e) => {
                warn!(source = %raw.source, error = %e, "skipping line");
                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::LOG_PIPELINE_PARSE_ERRORS_TOTAL, m::LABEL_ERROR => e.label())
                    .increment(1);
                return true;
            }
        };

        if !self.delay.is_zero() {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = tokio::time::sleep(self.delay) => {}
            }
        }

        self.apply_resolutions(&mut entry);

        let kind = entry.kind();
        let notification = Notification {
            text: entry.to_string(),
            kind,
            source: raw.source.clone(),
            received_at: raw.received_at,
        };

        if self.notify_tx.send(notification).await.is_err() {
            warn!("notification receiver closed, stopping line processor");
            return false;
        }

        self.stats.notifications.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::LOG_PIPELINE_NOTIFICATIONS_TOTAL, m::LABEL_KIND => kind).increment(1);
        true
    }

    /// Applies every lookup result that arrived, then falls back to the cache
    /// for addresses still without a hostname.
    fn apply_resolutions(&mut self, entry: &mut LogEntry) {
        if let Some(results) = self.results.as_mut() {
            while let Ok(resolution) = results.try_recv() {
                if let Some(firewall) = entry.as_firewall_mut() {
                    firewall.apply_resolution(&resolution);
                }
            }
        }

        if let (Some(firewall), Some(cache)) = (entry.as_firewall_mut(), self.resolver.as_ref()) {
            if firewall.source_hostname.is_none() {
                firewall.source_hostname = cache.peek(&firewall.source_address);
            }
            if firewall.destination_hostname.is_none() {
                firewall.destination_hostname = cache.peek(&firewall.destination_address);
            }
        }
    }
}

/// Builder for [`LogPipeline`].
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    notify_tx: Option<mpsc::Sender<Notification>>,
    vendor_lookup: Option<Arc<dyn VendorLookup>>,
    reverse_lookup: Option<Arc<dyn ReverseLookup>>,
}

impl LogPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            notify_tx: None,
            vendor_lookup: None,
            reverse_lookup: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sends notifications to an existing channel.
    ///
    /// Without it the builder creates a channel and returns its receiver.
    pub fn notification_sender(mut self, tx: mpsc::Sender<Notification>) -> Self {
        self.notify_tx = Some(tx);
        self
    }

    /// Replaces the bundled OUI database lookup.
    pub fn vendor_lookup(mut self, lookup: Arc<dyn VendorLookup>) -> Self {
        self.vendor_lookup = Some(lookup);
        self
    }

    /// Replaces the system DNS resolver.
    pub fn reverse_lookup(mut self, lookup: Arc<dyn ReverseLookup>) -> Self {
        self.reverse_lookup = Some(lookup);
        self
    }

    /// Builds the pipeline.
    ///
    /// Returns the notification receiver unless
    /// [`notification_sender`](Self::notification_sender) was set.
    pub fn build(
        self,
    ) -> Result<(LogPipeline, Option<mpsc::Receiver<Notification>>), LogPipelineError> {
        self.config.validate()?;

        let (notify_tx, notify_rx) = match self.notify_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.config.channel_capacity);
                (tx, Some(rx))
            }
        };

        let pipeline = LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            notify_tx,
            vendor_lookup: self.vendor_lookup,
            reverse_lookup: self.reverse_lookup,
            resolver: None,
            cancel: CancellationToken::new(),
            collector_task: None,
            processor_task: None,
            stats: Arc::new(PipelineStats::default()),
        };

        Ok((pipeline, notify_rx))
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
