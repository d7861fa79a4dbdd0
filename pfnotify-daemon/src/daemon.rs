//! Daemon assembly and lifecycle.
//!
//! [`Daemon`] validates the configuration, installs the metrics recorder,
//! builds the log pipeline and runs it next to the notification sink until a
//! shutdown signal arrives or the log follower stops.
//!
//! # Shutdown
//!
//! 1. the pipeline stops (follower, processor, resolver worker)
//! 2. the sink writes what is still queued and exits

use std::future::Future;
use std::path::Path;

use anyhow::Result;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pfnotify_core::config::PfnotifyConfig;
use pfnotify_core::pipeline::Pipeline;
use pfnotify_log_pipeline::{LogPipeline, LogPipelineBuilder, Notification, PipelineConfig};

use crate::{metrics_server, sink};

/// The assembled daemon.
pub struct Daemon {
    config: PfnotifyConfig,
    pipeline: LogPipeline,
    notifications: Option<mpsc::Receiver<Notification>>,
}

impl Daemon {
    /// Checks the configuration the way [`build_from_config`](Self::build_from_config)
    /// does, without building anything.
    pub fn check_config(config: &PfnotifyConfig) -> Result<()> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        PipelineConfig::from_core(config)
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
        if config.metrics.enabled {
            metrics_server::listen_address(&config.metrics)?;
        }
        Ok(())
    }

    /// Loads `pfnotify.toml` (with environment overrides) and builds the daemon.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = PfnotifyConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Builds from an already-loaded configuration.
    ///
    /// Installs the global metrics recorder when metrics are enabled.
    pub fn build_from_config(config: PfnotifyConfig) -> Result<Self> {
        Self::check_config(&config)?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let (pipeline, notifications) = LogPipelineBuilder::new()
            .config(PipelineConfig::from_core(&config))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {}", e))?;

        tracing::info!(
            log_file = %config.firewall_log.log_file,
            target = %config.notify.target,
            "daemon initialized"
        );

        Ok(Self {
            config,
            pipeline,
            notifications,
        })
    }

    /// Runs until SIGTERM/SIGINT, printing notifications to stdout.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal(), tokio::io::stdout())
            .await
            .map(|_| ())
    }

    /// Runs until `shutdown` resolves or the log follower stops.
    ///
    /// Notifications are written to `out`. Returns the number written.
    /// A daemon runs once; a second call fails.
    pub async fn run_until<F, W>(&mut self, shutdown: F, mut out: W) -> Result<u64>
    where
        F: Future<Output = Result<&'static str>>,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let rx = self
            .notifications
            .take()
            .ok_or_else(|| anyhow::anyhow!("daemon has already run"))?;

        let sink_cancel = CancellationToken::new();
        let target = self.config.notify.target.clone();
        let cancel = sink_cancel.clone();
        let sink_task =
            tokio::spawn(async move { sink::run(rx, &target, &mut out, cancel).await });

        if let Err(e) = self.pipeline.start().await {
            sink_cancel.cancel();
            let _ = sink_task.await;
            return Err(anyhow::anyhow!("failed to start log pipeline: {}", e));
        }

        tracing::info!("pfnotify-daemon running");

        let outcome = tokio::select! {
            signal = shutdown => {
                signal.map(|signal| tracing::info!(signal, "shutdown signal received"))
            }
            result = self.pipeline.wait() => match result {
                Ok(()) => {
                    tracing::warn!("log follower stopped");
                    Ok(())
                }
                Err(e) => Err(anyhow::anyhow!("log follower failed: {}", e)),
            },
        };

        if let Err(e) = self.pipeline.stop().await {
            tracing::error!(error = %e, "failed to stop log pipeline");
        }

        sink_cancel.cancel();
        let written = match sink_task.await {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => return Err(anyhow::anyhow!("notification sink failed: {}", e)),
            Err(e) => return Err(anyhow::anyhow!("notification sink task failed: {}", e)),
        };

        tracing::info!(
            lines = self.pipeline.processed_count(),
            notifications = written,
            "pfnotify-daemon shut down"
        );

        outcome.map(|()| written)
    }

    /// The loaded configuration.
    pub fn config(&self) -> &PfnotifyConfig {
        &self.config
    }
}

/// Waits for SIGTERM or SIGINT and returns the signal name.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Waits for Ctrl+C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl+C handler: {}", e))?;
    Ok("ctrl-c")
}
