//! Diagnostics for the daemon.
//!
//! Tracing output always goes to stderr, because stdout carries the
//! notification lines.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use pfnotify_core::config::GeneralConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the stderr layer for `log_format` (`json` or `pretty`).
fn stderr_layer(log_format: &str) -> Result<BoxedLayer> {
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    match log_format {
        "json" => Ok(layer.json().boxed()),
        "pretty" => Ok(layer.pretty().boxed()),
        other => Err(anyhow::anyhow!(
            "unknown log format '{other}', expected 'json' or 'pretty'"
        )),
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `general.log_level`.
///
/// Fails if the format is unknown or a subscriber is already installed.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let layer = stderr_layer(&config.log_format)?;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize {} logging: {}", config.log_format, e))
}
