//! Lifecycle and capability traits shared by the pipeline and the daemon.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::{PfnotifyError, VendorLookupError};

/// Boxed, sendable future for dyn-compatible async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Health of a running component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Operating normally
    Healthy,
    /// Running with reduced functionality
    Degraded(String),
    /// Not operating
    Unhealthy(String),
}

impl HealthStatus {
    /// Returns `true` for [`HealthStatus::Healthy`].
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Returns `true` for [`HealthStatus::Unhealthy`].
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// A long-running component with an explicit start/stop lifecycle.
///
/// ```text
/// Initialized -> start() -> Running -> stop() -> Stopped
/// ```
pub trait Pipeline: Send {
    /// Spawns the background tasks. Fails if already running.
    fn start(&mut self) -> impl Future<Output = Result<(), PfnotifyError>> + Send;

    /// Stops the background tasks. Fails if not running.
    fn stop(&mut self) -> impl Future<Output = Result<(), PfnotifyError>> + Send;

    /// Reports the current health.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// MAC address to hardware vendor lookup.
///
/// Injected into the DHCP decoder. Implementations must be cheap to call from
/// the line-processing path.
pub trait VendorLookup: Send + Sync {
    /// Returns the vendor name registered for the OUI of `mac`.
    fn vendor(&self, mac: &str) -> Result<String, VendorLookupError>;
}
