//! Memoizing reverse DNS resolution.
//!
//! # Architecture
//! ```text
//! producer ── resolve(ip) ──> ResolutionCache ── ResolveJob ──> ResolverWorker
//!    ^                        (DashMap states)                    │ lookup (timeout)
//!    │                              ^                             │
//!    │                              └──── Resolved / Failed ──────┤
//!    └──────────── Resolution { ip, hostname } (result channel) ──┘
//! ```
//!
//! Each address moves through `absent -> Queued -> Resolved | Failed`. The
//! terminal states are never left: a failed address is not retried for the
//! lifetime of the cache.

mod lookup;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use pfnotify_core::metrics as m;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use lookup::{HickoryReverseLookup, LookupError, ReverseLookup, trim_root};
pub use worker::ResolverWorker;

/// Per-address resolution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// A job is waiting for or inside the worker
    Queued,
    /// Lookup succeeded
    Resolved(String),
    /// Lookup failed; never retried
    Failed,
}

impl CacheState {
    /// Hostname for [`CacheState::Resolved`].
    pub fn hostname(&self) -> Option<&str> {
        match self {
            Self::Resolved(hostname) => Some(hostname),
            _ => None,
        }
    }

    /// Returns `true` for `Resolved` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued)
    }
}

/// Outcome of a lookup, posted back to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub ip: String,
    /// `None` when the lookup failed
    pub hostname: Option<String>,
}

/// Sending half of a requester's result channel.
pub type ResolutionSender = mpsc::UnboundedSender<Resolution>;
/// Receiving half of a requester's result channel.
pub type ResolutionReceiver = mpsc::UnboundedReceiver<Resolution>;

/// Creates a result channel for [`ResolutionCache::resolve`].
pub fn resolution_channel() -> (ResolutionSender, ResolutionReceiver) {
    mpsc::unbounded_channel()
}

/// A pending lookup.
#[derive(Debug)]
pub struct ResolveJob {
    pub ip: String,
    /// Where to post the outcome, if anywhere
    pub notify: Option<ResolutionSender>,
}

/// Shared address -> state map plus the job queue feeding the worker.
///
/// Cloning is cheap; all clones see the same states and feed the same worker.
#[derive(Debug, Clone)]
pub struct ResolutionCache {
    states: Arc<DashMap<String, CacheState>>,
    jobs: mpsc::UnboundedSender<ResolveJob>,
}

impl ResolutionCache {
    /// Creates a cache and the receiving end of its job queue.
    ///
    /// [`ResolverService::start`] wires the receiver to a worker; tests may
    /// hold it directly to inspect queued jobs.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResolveJob>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        let cache = Self {
            states: Arc::new(DashMap::new()),
            jobs,
        };
        (cache, rx)
    }

    /// Returns the cached hostname for `ip`, queueing a lookup on first sight.
    ///
    /// Never blocks. While a lookup is pending, repeated calls return `None`
    /// without queueing another job. `notify` receives the outcome of the job
    /// queued by this call; it is ignored if a job already exists.
    pub fn resolve(&self, ip: &str, notify: Option<&ResolutionSender>) -> Option<String> {
        if let Some(state) = self.states.get(ip) {
            return state.hostname().map(str::to_owned);
        }

        match self.states.entry(ip.to_owned()) {
            Entry::Occupied(entry) => return entry.get().hostname().map(str::to_owned),
            Entry::Vacant(entry) => {
                let job = ResolveJob {
                    ip: ip.to_owned(),
                    notify: notify.cloned(),
                };
                if self.jobs.send(job).is_err() {
                    debug!(ip, "resolver worker stopped, lookup not queued");
                    return None;
                }
                entry.insert(CacheState::Queued);
            }
        }

        // len() locks every shard, so only after the entry guard is gone
        metrics::gauge!(m::RESOLVER_QUEUE_DEPTH).increment(1.0);
        metrics::gauge!(m::RESOLVER_CACHE_ENTRIES).set(self.states.len() as f64);
        None
    }

    /// Returns the hostname if `ip` is already resolved. Never queues a lookup.
    pub fn peek(&self, ip: &str) -> Option<String> {
        self.states
            .get(ip)
            .and_then(|state| state.hostname().map(str::to_owned))
    }

    /// Current state of `ip`, if it has been seen.
    pub fn state(&self, ip: &str) -> Option<CacheState> {
        self.states.get(ip).map(|state| state.clone())
    }

    /// Number of addresses seen.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub(crate) fn states(&self) -> Arc<DashMap<String, CacheState>> {
        Arc::clone(&self.states)
    }
}

/// Owns the cache and its single worker task.
///
/// Dropping the service without calling [`ResolverService::stop`] leaves the
/// worker running until its job queue closes.
pub struct ResolverService {
    cache: ResolutionCache,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ResolverService {
    /// Creates the cache and spawns the worker on the current runtime.
    pub fn start(lookup: Arc<dyn ReverseLookup>, lookup_timeout: Duration) -> Self {
        let (cache, jobs) = ResolutionCache::channel();
        let cancel = CancellationToken::new();
        let worker = ResolverWorker::new(
            cache.states(),
            jobs,
            lookup,
            lookup_timeout,
            cancel.child_token(),
        );
        let handle = tokio::spawn(worker.run());

        info!(
            lookup_timeout_ms = lookup_timeout.as_millis() as u64,
            "resolver service started"
        );

        Self {
            cache,
            cancel,
            handle: Some(handle),
        }
    }

    /// A handle to the shared cache.
    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Signals the worker to stop after its current lookup. Queued jobs are
    /// dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker task to finish.
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "resolver worker task failed");
        }
    }

    /// [`shutdown`](Self::shutdown) followed by [`join`](Self::join).
    pub async fn stop(&mut self) {
        self.shutdown();
        self.join().await;
        info!("resolver service stopped");
    }

    /// Returns `true` while the worker task is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}
