//! The resolver worker task.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use pfnotify_core::metrics as m;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CacheState, LookupError, Resolution, ResolveJob, ReverseLookup};

/// Drains the job queue one lookup at a time.
///
/// No lookup failure stops the worker; it only exits on cancellation or when
/// every [`ResolutionCache`](super::ResolutionCache) clone is gone.
pub struct ResolverWorker {
    states: Arc<DashMap<String, CacheState>>,
    jobs: mpsc::UnboundedReceiver<ResolveJob>,
    lookup: Arc<dyn ReverseLookup>,
    lookup_timeout: Duration,
    cancel: CancellationToken,
}

impl ResolverWorker {
    pub fn new(
        states: Arc<DashMap<String, CacheState>>,
        jobs: mpsc::UnboundedReceiver<ResolveJob>,
        lookup: Arc<dyn ReverseLookup>,
        lookup_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            states,
            jobs,
            lookup,
            lookup_timeout,
            cancel,
        }
    }

    /// Runs until cancelled or the job queue closes.
    ///
    /// Cancellation is only observed between jobs; a lookup in progress runs
    /// to completion (bounded by the lookup timeout).
    pub async fn run(mut self) {
        info!("resolver worker started");

        loop {
            let job = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("resolver worker cancelled");
                    break;
                }
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => {
                        debug!("resolver job queue closed");
                        break;
                    }
                },
            };

            metrics::gauge!(m::RESOLVER_QUEUE_DEPTH).decrement(1.0);
            self.process(job).await;
        }

        let dropped = self.discard_pending();
        info!(dropped, "resolver worker stopped");
    }

    /// Closes the job queue and drops every job still in it. Returns how many
    /// were dropped.
    fn discard_pending(&mut self) -> usize {
        self.jobs.close();
        let mut dropped = 0;
        while self.jobs.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            metrics::gauge!(m::RESOLVER_QUEUE_DEPTH).decrement(dropped as f64);
        }
        dropped
    }

    async fn process(&self, job: ResolveJob) {
        let ResolveJob { ip, notify } = job;
        debug!(ip = %ip, "resolving address");

        let started = Instant::now();
        let outcome = self.lookup(&ip).await;
        metrics::histogram!(m::RESOLVER_LOOKUP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let hostname = match outcome {
            Ok(hostname) => {
                debug!(ip = %ip, hostname = %hostname, "address resolved");
                metrics::counter!(m::RESOLVER_LOOKUPS_TOTAL, m::LABEL_RESULT => "resolved")
                    .increment(1);
                self.states
                    .insert(ip.clone(), CacheState::Resolved(hostname.clone()));
                Some(hostname)
            }
            Err(e) => {
                warn!(ip = %ip, error = %e, "reverse lookup failed");
                metrics::counter!(m::RESOLVER_LOOKUPS_TOTAL, m::LABEL_RESULT => result_label(&e))
                    .increment(1);
                self.states.insert(ip.clone(), CacheState::Failed);
                None
            }
        };

        if let Some(notify) = notify
            && notify.send(Resolution { ip, hostname }).is_err()
        {
            debug!("requester dropped its result channel");
        }
    }

    async fn lookup(&self, ip: &str) -> Result<String, LookupError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| LookupError::Other(format!("invalid address '{ip}'")))?;

        match tokio::time::timeout(self.lookup_timeout, self.lookup.reverse(addr)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout)),
        }
    }
}

fn result_label(err: &LookupError) -> &'static str {
    match err {
        LookupError::NotFound => "not_found",
        LookupError::NoNameservers => "no_nameservers",
        LookupError::Timeout(_) => "timeout",
        LookupError::Other(_) => "error",
    }
}
