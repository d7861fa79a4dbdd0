//! Reverse DNS lookup capability.

use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::{ResolveError, Resolver, TokioResolver};
use pfnotify_core::pipeline::BoxFuture;
use tracing::warn;

/// Why a reverse lookup produced no hostname.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// No PTR record for the address
    #[error("no PTR record")]
    NotFound,

    /// No nameserver answered
    #[error("no nameservers available")]
    NoNameservers,

    /// Lookup exceeded its time bound
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    /// Any other resolver failure
    #[error("lookup failed: {0}")]
    Other(String),
}

/// Resolves an address to a hostname (PTR query).
///
/// Kept dyn-compatible so the worker can hold an `Arc<dyn ReverseLookup>` and
/// tests can swap in a scripted fake.
pub trait ReverseLookup: Send + Sync {
    fn reverse<'a>(&'a self, ip: IpAddr) -> BoxFuture<'a, Result<String, LookupError>>;
}

/// [`ReverseLookup`] backed by `hickory-resolver`.
pub struct HickoryReverseLookup {
    resolver: TokioResolver,
    timeout: Duration,
}

impl HickoryReverseLookup {
    /// Uses the system resolver configuration, falling back to the hickory
    /// defaults when it cannot be read.
    pub fn from_system_conf(timeout: Duration) -> Self {
        let (config, mut opts) = match read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!(error = %e, "failed to read system DNS config, using default");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Self::with_resolver(resolver, timeout)
    }

    /// Wraps an already configured resolver. `timeout` is what the resolver
    /// was configured with; it is reported back in [`LookupError::Timeout`].
    pub fn with_resolver(resolver: TokioResolver, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }
}

/// Maps a hickory failure onto [`LookupError`].
fn lookup_error(error: &ResolveError, timeout: Duration) -> LookupError {
    if error.is_no_records_found() {
        return LookupError::NotFound;
    }
    match error.proto().map(|proto| proto.kind()) {
        Some(ProtoErrorKind::NoConnections) => LookupError::NoNameservers,
        Some(ProtoErrorKind::Timeout) => LookupError::Timeout(timeout),
        _ => LookupError::Other(error.to_string()),
    }
}

impl ReverseLookup for HickoryReverseLookup {
    fn reverse<'a>(&'a self, ip: IpAddr) -> BoxFuture<'a, Result<String, LookupError>> {
        Box::pin(async move {
            let response = self
                .resolver
                .reverse_lookup(ip)
                .await
                .map_err(|e| lookup_error(&e, self.timeout))?;

            response
                .iter()
                .next()
                .map(|ptr| trim_root(&ptr.to_string()).to_owned())
                .ok_or(LookupError::NotFound)
        })
    }
}

/// Strips the trailing root label dot from a fully qualified name.
pub fn trim_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_root_dot() {
        assert_eq!(trim_root("dns.google."), "dns.google");
        assert_eq!(trim_root("router.lan"), "router.lan");
        assert_eq!(trim_root(""), "");
    }

    #[test]
    fn lookup_error_display() {
        assert_eq!(LookupError::NotFound.to_string(), "no PTR record");
        assert!(
            LookupError::Timeout(Duration::from_secs(5))
                .to_string()
                .contains("5s")
        );
    }

    fn resolve_error(kind: ProtoErrorKind) -> ResolveError {
        hickory_resolver::proto::ProtoError::from(kind).into()
    }

    #[test]
    fn hickory_errors_keep_their_cause() {
        let timeout = Duration::from_millis(750);

        assert_eq!(
            lookup_error(&resolve_error(ProtoErrorKind::NoConnections), timeout),
            LookupError::NoNameservers
        );
        assert_eq!(
            lookup_error(&resolve_error(ProtoErrorKind::Timeout), timeout),
            LookupError::Timeout(timeout)
        );
        assert!(matches!(
            lookup_error(&resolve_error(ProtoErrorKind::Busy), timeout),
            LookupError::Other(_)
        ));
        assert!(matches!(
            lookup_error(&ResolveError::from("refused"), timeout),
            LookupError::Other(msg) if msg.contains("refused")
        ));
    }

    #[tokio::test]
    async fn wraps_configured_resolver() {
        let resolver = Resolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
        .build();
        let lookup = HickoryReverseLookup::with_resolver(resolver, Duration::from_secs(2));
        assert_eq!(lookup.timeout, Duration::from_secs(2));
        let _: &dyn ReverseLookup = &lookup;
    }

    #[tokio::test]
    async fn hickory_lookup_builds_without_system_conf_panic() {
        let lookup = HickoryReverseLookup::from_system_conf(Duration::from_millis(100));
        let _: &dyn ReverseLookup = &lookup;
    }
}
