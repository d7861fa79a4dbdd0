//! Metric names and descriptions.
//!
//! Every Prometheus metric emitted by the workspace is named here. Crates
//! record through the `metrics::counter!()`, `metrics::gauge!()` and
//! `metrics::histogram!()` macros using these constants.
//!
//! # Naming
//!
//! - prefix: `pfnotify_`
//! - component: `log_pipeline_`, `resolver_`, `daemon_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)
//!
//! ```ignore
//! metrics::counter!(pfnotify_core::metrics::LOG_PIPELINE_LINES_TOTAL).increment(1);
//! ```

// ─── Label keys ─────────────────────────────────────────────────────

/// Entry kind label (firewall, dhcp, unparsed)
pub const LABEL_KIND: &str = "kind";

/// Outcome label (resolved, failed)
pub const LABEL_RESULT: &str = "result";

/// Error class label (parse, decode)
pub const LABEL_ERROR: &str = "error";

// ─── Log pipeline ───────────────────────────────────────────────────

/// Raw lines read from the followed file (counter)
pub const LOG_PIPELINE_LINES_TOTAL: &str = "pfnotify_log_pipeline_lines_total";

/// Lines dropped by an ignore pattern or the DHCP subtype filter (counter)
pub const LOG_PIPELINE_LINES_SUPPRESSED_TOTAL: &str =
    "pfnotify_log_pipeline_lines_suppressed_total";

/// Lines skipped because the envelope or payload was malformed (counter, label: error)
pub const LOG_PIPELINE_PARSE_ERRORS_TOTAL: &str = "pfnotify_log_pipeline_parse_errors_total";

/// Notifications handed to the sink (counter, label: kind)
pub const LOG_PIPELINE_NOTIFICATIONS_TOTAL: &str = "pfnotify_log_pipeline_notifications_total";

// ─── Resolver ───────────────────────────────────────────────────────

/// Completed reverse lookups (counter, label: result)
pub const RESOLVER_LOOKUPS_TOTAL: &str = "pfnotify_resolver_lookups_total";

/// Reverse lookup latency (histogram, seconds)
pub const RESOLVER_LOOKUP_DURATION_SECONDS: &str = "pfnotify_resolver_lookup_duration_seconds";

/// Jobs waiting for the resolver worker (gauge)
pub const RESOLVER_QUEUE_DEPTH: &str = "pfnotify_resolver_queue_depth";

/// Addresses held by the cache in any state (gauge)
pub const RESOLVER_CACHE_ENTRIES: &str = "pfnotify_resolver_cache_entries";

// ─── Daemon ─────────────────────────────────────────────────────────

/// Build information (gauge, always 1)
pub const DAEMON_BUILD_INFO: &str = "pfnotify_daemon_build_info";

// ─── Buckets ────────────────────────────────────────────────────────

/// Reverse lookup latency buckets (seconds)
pub const LOOKUP_DURATION_BUCKETS: [f64; 9] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0];

/// Registers descriptions for every metric.
///
/// Call once after the recorder is installed.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        LOG_PIPELINE_LINES_TOTAL,
        "Total number of raw lines read from the followed log file"
    );
    describe_counter!(
        LOG_PIPELINE_LINES_SUPPRESSED_TOTAL,
        "Lines dropped by ignore patterns or the DHCP subtype filter"
    );
    describe_counter!(
        LOG_PIPELINE_PARSE_ERRORS_TOTAL,
        "Lines skipped because of a malformed envelope or payload"
    );
    describe_counter!(
        LOG_PIPELINE_NOTIFICATIONS_TOTAL,
        "Formatted notifications handed to the sink"
    );

    describe_counter!(
        RESOLVER_LOOKUPS_TOTAL,
        "Completed reverse DNS lookups by result"
    );
    describe_histogram!(
        RESOLVER_LOOKUP_DURATION_SECONDS,
        "Reverse DNS lookup latency in seconds"
    );
    describe_gauge!(
        RESOLVER_QUEUE_DEPTH,
        "Reverse lookup jobs waiting for the worker"
    );
    describe_gauge!(
        RESOLVER_CACHE_ENTRIES,
        "Addresses held by the resolution cache"
    );

    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_prefix() {
        let names = [
            LOG_PIPELINE_LINES_TOTAL,
            LOG_PIPELINE_LINES_SUPPRESSED_TOTAL,
            LOG_PIPELINE_PARSE_ERRORS_TOTAL,
            LOG_PIPELINE_NOTIFICATIONS_TOTAL,
            RESOLVER_LOOKUPS_TOTAL,
            RESOLVER_LOOKUP_DURATION_SECONDS,
            RESOLVER_QUEUE_DEPTH,
            RESOLVER_CACHE_ENTRIES,
            DAEMON_BUILD_INFO,
        ];
        for name in &names {
            assert!(name.starts_with("pfnotify_"), "{name} lacks prefix");
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in [
            LOG_PIPELINE_LINES_TOTAL,
            LOG_PIPELINE_LINES_SUPPRESSED_TOTAL,
            LOG_PIPELINE_PARSE_ERRORS_TOTAL,
            LOG_PIPELINE_NOTIFICATIONS_TOTAL,
            RESOLVER_LOOKUPS_TOTAL,
        ] {
            assert!(name.ends_with("_total"), "{name} should end with _total");
        }
    }

    #[test]
    fn lookup_duration_buckets_are_sorted() {
        let buckets = LOOKUP_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(buckets[i] > buckets[i - 1]);
        }
    }

    #[test]
    fn describe_all_without_recorder_is_noop() {
        describe_all();
    }
}
