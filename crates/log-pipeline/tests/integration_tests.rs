//! Integration tests: classification scenarios, resolver memoization and the
//! full follow -> classify -> enrich -> notify flow.

use std::collections::HashMap;
use std::io::Write;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pfnotify_core::error::VendorLookupError;
use pfnotify_core::pipeline::{BoxFuture, HealthStatus, Pipeline, VendorLookup};
use pfnotify_log_pipeline::parser::ResolverRef;
use pfnotify_log_pipeline::resolver::resolution_channel;
use pfnotify_log_pipeline::{
    CacheState, Classified, LogEntry, LogPipelineBuilder, LogPipelineError, LookupError,
    Notification, PipelineConfig, ResolutionCache, ResolverService, ReverseLookup,
    SuppressReason, classify_and_decode,
};
use regex::Regex;
use tokio::sync::mpsc;

const SCENARIO_A: &str = "101,,,1558485159,bge1,match,block,in,4,0x0,,63,35995,0,DF,6,tcp,60,192.168.3.13,172.217.7.132,33374,8080,0,S,1414818328,,64240,,mss";
const SCENARIO_B: &str = "77,,,1000000103,bge1,match,pass,out,4,0x0,,64,23041,0,none,1,icmp,84,192.168.3.20,172.217.2.110,request,2,464";

fn syslog(payload: &str) -> String {
    format!("<134>May 22 00:32:39 filterlog: {payload}")
}

fn dhcp(text: &str) -> String {
    format!("<190>May 22 00:32:40 dhcpd: {text}")
}

fn rendered(result: Result<Classified, LogPipelineError>) -> String {
    match result.expect("classification failed") {
        Classified::Entry(entry) => entry.to_string(),
        Classified::Suppressed(reason) => panic!("unexpectedly suppressed: {reason:?}"),
    }
}

/// Answers from a fixed table and counts the lookups it performs.
struct TableLookup {
    table: HashMap<IpAddr, String>,
    calls: AtomicUsize,
}

impl TableLookup {
    fn new(entries: &[(&str, &str)]) -> Arc<Self> {
        let table = entries
            .iter()
            .map(|(ip, host)| (ip.parse().unwrap(), (*host).to_owned()))
            .collect();
        Arc::new(Self {
            table,
            calls: AtomicUsize::new(0),
        })
    }
}

impl ReverseLookup for TableLookup {
    fn reverse<'a>(&'a self, ip: IpAddr) -> BoxFuture<'a, Result<String, LookupError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.table.get(&ip).cloned().ok_or(LookupError::NotFound);
        Box::pin(async move { answer })
    }
}

/// Answers one address after a fixed latency; every other address fails at
/// once.
struct SlowLookup {
    ip: IpAddr,
    hostname: &'static str,
    latency: Duration,
}

impl ReverseLookup for SlowLookup {
    fn reverse<'a>(&'a self, ip: IpAddr) -> BoxFuture<'a, Result<String, LookupError>> {
        Box::pin(async move {
            if ip != self.ip {
                return Err(LookupError::NotFound);
            }
            tokio::time::sleep(self.latency).await;
            Ok(self.hostname.to_owned())
        })
    }
}

struct PrefixVendor;

impl VendorLookup for PrefixVendor {
    fn vendor(&self, mac: &str) -> Result<String, VendorLookupError> {
        if mac.starts_with("00:1b:63") {
            Ok("Apple, Inc.".to_owned())
        } else {
            Err(VendorLookupError::NotFound {
                mac: mac.to_owned(),
            })
        }
    }
}

async fn recv(rx: &mut mpsc::Receiver<Notification>) -> Notification {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timeout waiting for notification")
        .expect("notification channel closed")
}

// --- classification scenarios ---

#[test]
fn scenario_a_tcp_without_resolver() {
    let result = classify_and_decode(&syslog(SCENARIO_A), &[], None, None).unwrap();
    let Classified::Entry(LogEntry::Firewall(entry)) = result else {
        panic!("expected a firewall entry");
    };

    assert_eq!(entry.protocol_id(), 6);
    assert_eq!(entry.rule_number, "101");
    assert_eq!(entry.source_address, "192.168.3.13");
    assert_eq!(entry.destination_address, "172.217.7.132");
    assert_eq!(entry.protocol.ports().unwrap().source_port, "33374");
    assert_eq!(entry.protocol.ports().unwrap().destination_port, "8080");
    assert_eq!(entry.protocol.tcp().unwrap().flags, "S");
    assert_eq!(
        entry.to_string(),
        "tcp 192.168.3.13:33374 --> 172.217.7.132:8080 S -- rule 101"
    );
}

#[test]
fn scenario_b_icmp() {
    let text = rendered(classify_and_decode(&syslog(SCENARIO_B), &[], None, None));
    assert_eq!(text, "icmp 192.168.3.20 --> 172.217.2.110, request -- rule 77");
}

#[test]
fn scenario_c_dhcp_subtypes() {
    let ack = dhcp("DHCPACK on 192.168.1.20 to 00:1b:63:84:45:e6 (laptop) via igb1");
    let text = rendered(classify_and_decode(&ack, &[], None, Some(&PrefixVendor)));
    assert_eq!(
        text,
        "DHCPACK on 192.168.1.20 to 00:1b:63:84:45:e6 (laptop) via igb1 (Apple, Inc.)"
    );

    let request = dhcp("DHCPREQUEST for 192.168.1.21 from 3c:22:fb:00:00:01 via igb1");
    let text = rendered(classify_and_decode(&request, &[], None, Some(&PrefixVendor)));
    assert!(text.ends_with("(unknown vendor)"));

    let release = dhcp("DHCPRELEASE of 192.168.1.20 from 00:1b:63:84:45:e6 via igb1");
    let result = classify_and_decode(&release, &[], None, Some(&PrefixVendor)).unwrap();
    assert_eq!(result, Classified::Suppressed(SuppressReason::DhcpSubtype));
}

#[test]
fn scenario_d_ignore_before_parsing() {
    let patterns = [Regex::new(r"172\.217\.\d+\.\d+").unwrap()];
    let (cache, mut jobs) = ResolutionCache::channel();
    let resolver = ResolverRef {
        cache: &cache,
        results: None,
    };

    let result = classify_and_decode(&syslog(SCENARIO_A), &patterns, Some(resolver), None).unwrap();
    assert_eq!(
        result,
        Classified::Suppressed(SuppressReason::IgnorePattern(0))
    );
    // nothing was decoded, so nothing was queued
    assert!(jobs.try_recv().is_err());
    assert!(cache.is_empty());
}

#[test]
fn unparsed_and_malformed_lines() {
    let other = "<38>May 22 00:32:39 sshd[77]: Accepted publickey";
    let text = rendered(classify_and_decode(other, &[], None, None));
    assert_eq!(text, format!("Cannot process line {other}"));

    let err = classify_and_decode("not syslog at all", &[], None, None).unwrap_err();
    assert!(err.is_line_error());

    let truncated = syslog("101,,,1558485159,bge1,match,block,in,4,0x0,,63");
    let err = classify_and_decode(&truncated, &[], None, None).unwrap_err();
    assert!(matches!(err, LogPipelineError::Decode { .. }));
}

// --- resolution cache ---

#[test]
fn resolve_is_idempotent_while_pending() {
    let (cache, mut jobs) = ResolutionCache::channel();

    assert!(cache.resolve("192.168.3.13", None).is_none());
    assert!(cache.resolve("192.168.3.13", None).is_none());

    assert_eq!(jobs.try_recv().unwrap().ip, "192.168.3.13");
    assert!(jobs.try_recv().is_err());
}

#[tokio::test]
async fn resolution_is_memoized() {
    let lookup = TableLookup::new(&[("192.168.3.13", "ws.lan")]);
    let mut service = ResolverService::start(lookup.clone(), Duration::from_secs(1));
    let cache = service.cache().clone();
    let (tx, mut rx) = resolution_channel();

    cache.resolve("192.168.3.13", Some(&tx));
    cache.resolve("10.9.9.9", Some(&tx));
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();

    for _ in 0..3 {
        assert_eq!(cache.resolve("192.168.3.13", Some(&tx)).as_deref(), Some("ws.lan"));
        assert_eq!(cache.resolve("10.9.9.9", Some(&tx)), None);
    }
    assert_eq!(cache.state("10.9.9.9"), Some(CacheState::Failed));
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    assert!(rx.try_recv().is_err(), "no further jobs should have run");

    service.stop().await;
    assert!(!service.is_running());
}

// --- full pipeline ---

fn pipeline_config(path: &std::path::Path, delay_secs: u64) -> PipelineConfig {
    PipelineConfig {
        log_file: path.display().to_string(),
        delay_secs,
        reverse_dns_lookup: true,
        vendor_lookup: true,
        ignore_patterns: vec!["igb7".to_owned()],
        poll_interval_ms: 20,
        read_from_start: true,
        lookup_timeout_ms: 1000,
        announce_start: true,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_follows_file_and_enriches_entries() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    let lookup = TableLookup::new(&[("192.168.3.13", "ws.lan")]);

    let (mut pipeline, rx) = LogPipelineBuilder::new()
        .config(pipeline_config(file.path(), 1))
        .reverse_lookup(lookup.clone())
        .vendor_lookup(Arc::new(PrefixVendor))
        .build()
        .expect("pipeline build failed");
    let mut rx = rx.expect("builder should create a receiver");

    pipeline.start().await.expect("failed to start pipeline");
    assert_eq!(pipeline.health_check().await, HealthStatus::Healthy);

    let announce = recv(&mut rx).await;
    assert_eq!(announce.kind, "status");
    assert!(announce.text.starts_with("Following "));

    writeln!(file, "{}", syslog(SCENARIO_A)).unwrap();
    writeln!(file, "{}", syslog("1,,,2,igb7,match,block,in,4,0x0,,64,1,0,DF,17,udp,60,10.7.7.7,10.7.7.8,1,2,3")).unwrap();
    writeln!(file, "garbage without envelope").unwrap();
    writeln!(file, "{}", dhcp("DHCPRELEASE of 192.168.1.20 from 00:1b:63:84:45:e6 via igb1")).unwrap();
    writeln!(file, "{}", dhcp("DHCPACK on 192.168.1.20 to 00:1b:63:84:45:e6 via igb1")).unwrap();
    file.flush().unwrap();

    let firewall = recv(&mut rx).await;
    assert_eq!(firewall.kind, "firewall");
    assert_eq!(
        firewall.text,
        "tcp ws.lan:33374 --> 172.217.7.132:8080 S -- rule 101"
    );
    assert!(firewall.source.starts_with("file:"));

    let lease = recv(&mut rx).await;
    assert_eq!(lease.kind, "dhcp");
    assert_eq!(
        lease.text,
        "DHCPACK on 192.168.1.20 to 00:1b:63:84:45:e6 via igb1 (Apple, Inc.)"
    );

    let cache = pipeline.resolver_cache().expect("resolver should be running");
    assert_eq!(cache.state("172.217.7.132"), Some(CacheState::Failed));

    pipeline.stop().await.expect("failed to stop pipeline");

    assert_eq!(pipeline.processed_count(), 5);
    assert_eq!(pipeline.suppressed_count(), 2);
    assert_eq!(pipeline.parse_error_count(), 1);
    assert_eq!(pipeline.notification_count(), 2);
    assert!(rx.try_recv().is_err(), "suppressed lines must not notify");
}

#[tokio::test(flavor = "multi_thread")]
async fn late_lookup_is_cached_for_the_next_line() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    let mut config = pipeline_config(file.path(), 1);
    config.announce_start = false;
    config.lookup_timeout_ms = 10_000;

    let lookup = Arc::new(SlowLookup {
        ip: "192.168.3.20".parse().unwrap(),
        hostname: "slow.lan",
        latency: Duration::from_millis(2500),
    });
    let (mut pipeline, rx) = LogPipelineBuilder::new()
        .config(config)
        .reverse_lookup(lookup)
        .build()
        .unwrap();
    let mut rx = rx.unwrap();
    pipeline.start().await.unwrap();

    writeln!(file, "{}", syslog(SCENARIO_B)).unwrap();
    file.flush().unwrap();

    // the lookup outlives the grace period, so the raw addresses go out
    let first = recv(&mut rx).await;
    assert_eq!(
        first.text,
        "icmp 192.168.3.20 --> 172.217.2.110, request -- rule 77"
    );

    let cache = pipeline.resolver_cache().unwrap().clone();
    tokio::time::timeout(Duration::from_secs(10), async {
        while cache.state("192.168.3.20") != Some(CacheState::Resolved("slow.lan".to_owned())) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("lookup never completed");

    writeln!(file, "{}", syslog(SCENARIO_B)).unwrap();
    file.flush().unwrap();

    let second = recv(&mut rx).await;
    assert_eq!(
        second.text,
        "icmp slow.lan --> 172.217.2.110, request -- rule 77"
    );

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_without_resolver_renders_raw_addresses() {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    let mut config = pipeline_config(file.path(), 0);
    config.reverse_dns_lookup = false;
    config.announce_start = false;

    let (tx, mut rx) = mpsc::channel(16);
    let (mut pipeline, none) = LogPipelineBuilder::new()
        .config(config)
        .notification_sender(tx)
        .build()
        .unwrap();
    assert!(none.is_none());

    pipeline.start().await.unwrap();
    assert!(pipeline.resolver_cache().is_none());

    writeln!(file, "{}", syslog(SCENARIO_B)).unwrap();
    file.flush().unwrap();

    let notification = recv(&mut rx).await;
    assert_eq!(
        notification.text,
        "icmp 192.168.3.20 --> 172.217.2.110, request -- rule 77"
    );

    pipeline.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_restart_and_lifecycle_errors() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut config = pipeline_config(file.path(), 0);
    config.reverse_dns_lookup = false;
    config.announce_start = false;

    let (mut pipeline, _rx) = LogPipelineBuilder::new().config(config).build().unwrap();

    pipeline.start().await.unwrap();
    assert!(pipeline.start().await.is_err(), "double start must fail");
    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.state_name(), "stopped");
    assert!(pipeline.health_check().await.is_unhealthy());
    assert!(pipeline.stop().await.is_err(), "double stop must fail");

    pipeline.start().await.unwrap();
    assert_eq!(pipeline.state_name(), "running");
    pipeline.stop().await.unwrap();
    pipeline.wait().await.unwrap();
}
