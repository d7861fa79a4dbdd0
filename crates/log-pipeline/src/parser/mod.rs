//! Line classification and record decoding.
//!
//! A raw line goes through:
//!
//! 1. ignore patterns (any match suppresses the line before parsing)
//! 2. syslog envelope parsing ([`SyslogParser`])
//! 3. dispatch on the process marker in the payload:
//!    - `filterlog:` -> [`filterlog::decode`] -> [`LogEntry::Firewall`]
//!    - `dhcpd:` -> [`dhcpd::decode`] -> [`LogEntry::DhcpLease`] (ACK/REQUEST only)
//!    - anything else -> [`LogEntry::Unparsed`]
//!
//! # Example
//! ```ignore
//! use pfnotify_log_pipeline::parser::{Classified, LineClassifier};
//!
//! let classifier = LineClassifier::builder().build();
//! let line = "<134>May 22 00:32:39 filterlog: 101,,,1558485159,bge1,match,block,in,4,\
//!             0x0,,63,35995,0,DF,6,tcp,60,192.168.3.13,172.217.7.132,33374,8080,0,S,1414818328,,64240,,mss";
//! if let Classified::Entry(entry) = classifier.classify(line)? {
//!     assert_eq!(entry.to_string(), "tcp 192.168.3.13:33374 --> 172.217.7.132:8080 S -- rule 101");
//! }
//! ```

pub mod dhcpd;
pub mod filterlog;
pub mod syslog;

pub use syslog::{SyslogEnvelope, SyslogParser};

use std::sync::Arc;

use pfnotify_core::pipeline::VendorLookup;
use regex::Regex;

use crate::entry::LogEntry;
use crate::error::LogPipelineError;
use crate::resolver::{ResolutionCache, ResolutionSender};

/// Process tag of pfSense packet-filter records.
pub const FIREWALL_PROCESS: &str = "filterlog";
/// Process tag of DHCP server records.
pub const DHCP_PROCESS: &str = "dhcpd";

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// The line produced an entry to report
    Entry(LogEntry),
    /// The line was dropped on purpose
    Suppressed(SuppressReason),
}

/// Why a line was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Index of the first matching ignore pattern
    IgnorePattern(usize),
    /// DHCP record other than DHCPACK / DHCPREQUEST
    DhcpSubtype,
}

impl SuppressReason {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::IgnorePattern(_) => "ignore_pattern",
            Self::DhcpSubtype => "dhcp_subtype",
        }
    }
}

/// Borrowed resolver collaborator: the cache plus where lookup results go.
#[derive(Debug, Clone, Copy)]
pub struct ResolverRef<'a> {
    pub cache: &'a ResolutionCache,
    pub results: Option<&'a ResolutionSender>,
}

/// Classifies and decodes one line with explicitly supplied collaborators.
///
/// Uses a default [`SyslogParser`]. Long-lived callers should build a
/// [`LineClassifier`] instead.
pub fn classify_and_decode(
    line: &str,
    ignore_patterns: &[Regex],
    resolver: Option<ResolverRef<'_>>,
    vendor_lookup: Option<&dyn VendorLookup>,
) -> Result<Classified, LogPipelineError> {
    classify_with(
        &SyslogParser::new(),
        line,
        ignore_patterns,
        resolver,
        vendor_lookup,
    )
}

fn classify_with(
    parser: &SyslogParser,
    line: &str,
    ignore_patterns: &[Regex],
    resolver: Option<ResolverRef<'_>>,
    vendor_lookup: Option<&dyn VendorLookup>,
) -> Result<Classified, LogPipelineError> {
    if let Some(idx) = ignore_patterns.iter().position(|p| p.is_match(line)) {
        return Ok(Classified::Suppressed(SuppressReason::IgnorePattern(idx)));
    }

    let envelope = parser.parse(line)?;
    let payload = envelope.payload.as_str();

    if let Some(content) = strip_process_marker(payload, FIREWALL_PROCESS) {
        let mut entry = filterlog::decode(content)?;
        if let Some(resolver) = resolver {
            entry.source_hostname = resolver
                .cache
                .resolve(&entry.source_address, resolver.results);
            entry.destination_hostname = resolver
                .cache
                .resolve(&entry.destination_address, resolver.results);
        }
        return Ok(Classified::Entry(LogEntry::Firewall(entry)));
    }

    if let Some(text) = strip_process_marker(payload, DHCP_PROCESS) {
        let entry = dhcpd::decode(line, text, vendor_lookup);
        if !dhcpd::is_reported(&entry) {
            return Ok(Classified::Suppressed(SuppressReason::DhcpSubtype));
        }
        return Ok(Classified::Entry(LogEntry::DhcpLease(entry)));
    }

    Ok(Classified::Entry(LogEntry::Unparsed {
        message: format!("Cannot process line {}", line.trim_end()),
    }))
}

/// Finds `process:` or `process[pid]:` in `payload` and returns the trimmed
/// text after it.
pub fn strip_process_marker<'a>(payload: &'a str, process: &str) -> Option<&'a str> {
    for (idx, _) in payload.match_indices(process) {
        let rest = &payload[idx + process.len()..];

        if let Some(after) = rest.strip_prefix(':') {
            return Some(after.trim());
        }

        if let Some(bracketed) = rest.strip_prefix('[')
            && let Some(close) = bracketed.find(']')
        {
            let pid = &bracketed[..close];
            if !pid.is_empty()
                && pid.bytes().all(|b| b.is_ascii_digit())
                && let Some(after) = bracketed[close + 1..].strip_prefix(':')
            {
                return Some(after.trim());
            }
        }
    }
    None
}

/// Classifier holding its ignore patterns and collaborators.
pub struct LineClassifier {
    parser: SyslogParser,
    ignore_patterns: Vec<Regex>,
    resolver: Option<ResolutionCache>,
    results: Option<ResolutionSender>,
    vendor_lookup: Option<Arc<dyn VendorLookup>>,
}

impl LineClassifier {
    pub fn builder() -> LineClassifierBuilder {
        LineClassifierBuilder::default()
    }

    /// Classifies and decodes one line.
    ///
    /// `Err` is confined to this line; callers log it and continue.
    pub fn classify(&self, line: &str) -> Result<Classified, LogPipelineError> {
        let resolver = self.resolver.as_ref().map(|cache| ResolverRef {
            cache,
            results: self.results.as_ref(),
        });
        classify_with(
            &self.parser,
            line,
            &self.ignore_patterns,
            resolver,
            self.vendor_lookup.as_deref(),
        )
    }

    /// Number of configured ignore patterns.
    pub fn ignore_pattern_count(&self) -> usize {
        self.ignore_patterns.len()
    }

    /// Returns `true` if reverse lookups are requested for firewall records.
    pub fn resolves_hostnames(&self) -> bool {
        self.resolver.is_some()
    }
}

/// Builder for [`LineClassifier`].
#[derive(Default)]
pub struct LineClassifierBuilder {
    max_line_length: Option<usize>,
    ignore_patterns: Vec<Regex>,
    resolver: Option<ResolutionCache>,
    results: Option<ResolutionSender>,
    vendor_lookup: Option<Arc<dyn VendorLookup>>,
}

impl LineClassifierBuilder {
    /// Sets the longest accepted line.
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.max_line_length = Some(len);
        self
    }

    /// Adds already compiled ignore patterns.
    pub fn ignore_patterns(mut self, patterns: impl IntoIterator<Item = Regex>) -> Self {
        self.ignore_patterns.extend(patterns);
        self
    }

    /// Compiles and adds ignore patterns.
    pub fn ignore_pattern_strs<S: AsRef<str>>(
        mut self,
        patterns: &[S],
    ) -> Result<Self, LogPipelineError> {
        for pattern in patterns {
            self.ignore_patterns.push(Regex::new(pattern.as_ref())?);
        }
        Ok(self)
    }

    /// Requests reverse lookups through `cache`; results are posted to
    /// `results` when given.
    pub fn resolver(mut self, cache: ResolutionCache, results: Option<ResolutionSender>) -> Self {
        self.resolver = Some(cache);
        self.results = results;
        self
    }

    /// Annotates DHCP records with the vendor of their MAC address.
    pub fn vendor_lookup(mut self, lookup: Arc<dyn VendorLookup>) -> Self {
        self.vendor_lookup = Some(lookup);
        self
    }

    pub fn build(self) -> LineClassifier {
        let parser = match self.max_line_length {
            Some(len) => SyslogParser::new().with_max_input_size(len),
            None => SyslogParser::new(),
        };
        LineClassifier {
            parser,
            ignore_patterns: self.ignore_patterns,
            resolver: self.resolver,
            results: self.results,
            vendor_lookup: self.vendor_lookup,
        }
    }
}
