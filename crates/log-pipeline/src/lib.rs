#![doc = include_str!("../README.md")]
//!
//! # Modules
//!
//! - [`parser`]: syslog envelope parsing, record decoders and the line classifier
//! - [`entry`]: decoded entries and their display format
//! - [`resolver`]: reverse DNS cache, worker task and lookup backends
//! - [`vendor`]: MAC OUI vendor lookup
//! - [`collector`]: line sources (file follower)
//! - [`pipeline`]: orchestration (implements the core `Pipeline` trait)
//! - [`config`]: pipeline settings derived from the daemon configuration
//! - [`error`]: domain error type

pub mod config;
pub mod entry;
pub mod error;
pub mod pipeline;
pub mod vendor;

pub mod collector;
pub mod parser;
pub mod resolver;

// --- re-exports ---

pub use pipeline::{LogPipeline, LogPipelineBuilder, Notification};

pub use config::{PipelineConfig, PipelineConfigBuilder};

pub use error::LogPipelineError;

pub use entry::{DhcpLeaseEntry, FirewallEntry, LogEntry, ProtocolFields};

pub use parser::{Classified, LineClassifier, SuppressReason, SyslogParser, classify_and_decode};

pub use resolver::{
    CacheState, HickoryReverseLookup, LookupError, Resolution, ResolutionCache, ResolverService,
    ReverseLookup,
};

pub use collector::{FileCollector, RawLog};

pub use vendor::OuiVendorLookup;
