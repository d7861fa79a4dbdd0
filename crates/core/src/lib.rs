#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;

// --- re-exports ---

pub use error::{ConfigError, ParseError, PfnotifyError, PipelineError, VendorLookupError};

pub use config::PfnotifyConfig;

pub use pipeline::{BoxFuture, HealthStatus, Pipeline, VendorLookup};
