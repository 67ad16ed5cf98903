//! # stress
//!
//! Fires a fixed batch of concurrent HTTP requests at one target, retrying
//! transport timeouts, gating dispatch through a shared token bucket and
//! folding every outcome into aggregate statistics.
#![warn(
    missing_debug_implementations,
    missing_docs,
    missing_copy_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use reqwest;
pub use token_bucket;
pub use tokio;
pub use tokio_util;
pub use tracing;

pub use crate::aggregator::{AggregateStats, RequestOutcome, ResultAggregator, StatsError};
pub use crate::config::{Cli, StressConfig};
pub use crate::executor::{RequestError, RequestExecutor};
pub use crate::headers::{HeaderError, HeaderSet, HeaderSource};
pub use crate::report::{HostLabel, Report, ReportError};
pub use crate::runner::{LoadRunner, RunSummary};
pub use crate::transport::{Attempt, HttpTransport, Reply, RequestSpec, Transport, TransportError};

pub mod aggregator;
pub mod config;
pub mod executor;
pub mod headers;
pub mod report;
pub mod runner;
pub mod transport;
