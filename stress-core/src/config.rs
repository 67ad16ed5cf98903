//! cli & logging configuration
use std::{path::PathBuf, time::Duration};

use anyhow::{Result, bail};
pub use clap::Parser;
use clap::ValueEnum;
use serde::Serialize;

/// requests fired per run
pub const DEFAULT_REQUESTS: usize = 15;
/// tokens refilled per second in the dispatch limiter
pub const DEFAULT_RATE: f64 = 100.0;
/// dispatch limiter capacity, 1 means no burst allowance
pub const DEFAULT_BURST: u32 = 1;
/// attempts per request, including the first one
pub const DEFAULT_ATTEMPTS: usize = 3;
/// client timeout in seconds. Deliberately huge, a request effectively only
/// times out if the transport gives up
pub const DEFAULT_TIMEOUT: u64 = 3000;
/// header file read for `/api` targets
pub static DEFAULT_HEADERS_PATH: &str = "headers.json";
/// default log level. Can use this argument or STRESS_LOG env var
pub const DEFAULT_STRESS_LOG: &str = "info";
/// tokio worker thread name
pub static DEFAULT_THREAD_NAME: &str = "stress-worker";

/// log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// unstructured single line logs
    #[default]
    Standard,
    /// one json object per event
    Json,
    /// multi-line human output
    Pretty,
}

/// parses from cli & environment var. `.env` in the working dir is loaded as well
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(
    name = "stress",
    bin_name = "stress",
    version,
    about = "Fire a fixed batch of concurrent HTTP requests at a single URL",
    long_about = None
)]
pub struct Cli {
    /// target URL. Targets containing `/api` are sent a JSON POST
    pub url: String,
    /// number of requests, each one gets its own worker
    #[arg(long, env = "STRESS_REQUESTS", default_value_t = DEFAULT_REQUESTS)]
    pub requests: usize,
    /// max requests dispatched per second
    #[arg(long, env = "STRESS_RATE", default_value_t = DEFAULT_RATE)]
    pub rate: f64,
    /// number of requests allowed to go out back to back
    #[arg(long, env = "STRESS_BURST", default_value_t = DEFAULT_BURST)]
    pub burst: u32,
    /// attempts per request; only timeouts are retried
    #[arg(long, env = "STRESS_ATTEMPTS", default_value_t = DEFAULT_ATTEMPTS)]
    pub attempts: usize,
    /// per request client timeout in seconds
    #[arg(long, env = "STRESS_TIMEOUT", default_value_t = DEFAULT_TIMEOUT)]
    pub timeout: u64,
    /// JSON object of extra headers for `/api` targets
    #[arg(long, env = "HEADERS_PATH", default_value = DEFAULT_HEADERS_PATH)]
    pub headers: PathBuf,
    /// print the report as json instead of a table
    #[arg(long)]
    pub json: bool,
    /// tokio worker threads, defaults to the number of logical CPUs
    #[arg(long, env = "STRESS_THREADS")]
    pub threads: Option<usize>,
    /// set the log level. All valid RUST_LOG arguments are accepted
    #[arg(long, env = "STRESS_LOG", default_value = DEFAULT_STRESS_LOG)]
    pub stress_log: String,
    /// log format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Standard)]
    pub log_format: LogFormat,
}

/// Validated run configuration
#[derive(Debug, Clone, Serialize)]
pub struct StressConfig {
    /// target URL, kept verbatim. It is only parsed when a request is built
    /// and when the report is rendered
    pub url: String,
    /// requests per run
    pub requests: usize,
    /// limiter refill rate (tokens/sec)
    pub rate: f64,
    /// limiter capacity
    pub burst: u32,
    /// attempt budget per request
    pub attempts: usize,
    /// client timeout in seconds
    pub timeout_secs: u64,
    /// header file for `/api` targets
    pub headers: PathBuf,
    /// json report
    pub json: bool,
    /// runtime worker threads
    pub threads: Option<usize>,
}

impl StressConfig {
    /// client timeout as `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TryFrom<Cli> for StressConfig {
    type Error = anyhow::Error;

    fn try_from(args: Cli) -> Result<Self> {
        if args.requests == 0 {
            bail!("--requests must be greater than 0");
        }
        if !args.rate.is_finite() || args.rate <= 0.0 {
            bail!("--rate must be a positive number");
        }
        if args.burst == 0 {
            bail!("--burst must be greater than 0");
        }
        if args.attempts == 0 {
            bail!("--attempts must be greater than 0");
        }
        if args.timeout == 0 {
            bail!("--timeout must be greater than 0");
        }
        if args.threads == Some(0) {
            bail!("--threads must be greater than 0");
        }

        Ok(Self {
            url: args.url,
            requests: args.requests,
            rate: args.rate,
            burst: args.burst,
            attempts: args.attempts,
            timeout_secs: args.timeout,
            headers: args.headers,
            json: args.json,
            threads: args.threads,
        })
    }
}

pub mod trace {
    //! tracing configuration
    use anyhow::Result;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    use super::LogFormat;

    /// Logging setup. Everything goes to stderr, stdout is left for the report
    #[derive(Debug)]
    pub struct Config {
        /// formatting to apply to logs
        pub log_frmt: LogFormat,
    }

    impl Config {
        /// install the global subscriber
        pub fn parse(stress_log: &str, log_frmt: LogFormat) -> Result<Self> {
            let filter = EnvFilter::try_new(stress_log)
                .or_else(|_| EnvFilter::try_new("info"))?
                .add_directive("hyper=off".parse()?)
                .add_directive("hyper_util=off".parse()?)
                .add_directive("reqwest=off".parse()?);

            match log_frmt {
                LogFormat::Json => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json().with_writer(std::io::stderr))
                        .try_init()?;
                }
                LogFormat::Pretty => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new())
                                .with_writer(std::io::stderr),
                        )
                        .try_init()?;
                }
                LogFormat::Standard => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().with_writer(std::io::stderr))
                        .try_init()?;
                }
            }

            Ok(Self { log_frmt })
        }
    }
}
