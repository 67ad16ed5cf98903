#![allow(clippy::cognitive_complexity)]
use std::{process, sync::Arc};

use anyhow::{Context, Result};
use stress_core::{
    HeaderSource, HttpTransport, LoadRunner, Report, RequestExecutor, RunSummary, StressConfig,
    config::{Cli, DEFAULT_THREAD_NAME, Parser, trace},
    token_bucket::RateLimiter,
    tokio::{self, runtime::Builder, signal},
    tokio_util::sync::CancellationToken,
    tracing::*,
};

#[cfg(not(target_env = "musl"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "musl"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() {
    // .env has to be loaded before clap reads the environment
    let dotenv = dotenv::dotenv();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // nowhere left to report a failed write of the usage text
            err.print().ok();
            process::exit(usage_exit_code(&err));
        }
    };
    let trace_config = match trace::Config::parse(&cli.stress_log, cli.log_format) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to set up logging: {err:#}");
            process::exit(1);
        }
    };
    debug!(?cli, ?trace_config);
    if let Err(err) = dotenv {
        debug!(?err, ".env file not loaded");
    }

    let config = match StressConfig::try_from(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(1);
        }
    };

    let summary = match run(&config) {
        Ok(summary) => summary,
        Err(err) => {
            error!(?err, "run failed");
            eprintln!("error: {err:#}");
            process::exit(1);
        }
    };

    let report = match Report::new(&summary, &config.url) {
        Ok(report) => report,
        Err(err) => {
            println!("{err}");
            process::exit(1);
        }
    };
    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("failed to serialize report: {err}");
                process::exit(1);
            }
        }
    } else {
        print!("{}", report.human_summary());
    }
}

/// `--help` & `--version` are printed to stdout and succeed, anything else is
/// a usage error
fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() { 1 } else { 0 }
}

fn run(config: &StressConfig) -> Result<RunSummary> {
    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(DEFAULT_THREAD_NAME).enable_all();
    // default num threads will be num logical CPUs
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    let rt = builder.build().context("failed to build tokio runtime")?;

    rt.block_on(start(config))
}

async fn start(config: &StressConfig) -> Result<RunSummary> {
    debug!(?config, "starting run");
    let limiter = Arc::new(
        RateLimiter::new(config.rate, config.burst).context("invalid dispatch limit")?,
    );
    let transport = HttpTransport::new(config.timeout()).context("failed to build http client")?;
    let executor = RequestExecutor::new(
        transport,
        HeaderSource::new(config.headers.clone()),
        config.attempts,
    );
    let runner = LoadRunner::new(limiter, executor);

    let token = CancellationToken::new();
    let ctrl_c = tokio::spawn(cancel_on_ctrl_c(token.clone()));
    let summary = runner.run(&config.url, config.requests, token).await;
    ctrl_c.abort();

    Ok(summary)
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("ctrl-c received, workers waiting to dispatch will be cancelled");
            token.cancel();
        }
        Err(err) => error!(?err, "failed to listen for ctrl-c"),
    }
}
