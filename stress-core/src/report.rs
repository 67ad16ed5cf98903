//! # report
//!
//! Console rendering of a finished run
use std::fmt;

use reqwest::Url;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::runner::RunSummary;

/// shown when no response time was recorded
const UNDEFINED_AVERAGE: &str = "undefined (no response times recorded)";

/// failure to build a [`Report`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// target doesn't parse or has no host
    #[error("Invalid URL")]
    InvalidUrl {
        /// the rejected target
        url: String,
    },
}

/// Guess at the target's platform, from its hostname alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HostLabel {
    /// hostname mentions linux
    Linux,
    /// anything else
    Windows,
}

impl HostLabel {
    /// `Linux` if the hostname contains "linux" in any case
    pub fn from_hostname(hostname: &str) -> Self {
        if hostname.to_lowercase().contains("linux") {
            HostLabel::Linux
        } else {
            HostLabel::Windows
        }
    }
}

impl fmt::Display for HostLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                HostLabel::Linux => "Linux",
                HostLabel::Windows => "Windows",
            }
        )
    }
}

/// Figures printed at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// requests asked for
    pub total: usize,
    /// successful requests
    pub success: usize,
    /// failed requests
    pub failure: usize,
    /// success percentage of `total`
    pub success_rate: f64,
    /// platform guess
    pub label: HostLabel,
    /// target host
    pub hostname: String,
    /// wall time of the run, in seconds
    pub total_execution_secs: f64,
    /// mean response time in seconds, `None` if nothing was timed
    pub average_response_secs: Option<f64>,
    /// requests per second
    pub average_request_rate: f64,
    /// workers cancelled before dispatch
    pub cancelled: usize,
    /// workers that panicked
    pub lost: usize,
}

impl Report {
    /// Build the report for a run against `url`
    pub fn new(summary: &RunSummary, url: &str) -> Result<Self, ReportError> {
        let hostname = hostname(url).ok_or_else(|| ReportError::InvalidUrl {
            url: url.to_owned(),
        })?;
        let average_response_secs = match summary.average_response_time() {
            Ok(avg) => Some(avg.as_secs_f64()),
            Err(err) => {
                warn!(%err, "average response time is undefined");
                None
            }
        };

        Ok(Self {
            total: summary.requested,
            success: summary.stats.success_count,
            failure: summary.stats.failure_count,
            success_rate: summary.success_rate(),
            label: HostLabel::from_hostname(&hostname),
            hostname,
            total_execution_secs: summary.total_elapsed.as_secs_f64(),
            average_response_secs,
            average_request_rate: summary.average_request_rate(),
            cancelled: summary.cancelled,
            lost: summary.lost,
        })
    }

    /// summary line followed by a right aligned metric table
    pub fn human_summary(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Total: {} | Success: {} | Failure: {} | Rate: {:.2}%\n",
            self.total, self.success, self.failure, self.success_rate
        ));

        let rows = [
            ("Metric".to_string(), "Value".to_string()),
            (self.label.to_string(), self.hostname.clone()),
            (
                "Total execution time".to_string(),
                format!("{:.2} sec", self.total_execution_secs),
            ),
            (
                "Average response time".to_string(),
                match self.average_response_secs {
                    Some(secs) => format!("{secs:.2} sec"),
                    None => UNDEFINED_AVERAGE.to_string(),
                },
            ),
            (
                "Average request rate".to_string(),
                format!("{:.2} requests/second", self.average_request_rate),
            ),
        ];
        // two spaces of padding, like a tab stop
        let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0) + 2;
        for (name, value) in &rows {
            output.push_str(&format!("{name:>width$}|{value}\n"));
        }
        output
    }
}

fn hostname(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str().filter(|host| !host.is_empty())?;
    Some(
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned(),
    )
}
