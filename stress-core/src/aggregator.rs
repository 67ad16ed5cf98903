//! # aggregator
//!
//! Thread-safe accumulation of per-request outcomes
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// terminal result of one logical request, after any retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestOutcome {
    /// duration of the last attempt performed
    pub elapsed: Duration,
    /// true iff a response arrived with status 200
    pub succeeded: bool,
    /// status of the final response, if one arrived
    pub status: Option<u16>,
}

impl RequestOutcome {
    /// outcome of a request that got a response
    pub fn from_status(status: u16, elapsed: Duration) -> Self {
        Self {
            elapsed,
            succeeded: status == 200,
            status: Some(status),
        }
    }

    /// failed outcome with no response
    pub fn failed(elapsed: Duration) -> Self {
        Self {
            elapsed,
            succeeded: false,
            status: None,
        }
    }
}

/// Totals across every recorded outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    /// outcomes recorded
    pub total_count: usize,
    /// outcomes that succeeded
    pub success_count: usize,
    /// outcomes that failed
    pub failure_count: usize,
    /// elapsed time of every outcome, in recording order
    pub response_times: Vec<Duration>,
}

/// statistics that can't be computed
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StatsError {
    /// averaging over zero samples
    #[error("no response times were recorded")]
    NoSamples,
}

impl AggregateStats {
    /// mean of `response_times`
    pub fn average_response_time(&self) -> Result<Duration, StatsError> {
        if self.response_times.is_empty() {
            return Err(StatsError::NoSamples);
        }
        // summed in nanos so neither the total nor the count can overflow
        let total: u128 = self.response_times.iter().map(Duration::as_nanos).sum();
        let mean = total / self.response_times.len() as u128;
        // a mean never exceeds the largest sample, so the seconds fit
        Ok(Duration::new(
            (mean / NANOS_PER_SEC) as u64,
            (mean % NANOS_PER_SEC) as u32,
        ))
    }
}

/// Accumulates outcomes from any number of workers.
///
/// Every [`record`] runs one critical section over all counters, so no
/// outcome is lost or counted twice.
///
/// [`record`]: ResultAggregator::record
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: Mutex<AggregateStats>,
}

impl ResultAggregator {
    /// empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// fold one outcome in
    pub fn record(&self, outcome: &RequestOutcome) {
        let mut stats = self.inner.lock();
        stats.total_count += 1;
        stats.response_times.push(outcome.elapsed);
        if outcome.succeeded {
            stats.success_count += 1;
        } else {
            stats.failure_count += 1;
        }
    }

    /// Copy of the current totals. Only meaningful once every writer is done.
    pub fn snapshot(&self) -> AggregateStats {
        self.inner.lock().clone()
    }

    /// final totals, consuming the aggregator
    pub fn into_stats(self) -> AggregateStats {
        self.inner.into_inner()
    }
}
