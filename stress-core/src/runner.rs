//! # runner
//!
//! Fans a batch of requests out to one worker each. Every worker waits on the
//! shared limiter, executes its request and records the outcome; the runner
//! joins all of them before reading the totals.
use std::{sync::Arc, time::Duration};

use serde::Serialize;
use token_bucket::RateLimiter;
use tokio::{task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    aggregator::{AggregateStats, ResultAggregator, StatsError},
    executor::RequestExecutor,
    transport::Transport,
};

/// Drives one run. `run` consumes the runner, so a finished run can't be
/// restarted.
#[derive(Debug)]
pub struct LoadRunner<T> {
    limiter: Arc<RateLimiter>,
    executor: Arc<RequestExecutor<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Recorded,
    Cancelled,
}

impl<T: Transport> LoadRunner<T> {
    /// runner dispatching through `limiter`
    pub fn new(limiter: Arc<RateLimiter>, executor: RequestExecutor<T>) -> Self {
        Self {
            limiter,
            executor: Arc::new(executor),
        }
    }

    /// Send `request_count` requests to `url` concurrently and wait for all of
    /// them. Cancelling `token` stops workers still waiting on the limiter;
    /// requests already in flight run to completion.
    pub async fn run(self, url: &str, request_count: usize, token: CancellationToken) -> RunSummary {
        let url: Arc<str> = Arc::from(url);
        let aggregator = Arc::new(ResultAggregator::new());
        let started = Instant::now();
        info!(%url, request_count, "dispatching workers");

        let mut tasks = JoinSet::new();
        for index in 0..request_count {
            let limiter = Arc::clone(&self.limiter);
            let executor = Arc::clone(&self.executor);
            let aggregator = Arc::clone(&aggregator);
            let url = Arc::clone(&url);
            let token = token.clone();

            tasks.spawn(async move {
                if let Err(err) = limiter.acquire(&token).await {
                    debug!(index, %err, "worker stopped before dispatch");
                    return WorkerExit::Cancelled;
                }
                let outcome = executor.execute(&url, index).await;
                debug!(index, ?outcome, "request finished");
                aggregator.record(&outcome);
                WorkerExit::Recorded
            });
        }

        let mut cancelled = 0;
        let mut lost = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(WorkerExit::Recorded) => {}
                Ok(WorkerExit::Cancelled) => cancelled += 1,
                Err(err) => {
                    error!(?err, "worker task failed");
                    lost += 1;
                }
            }
        }
        let total_elapsed = started.elapsed();
        let stats = aggregator.snapshot();
        info!(
            success = stats.success_count,
            failure = stats.failure_count,
            cancelled,
            lost,
            ?total_elapsed,
            "all workers finished"
        );

        RunSummary {
            requested: request_count,
            stats,
            cancelled,
            lost,
            total_elapsed,
        }
    }
}

/// Final state of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// requests the run was asked to send
    pub requested: usize,
    /// aggregated outcomes
    pub stats: AggregateStats,
    /// workers stopped by cancellation before sending anything
    pub cancelled: usize,
    /// workers that panicked
    pub lost: usize,
    /// wall time from first dispatch to last join
    pub total_elapsed: Duration,
}

impl RunSummary {
    /// mean response time over every recorded outcome
    pub fn average_response_time(&self) -> Result<Duration, StatsError> {
        self.stats.average_response_time()
    }

    /// requests per second over the whole run
    pub fn average_request_rate(&self) -> f64 {
        self.requested as f64 / self.total_elapsed.as_secs_f64().max(1e-9)
    }

    /// percentage of requested requests that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.requested == 0 {
            return 0.0;
        }
        self.stats.success_count as f64 / self.requested as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        headers::HeaderSource,
        transport::{Attempt, Reply, RequestSpec},
    };

    /// answers every request with the same status and remembers when
    #[derive(Debug, Default)]
    struct Fixed {
        status: u16,
        panic_on_call: Option<usize>,
        calls: AtomicUsize,
        stamps: Mutex<Vec<Instant>>,
    }

    impl Fixed {
        fn status(status: u16) -> Self {
            Self {
                status,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, _request: &RequestSpec) -> Attempt {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.stamps.lock().push(Instant::now());
            if self.panic_on_call == Some(call) {
                panic!("transport blew up");
            }
            Attempt::Response(Reply::buffered(self.status, "nope"))
        }
    }

    fn runner(transport: Fixed, rate: f64, burst: u32) -> LoadRunner<Fixed> {
        LoadRunner::new(
            Arc::new(RateLimiter::new(rate, burst).unwrap()),
            RequestExecutor::with_default_attempts(
                transport,
                HeaderSource::new("/nonexistent/headers.json"),
            ),
        )
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn all_ok() {
        let summary = runner(Fixed::status(200), 100.0, 1)
            .run("http://localhost/", 15, CancellationToken::new())
            .await;

        assert_eq!(summary.requested, 15);
        assert_eq!(summary.stats.total_count, 15);
        assert_eq!(summary.stats.success_count, 15);
        assert_eq!(summary.stats.failure_count, 0);
        assert_eq!(summary.stats.response_times.len(), 15);
        assert_eq!(summary.success_rate(), 100.0);
        assert_eq!(summary.cancelled, 0);
        assert!(summary.average_response_time().is_ok());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn all_bad_request() {
        let summary = runner(Fixed::status(400), 100.0, 1)
            .run("http://localhost/", 15, CancellationToken::new())
            .await;

        assert_eq!(summary.stats.success_count, 0);
        assert_eq!(summary.stats.failure_count, 15);
        assert_eq!(summary.stats.response_times.len(), 15);
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn dispatch_is_paced_by_limiter() {
        let runner = runner(Fixed::status(200), 100.0, 1);
        let executor = Arc::clone(&runner.executor);
        let summary = runner
            .run("http://localhost/", 10, CancellationToken::new())
            .await;

        let mut stamps = executor.transport().stamps.lock().clone();
        stamps.sort();
        assert_eq!(stamps.len(), 10);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(9));
        }
        assert!(summary.total_elapsed >= Duration::from_millis(81));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn cancelled_before_start_sends_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = runner(Fixed::status(200), 100.0, 1);
        let executor = Arc::clone(&runner.executor);

        let summary = runner.run("http://localhost/", 15, token).await;

        assert_eq!(summary.cancelled, 15);
        assert_eq!(summary.stats, AggregateStats::default());
        assert_eq!(summary.average_response_time(), Err(StatsError::NoSamples));
        assert_eq!(executor.transport().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn cancel_mid_run_stops_waiting_workers() {
        let token = CancellationToken::new();
        let cancel = {
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                token.cancel();
            }
        };
        // one request per second: dispatches at 0s and 1s, then cancelled
        let run = runner(Fixed::status(200), 1.0, 1).run("http://localhost/", 5, token);
        let (summary, ()) = tokio::join!(run, cancel);

        assert_eq!(summary.stats.success_count, 2);
        assert_eq!(summary.cancelled, 3);
        assert_eq!(
            summary.stats.success_count + summary.stats.failure_count + summary.cancelled,
            5
        );
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn panicking_worker_does_not_stop_the_rest() {
        let transport = Fixed {
            status: 200,
            panic_on_call: Some(2),
            ..Fixed::default()
        };
        let summary = runner(transport, 100.0, 1)
            .run("http://localhost/", 6, CancellationToken::new())
            .await;

        assert_eq!(summary.lost, 1);
        assert_eq!(summary.stats.success_count, 5);
        assert_eq!(summary.stats.total_count, 5);
    }

    #[test]
    fn rates() {
        let summary = RunSummary {
            requested: 15,
            stats: AggregateStats {
                total_count: 15,
                success_count: 12,
                failure_count: 3,
                response_times: vec![Duration::from_millis(100); 15],
            },
            cancelled: 0,
            lost: 0,
            total_elapsed: Duration::from_secs(3),
        };
        assert_eq!(summary.average_request_rate(), 5.0);
        assert!((summary.success_rate() - 80.0).abs() < 1e-9);
        assert_eq!(
            summary.average_response_time(),
            Ok(Duration::from_millis(100))
        );
    }
}
