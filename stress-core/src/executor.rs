//! # executor
//!
//! Performs one logical request: builds it, sends it through a [`Transport`]
//! retrying only on timeouts, and classifies what came back.
use std::time::Duration;

use reqwest::{Method, Url};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    aggregator::RequestOutcome,
    config::DEFAULT_ATTEMPTS,
    headers::{HeaderError, HeaderSource},
    transport::{Attempt, RequestSpec, Transport},
};

/// urls containing this are treated as API targets
pub const API_MARKER: &str = "/api";
/// body POSTed to API targets
pub const API_PAYLOAD: &str = r#"{"action":"get_stats"}"#;
/// content type of [`API_PAYLOAD`]
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// responses with this status get their body logged
const DIAGNOSTIC_STATUS: u16 = 400;

/// failure to build a request; nothing is sent when this happens
#[derive(Debug, Error)]
pub enum RequestError {
    /// target does not parse as a URL
    #[error("invalid request url `{url}`: {reason}")]
    InvalidUrl {
        /// the rejected url
        url: String,
        /// parser message
        reason: String,
    },
    /// header file could not be loaded
    #[error(transparent)]
    Headers(#[from] HeaderError),
}

/// Executes single logical requests over a transport
#[derive(Debug)]
pub struct RequestExecutor<T> {
    transport: T,
    headers: HeaderSource,
    max_attempts: usize,
}

impl<T: Transport> RequestExecutor<T> {
    /// `max_attempts` counts the first attempt and is at least 1
    pub fn new(transport: T, headers: HeaderSource, max_attempts: usize) -> Self {
        Self {
            transport,
            headers,
            max_attempts: max_attempts.max(1),
        }
    }

    /// executor with the default attempt budget
    pub fn with_default_attempts(transport: T, headers: HeaderSource) -> Self {
        Self::new(transport, headers, DEFAULT_ATTEMPTS)
    }

    /// the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// attempt budget per request
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Build the request for `url`. API targets become a JSON POST carrying
    /// every header from the header file.
    pub async fn prepare(&self, url: &str) -> Result<RequestSpec, RequestError> {
        let parsed = Url::parse(url).map_err(|err| RequestError::InvalidUrl {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;
        let mut spec = RequestSpec::get(parsed);

        if url.contains(API_MARKER) {
            let headers = self.headers.load().await?;
            for (name, value) in headers.iter() {
                spec.add_header(name, value);
            }
            spec.method = Method::POST;
            spec.set_header("Content-Type", JSON_CONTENT_TYPE);
            spec.body = Some(API_PAYLOAD);
        }
        Ok(spec)
    }

    /// Run request `index` against `url` to a terminal outcome. Never fails;
    /// every error becomes a failed outcome and a log line.
    pub async fn execute(&self, url: &str, index: usize) -> RequestOutcome {
        let spec = match self.prepare(url).await {
            Ok(spec) => spec,
            Err(err) => {
                warn!(index, %err, "failed to build request");
                return RequestOutcome::failed(Duration::ZERO);
            }
        };

        let mut elapsed = Duration::ZERO;
        let mut reply = None;
        for attempt in 1..=self.max_attempts {
            let start = Instant::now();
            let sent = self.transport.send(&spec).await;
            elapsed = start.elapsed();

            match sent {
                Attempt::Response(resp) => {
                    debug!(index, attempt, status = resp.status(), ?elapsed, "got response");
                    reply = Some(resp);
                    break;
                }
                Attempt::Timeout(err) => {
                    warn!(index, attempt, ?elapsed, %err, "request timed out");
                }
                Attempt::Failed(err) => {
                    warn!(index, attempt, ?elapsed, %err, "request failed");
                    return RequestOutcome::failed(elapsed);
                }
            }
        }

        let Some(reply) = reply else {
            warn!(index, attempts = self.max_attempts, "no attempts left after timeouts");
            return RequestOutcome::failed(elapsed);
        };

        let status = reply.status();
        if status == DIAGNOSTIC_STATUS {
            match reply.text().await {
                Ok(body) => warn!(index, status, %body, "response body"),
                Err(err) => warn!(index, status, %err, "error reading response body"),
            }
        }
        RequestOutcome::from_status(status, elapsed)
    }
}
