//! # transport
//!
//! The seam between request execution and the network. [`RequestExecutor`]
//! drives its retry loop from the [`Attempt`] variant returned here and never
//! inspects a raw client error.
//!
//! [`RequestExecutor`]: crate::executor::RequestExecutor
use std::{io, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use thiserror::Error;
use tracing::trace;

/// errors surfaced by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// error from the http client
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// io level failure
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A fully prepared request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    /// http method
    pub method: Method,
    /// target
    pub url: Url,
    /// headers in insertion order
    pub headers: Vec<(String, String)>,
    /// fixed body, if any
    pub body: Option<&'static str>,
}

impl RequestSpec {
    /// plain GET with no headers
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// first value for `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// append a header, keeping any existing value of the same name
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// replace every value of `name` with `value`
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.into()));
    }
}

/// outcome of a single send
#[derive(Debug)]
pub enum Attempt {
    /// the transport gave up waiting; worth another try
    Timeout(TransportError),
    /// any other transport failure
    Failed(TransportError),
    /// a response arrived, whatever its status
    Response(Reply),
}

/// A response whose body has not been read yet. Dropping it releases the body.
#[derive(Debug)]
pub struct Reply {
    status: u16,
    body: Body,
}

#[derive(Debug)]
enum Body {
    Http(reqwest::Response),
    Buffered(Result<String, TransportError>),
}

impl Reply {
    /// wrap a live client response
    pub fn from_http(resp: reqwest::Response) -> Self {
        Self {
            status: resp.status().as_u16(),
            body: Body::Http(resp),
        }
    }

    /// response with an already available body
    pub fn buffered(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: Body::Buffered(Ok(body.into())),
        }
    }

    /// response whose body will fail to read
    pub fn unreadable(status: u16, err: TransportError) -> Self {
        Self {
            status,
            body: Body::Buffered(Err(err)),
        }
    }

    /// http status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// read the body to the end, consuming the reply
    pub async fn text(self) -> Result<String, TransportError> {
        match self.body {
            Body::Http(resp) => Ok(resp.text().await?),
            Body::Buffered(body) => body,
        }
    }
}

/// Something that can put a [`RequestSpec`] on the wire
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// perform one attempt
    async fn send(&self, request: &RequestSpec) -> Attempt;
}

/// [`Transport`] over a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// build a client that gives up on a request after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestSpec) -> Attempt {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        trace!(method = %request.method, url = %request.url, "sending request");
        match builder.send().await {
            Ok(resp) => Attempt::Response(Reply::from_http(resp)),
            Err(err) if err.is_timeout() => Attempt::Timeout(err.into()),
            Err(err) => Attempt::Failed(err.into()),
        }
    }
}
