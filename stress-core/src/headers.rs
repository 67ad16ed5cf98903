//! extra request headers, read from a JSON object of string keys to string values
use std::{
    collections::BTreeMap,
    io,
    path::PathBuf,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

/// header name -> header value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSet(BTreeMap<String, String>);

impl HeaderSet {
    /// parse a JSON object
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// iterate name/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// look up a header by exact name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// number of headers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// no headers at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// failure to produce a [`HeaderSet`]
#[derive(Debug, Error)]
pub enum HeaderError {
    /// file missing or unreadable
    #[error("failed to read header file {}: {source}", .path.display())]
    Read {
        /// file we tried
        path: PathBuf,
        /// underlying error
        #[source]
        source: io::Error,
    },
    /// not a JSON object of strings
    #[error("failed to parse header file {}: {source}", .path.display())]
    Parse {
        /// file we tried
        path: PathBuf,
        /// underlying error
        #[source]
        source: serde_json::Error,
    },
}

/// Lazily loads the header file.
///
/// A successful load is kept for the rest of the run. Failed loads are not
/// remembered, so each caller that needs headers while the file is bad gets
/// its own error.
#[derive(Debug)]
pub struct HeaderSource {
    path: PathBuf,
    cached: OnceCell<Arc<HeaderSet>>,
}

impl HeaderSource {
    /// source backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceCell::new(),
        }
    }

    /// the header set, reading the file on first use
    pub async fn load(&self) -> Result<Arc<HeaderSet>, HeaderError> {
        self.cached
            .get_or_try_init(|| async {
                let bytes = tokio::fs::read(&self.path)
                    .await
                    .map_err(|source| HeaderError::Read {
                        path: self.path.clone(),
                        source,
                    })?;
                let headers =
                    HeaderSet::from_json(&bytes).map_err(|source| HeaderError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                debug!(path = %self.path.display(), count = headers.len(), "loaded header file");
                Ok::<_, HeaderError>(Arc::new(headers))
            })
            .await
            .map(Arc::clone)
    }
}
