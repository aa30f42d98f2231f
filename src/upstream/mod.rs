//! Object store module
//!
//! Abstracts the read-only bucket the assets are fetched from, so the request
//! handler can run against the real HTTP client or a stub store.

mod client;

pub use client::HttpObjectStore;

use crate::http::ProxyBody;
use hyper::{Response, Uri};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Read-only, key-addressed blob store
pub trait ObjectStore {
    /// GET the object at `uri`, returning the upstream response as-is
    fn fetch(&self, uri: Uri) -> impl Future<Output = Result<Response<ProxyBody>, FetchError>>;
}

/// Failure to obtain any response from the object store
#[derive(Debug)]
pub enum FetchError {
    /// The outbound request could not be built
    Request(hyper::http::Error),
    /// Connect, TLS or protocol failure
    Transport(hyper_util::client::legacy::Error),
    /// No response headers within the per-attempt timeout
    Timeout(Duration),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(err) => write!(f, "failed to build upstream request: {err}"),
            Self::Transport(err) => write!(f, "upstream transport error: {err}"),
            Self::Timeout(after) => {
                write!(f, "upstream timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Timeout(_) => None,
        }
    }
}

impl From<hyper::http::Error> for FetchError {
    fn from(err: hyper::http::Error) -> Self {
        Self::Request(err)
    }
}

impl From<hyper_util::client::legacy::Error> for FetchError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        Self::Transport(err)
    }
}

impl FetchError {
    /// Whether another attempt might succeed
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Request(_))
    }
}

/// Status text of an upstream response
///
/// Uses the reason phrase the upstream actually sent when it differs from the
/// canonical one, otherwise the canonical reason for the code.
pub fn status_text<B>(response: &Response<B>) -> String {
    if let Some(reason) = response.extensions().get::<hyper::ext::ReasonPhrase>() {
        return String::from_utf8_lossy(reason.as_bytes()).into_owned();
    }
    response
        .status()
        .canonical_reason()
        .unwrap_or_default()
        .to_string()
}
