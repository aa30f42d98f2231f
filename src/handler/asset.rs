//! Bucket asset module
//!
//! Maps a request path onto a bucket object and turns the object store's
//! answer into the response sent to the client.

use crate::http::{self, ProxyBody};
use crate::upstream::{self, FetchError, ObjectStore};
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode, Uri};
use std::borrow::Cow;

/// Object served for the site root
pub const INDEX_DOCUMENT: &str = "/index.html";

/// Result of asking the bucket for one object
pub enum AssetOutcome {
    /// Upstream answered with status <= 399, forwarded untouched
    Served(Response<ProxyBody>),
    /// Upstream answered with status > 399
    UpstreamStatus {
        status: StatusCode,
        status_text: String,
        content_type: Option<HeaderValue>,
    },
    /// No response could be obtained from the upstream
    Unreachable(FetchError),
}

enum DotSegment {
    Current,
    Parent,
}

/// `.` or its percent-encoded form
fn is_dot(s: &str) -> bool {
    s == "." || s.eq_ignore_ascii_case("%2e")
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    if is_dot(segment) {
        return Some(DotSegment::Current);
    }
    let parent = [1, 3]
        .into_iter()
        .any(|split| match (segment.get(..split), segment.get(split..)) {
            (Some(head), Some(tail)) => is_dot(head) && is_dot(tail),
            _ => false,
        });
    parent.then_some(DotSegment::Parent)
}

/// Remove `.` and `..` segments, never climbing above the root.
/// A path ending in a dot segment keeps its trailing slash.
fn remove_dot_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = false;
    for segment in path.split('/').skip(1) {
        trailing_slash = true;
        match dot_segment(segment) {
            Some(DotSegment::Current) => {}
            Some(DotSegment::Parent) => {
                segments.pop();
            }
            None => {
                segments.push(segment);
                trailing_slash = false;
            }
        }
    }

    let mut normalized = String::with_capacity(path.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if trailing_slash || normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Confine the path to the bucket and rewrite the site root to its index
/// document; every other path is kept
pub fn resolve_path(path: &str) -> Cow<'_, str> {
    let path = if path.split('/').any(|s| dot_segment(s).is_some()) {
        Cow::Owned(remove_dot_segments(path))
    } else {
        Cow::Borrowed(path)
    };

    if path == "/" {
        Cow::Borrowed(INDEX_DOCUMENT)
    } else {
        path
    }
}

/// Absolute URI of the object backing `path`
pub fn upstream_uri(bucket_url: &str, path: &str) -> Result<Uri, FetchError> {
    format!("{bucket_url}{}", resolve_path(path))
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| FetchError::Request(e.into()))
}

/// Fetch one object and classify the answer
pub async fn fetch_asset<S: ObjectStore>(store: &S, uri: Uri) -> AssetOutcome {
    match store.fetch(uri).await {
        Ok(response) if response.status().as_u16() > 399 => AssetOutcome::UpstreamStatus {
            status: response.status(),
            status_text: upstream::status_text(&response),
            content_type: response.headers().get(header::CONTENT_TYPE).cloned(),
        },
        Ok(response) => AssetOutcome::Served(response),
        Err(err) => AssetOutcome::Unreachable(err),
    }
}

impl AssetOutcome {
    /// Final client response; upstream error bodies are dropped
    pub fn into_response(self, preserve_error_content_type: bool) -> Response<ProxyBody> {
        match self {
            Self::Served(response) => response,
            Self::UpstreamStatus {
                status,
                status_text,
                content_type,
            } => http::build_status_text_response(
                status,
                &status_text,
                content_type.filter(|_| preserve_error_content_type),
            ),
            Self::Unreachable(_) => http::build_502_response(),
        }
    }
}
