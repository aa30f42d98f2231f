//! HTTP protocol layer module
//!
//! Response body type and response builders shared by the request handler
//! and the object store client.

pub mod response;

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;

/// Body of every response the server sends: either streamed from the
/// upstream or built locally
pub type ProxyBody = UnsyncBoxBody<Bytes, hyper::Error>;

/// Wrap an in-memory body
pub fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub use response::{build_405_response, build_502_response, build_status_text_response};
