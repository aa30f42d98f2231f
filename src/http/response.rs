//! HTTP response building module
//!
//! Builders for the responses the edge produces itself rather than passing
//! through from the bucket.

use super::{full, ProxyBody};
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<ProxyBody> {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header(header::CONTENT_TYPE, TEXT_PLAIN)
        .header(header::ALLOW, "GET")
        .body(full("Method not allowed"))
        .unwrap_or_else(|e| {
            log_build_error("405", &e);
            fallback(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        })
}

/// Build a translated upstream error: same status, status text as body
///
/// `content_type` replaces the default `text/plain` when given.
pub fn build_status_text_response(
    status: StatusCode,
    status_text: &str,
    content_type: Option<HeaderValue>,
) -> Response<ProxyBody> {
    let content_type = content_type.unwrap_or_else(|| HeaderValue::from_static(TEXT_PLAIN));

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, status_text.len())
        .body(full(status_text.to_owned()))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            fallback(status, status_text)
        })
}

/// Build 502 Bad Gateway response for an unreachable bucket
pub fn build_502_response() -> Response<ProxyBody> {
    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header(header::CONTENT_TYPE, TEXT_PLAIN)
        .body(full("Bad Gateway"))
        .unwrap_or_else(|e| {
            log_build_error("502", &e);
            fallback(StatusCode::BAD_GATEWAY, "Bad Gateway")
        })
}

fn fallback(status: StatusCode, body: &str) -> Response<ProxyBody> {
    let mut resp = Response::new(full(body.to_owned()));
    *resp.status_mut() = status;
    resp
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
