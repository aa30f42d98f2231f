//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method validation, object
//! lookup in the bucket, response translation and access logging.

use crate::config::AppState;
use crate::handler::asset::{self, AssetOutcome};
use crate::http::{self, ProxyBody};
use crate::logger::{self, AccessLogEntry};
use crate::upstream::ObjectStore;
use hyper::body::Body as _;
use hyper::{header, Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Serves every request from one bucket
pub struct EdgeHandler<S> {
    store: S,
    bucket_url: String,
    preserve_error_content_type: bool,
}

impl<S: ObjectStore> EdgeHandler<S> {
    pub fn new(store: S, bucket_url: impl Into<String>, preserve_error_content_type: bool) -> Self {
        Self {
            store,
            bucket_url: bucket_url.into(),
            preserve_error_content_type,
        }
    }

    /// Produce the response for one request; never fails
    pub async fn handle<B>(&self, req: &Request<B>) -> Response<ProxyBody> {
        if let Some(resp) = check_http_method(req.method()) {
            return resp;
        }

        let outcome = match asset::upstream_uri(&self.bucket_url, req.uri().path()) {
            Ok(uri) => {
                logger::log_debug(&format!("[Upstream] GET {uri}"));
                asset::fetch_asset(&self.store, uri).await
            }
            Err(err) => AssetOutcome::Unreachable(err),
        };

        if let AssetOutcome::Unreachable(err) = &outcome {
            logger::log_error(&format!(
                "Upstream unreachable for {}: {err}",
                req.uri().path()
            ));
        }

        outcome.into_response(self.preserve_error_content_type)
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B, S: ObjectStore>(
    req: Request<B>,
    state: Arc<AppState<S>>,
    peer_addr: SocketAddr,
) -> Result<Response<ProxyBody>, Infallible> {
    let started = Instant::now();
    let response = state.handler.handle(&req).await;

    if state.config.logging.access_log {
        let entry = access_entry(&req, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Only GET is served; everything else gets 405
fn check_http_method(method: &Method) -> Option<Response<ProxyBody>> {
    if method == Method::GET {
        None
    } else {
        logger::log_warning(&format!("Method not allowed: {method}"));
        Some(http::build_405_response())
    }
}

fn access_entry<B>(
    req: &Request<B>,
    response: &Response<ProxyBody>,
    peer_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let header_value = |name: header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = version_str(req.version()).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = response
        .body()
        .size_hint()
        .exact()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default();
    entry.referer = header_value(header::REFERER);
    entry.user_agent = header_value(header::USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}

const fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::FetchError;
    use http_body_util::BodyExt;
    use hyper::{StatusCode, Uri};
    use std::sync::Mutex;
    use std::time::Duration;

    const BUCKET: &str = "http://objects.test/site";

    /// Stub bucket: echoes the requested path, or answers with a fixed reply
    #[derive(Default)]
    struct StubStore {
        reply: Option<(u16, &'static str)>,
        content_type: Option<&'static str>,
        reason: Option<&'static str>,
        unreachable: bool,
        seen: Mutex<Vec<Uri>>,
    }

    impl StubStore {
        fn replying(status: u16, body: &'static str) -> Self {
            Self {
                reply: Some((status, body)),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(ToString::to_string)
                .collect()
        }
    }

    impl ObjectStore for StubStore {
        async fn fetch(&self, uri: Uri) -> Result<Response<ProxyBody>, FetchError> {
            self.seen.lock().unwrap().push(uri.clone());
            if self.unreachable {
                return Err(FetchError::Timeout(Duration::from_secs(1)));
            }

            let (status, body) = match self.reply {
                Some((status, body)) => (status, body.to_string()),
                None => (200, uri.path().to_string()),
            };
            let mut resp = Response::builder()
                .status(status)
                .header("x-goog-generation", "1")
                .header(
                    header::CONTENT_TYPE,
                    self.content_type.unwrap_or("text/html"),
                )
                .body(http::full(body))
                .unwrap();
            if let Some(reason) = self.reason {
                resp.extensions_mut()
                    .insert(hyper::ext::ReasonPhrase::from_static(reason.as_bytes()));
            }
            Ok(resp)
        }
    }

    fn handler(store: StubStore) -> EdgeHandler<StubStore> {
        EdgeHandler::new(store, BUCKET, false)
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder().method(method).uri(uri).body(()).unwrap()
    }

    async fn body_string(resp: Response<ProxyBody>) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_non_get_methods_rejected_without_fetch() {
        let h = handler(StubStore::default());
        for method in [
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::PATCH,
            Method::OPTIONS,
        ] {
            let resp = h.handle(&request(method.clone(), "/")).await;
            assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
            assert_eq!(body_string(resp).await, "Method not allowed");
        }
        assert!(h.store.requests().is_empty());
    }

    #[tokio::test]
    async fn test_root_fetches_index_document() {
        let h = handler(StubStore::default());
        let resp = h.handle(&request(Method::GET, "/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "/site/index.html");
        assert_eq!(h.store.requests(), vec![format!("{BUCKET}/index.html")]);
    }

    #[tokio::test]
    async fn test_other_paths_not_rewritten() {
        let h = handler(StubStore::default());
        let resp = h.handle(&request(Method::GET, "/photo.jpg")).await;
        assert_eq!(body_string(resp).await, "/site/photo.jpg");

        let resp = h.handle(&request(Method::GET, "/pages/about/")).await;
        assert_eq!(body_string(resp).await, "/site/pages/about/");
    }

    #[tokio::test]
    async fn test_dot_segments_stay_inside_bucket() {
        let h = handler(StubStore::default());
        for path in [
            "/../other-bucket/secret.txt",
            "/%2e%2e/other-bucket/secret.txt",
            "/%2E%2E/other-bucket/secret.txt",
            "/a/../../x",
        ] {
            let resp = h.handle(&request(Method::GET, path)).await;
            assert_eq!(resp.status(), StatusCode::OK, "{path}");
        }
        assert_eq!(
            h.store.requests(),
            vec![
                format!("{BUCKET}/other-bucket/secret.txt"),
                format!("{BUCKET}/other-bucket/secret.txt"),
                format!("{BUCKET}/other-bucket/secret.txt"),
                format!("{BUCKET}/x"),
            ]
        );
    }

    #[tokio::test]
    async fn test_parent_of_root_serves_index_document() {
        let h = handler(StubStore::default());
        h.handle(&request(Method::GET, "/a/..")).await;
        assert_eq!(h.store.requests(), vec![format!("{BUCKET}/index.html")]);
    }

    #[tokio::test]
    async fn test_query_string_not_forwarded() {
        let h = handler(StubStore::default());
        h.handle(&request(Method::GET, "/app.js?v=3")).await;
        assert_eq!(h.store.requests(), vec![format!("{BUCKET}/app.js")]);
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let h = handler(StubStore::replying(200, "<html>ok</html>"));
        let resp = h.handle(&request(Method::GET, "/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-goog-generation"], "1");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body_string(resp).await, "<html>ok</html>");
    }

    #[tokio::test]
    async fn test_redirect_status_passes_through() {
        let h = handler(StubStore::replying(304, ""));
        let resp = h.handle(&request(Method::GET, "/style.css")).await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(resp.headers()["x-goog-generation"], "1");
    }

    #[tokio::test]
    async fn test_not_found_translated() {
        let store = StubStore {
            content_type: Some("application/xml"),
            ..StubStore::replying(404, "<Error><Code>NoSuchKey</Code></Error>")
        };
        let h = handler(store);
        let resp = h.handle(&request(Method::GET, "/missing.html")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().get("x-goog-generation").is_none());
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_string(resp).await, "Not Found");
    }

    #[tokio::test]
    async fn test_server_error_translated() {
        let h = handler(StubStore::replying(500, "boom"));
        let resp = h.handle(&request(Method::GET, "/")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_upstream_reason_phrase_used() {
        let store = StubStore {
            reason: Some("Access Denied"),
            ..StubStore::replying(403, "<Error/>")
        };
        let h = handler(store);
        let resp = h.handle(&request(Method::GET, "/private.txt")).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_string(resp).await, "Access Denied");
    }

    #[tokio::test]
    async fn test_error_content_type_preserved_when_enabled() {
        let store = StubStore {
            content_type: Some("application/xml"),
            ..StubStore::replying(404, "<Error/>")
        };
        let h = EdgeHandler::new(store, BUCKET, true);
        let resp = h.handle(&request(Method::GET, "/missing")).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/xml");
        assert_eq!(body_string(resp).await, "Not Found");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let store = StubStore {
            unreachable: true,
            ..StubStore::default()
        };
        let h = handler(store);
        let resp = h.handle(&request(Method::GET, "/")).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_string(resp).await, "Bad Gateway");
        assert_eq!(h.store.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_requests_identical() {
        let h = handler(StubStore::replying(200, "<html>ok</html>"));
        let first = h.handle(&request(Method::GET, "/")).await;
        let second = h.handle(&request(Method::GET, "/")).await;
        assert_eq!(first.status(), second.status());
        assert_eq!(first.headers(), second.headers());
        assert_eq!(body_string(first).await, body_string(second).await);
        assert_eq!(h.store.requests().len(), 2);
    }

    fn app_state(store: StubStore) -> Arc<AppState<StubStore>> {
        let config = crate::config::Config::load_from("does-not-exist").unwrap();
        Arc::new(AppState::with_handler(&config, handler(store)))
    }

    #[tokio::test]
    async fn test_handle_request_serves_through_state() {
        let state = app_state(StubStore::replying(200, "console.log(1)"));
        let peer: SocketAddr = "203.0.113.7:51000".parse().unwrap();
        let req = request(Method::GET, "/app.js?v=3");

        let resp = handle_request(req, Arc::clone(&state), peer).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "console.log(1)");
        assert_eq!(state.handler.store.requests(), vec![format!("{BUCKET}/app.js")]);
    }

    #[tokio::test]
    async fn test_handle_request_rejects_post() {
        let state = app_state(StubStore::default());
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let req = request(Method::POST, "/");

        let resp = handle_request(req, Arc::clone(&state), peer).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(state.handler.store.requests().is_empty());
    }

    #[tokio::test]
    async fn test_access_entry_fields() {
        let h = handler(StubStore::replying(200, "console.log(1)"));
        let req = Request::builder()
            .method(Method::GET)
            .uri("/app.js?v=3")
            .version(Version::HTTP_10)
            .header(header::USER_AGENT, "curl/8.5.0")
            .header(header::REFERER, "http://example.com/")
            .body(())
            .unwrap();
        let peer: SocketAddr = "203.0.113.7:51000".parse().unwrap();
        let started = Instant::now();

        let resp = h.handle(&req).await;
        let entry = access_entry(&req, &resp, peer, started);
        assert_eq!(entry.remote_addr, "203.0.113.7");
        assert_eq!(entry.method, "GET");
        assert_eq!(entry.path, "/app.js");
        assert_eq!(entry.query.as_deref(), Some("v=3"));
        assert_eq!(entry.http_version, "1.0");
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body_bytes, "console.log(1)".len());
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8.5.0"));
        assert_eq!(entry.referer.as_deref(), Some("http://example.com/"));
        // The query is logged but never sent to the bucket
        assert_eq!(h.store.requests(), vec![format!("{BUCKET}/app.js")]);
    }

    #[tokio::test]
    async fn test_access_entry_translated_status() {
        let h = handler(StubStore::replying(404, "<Error/>"));
        let req = request(Method::GET, "/missing.html");
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();

        let resp = h.handle(&req).await;
        let entry = access_entry(&req, &resp, peer, Instant::now());
        assert_eq!(entry.status, 404);
        assert_eq!(entry.body_bytes, "Not Found".len());
        assert!(entry.query.is_none());
        assert!(entry.user_agent.is_none());
    }

    #[test]
    fn test_version_str() {
        assert_eq!(version_str(Version::HTTP_11), "1.1");
        assert_eq!(version_str(Version::HTTP_10), "1.0");
        assert_eq!(version_str(Version::HTTP_2), "2");
    }
}
