//! HTTP object store client
//!
//! Pooled HTTP/1.1 client with a per-attempt timeout and bounded retries on
//! transport failures. Upstream error statuses are returned, never retried.

use super::{FetchError, ObjectStore};
use crate::config::UpstreamConfig;
use crate::http::ProxyBody;
use crate::logger;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{header, Method, Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

const USER_AGENT: &str = concat!("bucket-edge/", env!("CARGO_PKG_VERSION"));

/// Object store reached over plain HTTP
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
    retries: u32,
    retry_backoff: Duration,
}

impl HttpObjectStore {
    pub fn new(config: &UpstreamConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeout)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        Self {
            client,
            timeout: Duration::from_secs(config.timeout),
            retries: config.retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Override the per-attempt timeout
    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a single GET without retry
    async fn request_once(&self, uri: &Uri) -> Result<Response<ProxyBody>, FetchError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.clone())
            .header(header::USER_AGENT, USER_AGENT)
            .body(Empty::new())?;

        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response.map(|body| body.boxed_unsync())),
            Ok(Err(err)) => Err(FetchError::Transport(err)),
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }

    /// Back-off before retry number `attempt` (0-based)
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }
}

impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, uri: Uri) -> Result<Response<ProxyBody>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.request_once(&uri).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    let delay = self.backoff(attempt);
                    logger::log_warning(&format!(
                        "Upstream attempt {} for {uri} failed: {err}; retrying in {}ms",
                        attempt + 1,
                        delay.as_millis()
                    ));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
