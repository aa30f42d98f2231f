// Application state module
// Shared, read-only state handed to every connection

use super::types::Config;
use crate::handler::EdgeHandler;
use crate::upstream::HttpObjectStore;

/// Application state
pub struct AppState<S = HttpObjectStore> {
    pub config: Config,
    /// Bucket proxy with its pooled upstream client
    pub handler: EdgeHandler<S>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let store = HttpObjectStore::new(&config.upstream);
        let handler = EdgeHandler::new(
            store,
            config.bucket_url(),
            config.upstream.preserve_error_content_type,
        );

        Self::with_handler(config, handler)
    }
}

impl<S> AppState<S> {
    /// State around an already built handler
    pub fn with_handler(config: &Config, handler: EdgeHandler<S>) -> Self {
        Self {
            config: config.clone(),
            handler,
        }
    }
}
