// Configuration module entry point
// Loads layered configuration and exposes the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{Config, UpstreamConfig};

/// Config file used when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config";

const LOG_LEVELS: [&str; 4] = ["error", "warn", "info", "debug"];

impl Config {
    /// Load configuration from the path given as first CLI argument,
    /// falling back to `config.toml` in the working directory
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::args()
            .nth(1)
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load configuration from specified file path (without extension)
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("EDGE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("upstream.endpoint", "http://storage.googleapis.com")?
            .set_default("upstream.bucket", "signalnerve")?
            .set_default("upstream.timeout", 10)?
            .set_default("upstream.retries", 1)?
            .set_default("upstream.retry_backoff_ms", 100)?
            .set_default("upstream.pool_idle_timeout", 90)?
            .set_default("upstream.pool_max_idle_per_host", 32)?
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let endpoint = self.upstream.endpoint.trim_end_matches('/');
        let Some(host) = endpoint.strip_prefix("http://") else {
            return Err(config::ConfigError::Message(format!(
                "upstream.endpoint must be an http:// URL, got '{}'",
                self.upstream.endpoint
            )));
        };
        if host.is_empty() {
            return Err(config::ConfigError::Message(
                "upstream.endpoint has no host".to_string(),
            ));
        }

        let bucket = self.upstream.bucket.trim_matches('/');
        if bucket.is_empty() || bucket.contains('/') {
            return Err(config::ConfigError::Message(format!(
                "upstream.bucket must be a single non-empty name, got '{}'",
                self.upstream.bucket
            )));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(config::ConfigError::Message(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Base URL every resolved asset path is appended to
    pub fn bucket_url(&self) -> String {
        format!(
            "{}/{}",
            self.upstream.endpoint.trim_end_matches('/'),
            self.upstream.bucket.trim_matches('/')
        )
    }
}
