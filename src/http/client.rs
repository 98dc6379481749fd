// src/http/client.rs
//
// reqwest client configuration for the job API

use std::time::Duration;

use reqwest::ClientBuilder;
use tracing::debug;

use crate::error::{EtlError, Result};

/// HTTP client configuration for the job API
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout (one API call, not a whole query job)
    pub request_timeout: Duration,
    /// TCP keepalive settings
    pub tcp_keepalive: Option<Duration>,
    /// Pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            tcp_keepalive: Some(Duration::from_secs(60)),
            pool_idle_timeout: Some(Duration::from_secs(90)),
        }
    }
}

/// Build the shared reqwest client from `config`.
pub fn build_http_client(config: &HttpClientConfig) -> Result<reqwest::Client> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(concat!("parsed-names/", env!("CARGO_PKG_VERSION")));

    if let Some(keepalive) = config.tcp_keepalive {
        builder = builder.tcp_keepalive(keepalive);
    }

    if let Some(idle_timeout) = config.pool_idle_timeout {
        builder = builder.pool_idle_timeout(idle_timeout);
    }

    debug!("Building job API HTTP client: {:?}", config);
    builder
        .tcp_nodelay(true)
        .use_rustls_tls()
        .build()
        .map_err(|e| EtlError::transport("building HTTP client", e))
}
