//! Shared outbound HTTP client

use reqwest::{Client, RequestBuilder};
use std::time::Duration;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Idle connections kept per host
const POOL_MAX_IDLE_PER_HOST: usize = 20;

/// reqwest client wrapper shared by the upstream transport and search providers
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }

    /// POST with a per-request timeout
    pub fn post(&self, url: &str, timeout: Duration) -> RequestBuilder {
        self.client.post(url).timeout(timeout)
    }
}

/// Value for an `Authorization` header carrying a bearer token
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_bearer() {
        assert_eq!(bearer("sk-1"), "Bearer sk-1");
    }
}
