//! REST search provider (Firecrawl-style `/search` endpoint)

use super::models::{SearchResult, SearchResults};
use super::traits::{SearchProvider, DEFAULT_TIMEOUT};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use crate::network::{bearer, HttpClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev/v2";
pub const DEFAULT_LIMIT: usize = 5;

/// Single-POST search client with a bearer credential
pub struct RestSearchClient {
    name: String,
    api_key: String,
    base_url: String,
    limit: usize,
    timeout: Duration,
    client: HttpClient,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<SearchData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct SearchData {
    #[serde(default)]
    web: Vec<WebHit>,
}

#[derive(Deserialize)]
struct WebHit {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    markdown: String,
}

impl From<WebHit> for SearchResult {
    fn from(hit: WebHit) -> Self {
        let content = if hit.markdown.is_empty() {
            hit.description.clone()
        } else {
            hit.markdown
        };
        SearchResult {
            title: hit.title,
            url: hit.url,
            content,
            snippet: hit.description,
        }
    }
}

impl RestSearchClient {
    pub fn new(name: impl Into<String>, config: &SearchProviderConfig, client: HttpClient) -> Self {
        Self {
            name: name.into(),
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            limit: config.max_results.filter(|&n| n > 0).unwrap_or(DEFAULT_LIMIT),
            timeout: config
                .timeout_secs
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            client,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/search", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SearchProvider for RestSearchClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "rest"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        if !self.is_available() {
            return Err(SearchError::NotConfigured(self.name.clone()));
        }

        let response = self
            .client
            .post(&self.endpoint(), self.timeout)
            .header("Authorization", bearer(&self.api_key))
            .json(&SearchRequest {
                query,
                limit: self.limit,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(provider = %self.name, status = status.as_u16(), "search response received");

        // A failed search may still carry the JSON envelope with an error text
        let parsed: SearchResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(SearchError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(e) => return Err(e.into()),
        };

        if !parsed.success {
            let message = parsed
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(SearchError::Provider(format!(
                "{} search failed: {}",
                self.name, message
            )));
        }

        let results = parsed
            .data
            .unwrap_or_default()
            .web
            .into_iter()
            .map(SearchResult::from)
            .collect();

        Ok(SearchResults::new(query, results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str, api_key: &str) -> RestSearchClient {
        let config = SearchProviderConfig {
            kind: "rest".to_string(),
            api_key: api_key.to_string(),
            base_url: Some(base_url.to_string()),
            ..Default::default()
        };
        RestSearchClient::new("firecrawl", &config, HttpClient::new().unwrap())
    }

    #[tokio::test]
    async fn test_search_maps_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer fc-key"))
            .and(body_json(json!({"query": "rust", "limit": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"web": [
                    {"url": "https://a", "title": "A", "description": "desc a", "markdown": "# body a"},
                    {"url": "https://b", "title": "B", "description": "desc b"}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let results = client(&server.uri(), "fc-key").search("rust").await.unwrap();
        assert_eq!(results.query, "rust");
        assert_eq!(results.results.len(), 2);
        assert_eq!(results.results[0].content, "# body a");
        assert_eq!(results.results[0].snippet, "desc a");
        assert_eq!(results.results[1].content, "desc b");
    }

    #[tokio::test]
    async fn test_unsuccessful_search_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "success": false, "error": "Insufficient credits"
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), "k").search("rust").await.unwrap_err();
        assert!(err.to_string().contains("Insufficient credits"));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;
        let err = client(&server.uri(), "k").search("rust").await.unwrap_err();
        assert!(err.to_string().contains("unknown error"));
    }

    #[tokio::test]
    async fn test_non_json_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client(&server.uri(), "k").search("rust").await.unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_client() {
        let c = client("http://127.0.0.1:1", "");
        assert!(!c.is_available());
        assert!(matches!(
            c.search("q").await,
            Err(SearchError::NotConfigured(_))
        ));
    }
}
