//! Chat Completions transport to the upstream provider

use super::client::HttpClient;
use crate::error::{ProxyError, Result};
use crate::orchestrator::ChatTransport;
use crate::protocol::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Response;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Ceiling for a buffered (non-streaming) upstream body
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Header carrying the trace id in both directions
pub const TRACE_HEADER: &str = "X-Trace-ID";

const BODY_PREVIEW_CHARS: usize = 2048;

/// Where and how one turn reaches its upstream
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub url: String,
    /// Full `Authorization` header value
    pub authorization: String,
    pub timeout: Duration,
    pub trace_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct UpstreamErrorBody {
    #[serde(default)]
    error: Option<UpstreamErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Default)]
struct UpstreamErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Sends Chat Completions requests
#[derive(Clone)]
pub struct UpstreamClient {
    http: HttpClient,
    max_body: usize,
}

impl UpstreamClient {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            max_body: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    async fn send(&self, target: &UpstreamTarget, request: &ChatRequest) -> Result<Response> {
        info!(
            target_url = %target.url,
            model = %request.model,
            stream = request.stream,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "sending request to upstream"
        );

        let mut builder = self
            .http
            .post(&target.url, target.timeout)
            .header("Authorization", &target.authorization)
            .json(request);
        if request.stream {
            builder = builder.header("Accept", "text/event-stream");
        }
        if let Some(trace_id) = &target.trace_id {
            builder = builder.header(TRACE_HEADER, trace_id);
        }

        let response = builder.send().await?;
        let status = response.status();
        info!(status = status.as_u16(), "received response from upstream");

        if status.is_client_error() || status.is_server_error() {
            let body = self.read_body(response).await.unwrap_or_default();
            let body = String::from_utf8_lossy(&body);
            error!(status = status.as_u16(), body = %preview(&body), "upstream error");
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response)
    }

    /// Read a body chunk by chunk, refusing anything over the limit
    async fn read_body(&self, mut response: Response) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body {
                return Err(ProxyError::BodyTooLarge {
                    limit: self.max_body,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// One non-streaming completion
    pub async fn complete(&self, target: &UpstreamTarget, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self.send(target, request).await?;
        let body = self.read_body(response).await?;
        debug!(body = %preview(&String::from_utf8_lossy(&body)), "raw upstream body");
        Ok(serde_json::from_slice(&body)?)
    }

    /// Open a streaming completion; the caller owns the byte stream
    pub async fn open_stream(
        &self,
        target: &UpstreamTarget,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static> {
        let response = self.send(target, request).await?;
        Ok(response.bytes_stream())
    }

    /// Pin this client to a target for use as a [`ChatTransport`]
    pub fn bind<'a>(&'a self, target: &'a UpstreamTarget) -> BoundTransport<'a> {
        BoundTransport {
            client: self,
            target,
        }
    }
}

/// An [`UpstreamClient`] paired with one target
pub struct BoundTransport<'a> {
    client: &'a UpstreamClient,
    target: &'a UpstreamTarget,
}

#[async_trait]
impl ChatTransport for BoundTransport<'_> {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.client.complete(self.target, request).await
    }
}

/// `error.message`, else top-level `message`, else the raw body
fn error_message(body: &str) -> String {
    let parsed: UpstreamErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .error
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .or(parsed.message.filter(|m| !m.is_empty()))
        .unwrap_or_else(|| body.to_string())
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatMessage, Role};
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(server: &MockServer) -> UpstreamTarget {
        UpstreamTarget {
            url: format!("{}/v1/chat/completions", server.uri()),
            authorization: "Bearer sk-test".to_string(),
            timeout: Duration::from_secs(5),
            trace_id: Some("trace-1".to_string()),
        }
    }

    fn request(stream: bool) -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::text(Role::User, "hi")],
            tools: Vec::new(),
            stream,
            temperature: None,
            max_tokens: None,
        }
    }

    fn client() -> UpstreamClient {
        UpstreamClient::new(HttpClient::new().unwrap())
    }

    #[tokio::test]
    async fn test_complete_forwards_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("x-trace-id", "trace-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "c1",
                "model": "m",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client().complete(&target(&server), &request(false)).await.unwrap();
        assert_eq!(resp.first_message().unwrap().text_content(), "hello");
    }

    #[tokio::test]
    async fn test_error_message_extraction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"message": "slow down", "type": "rate_limit"}})),
            )
            .mount(&server)
            .await;

        let err = client()
            .complete(&target(&server), &request(false))
            .await
            .unwrap_err();
        match err {
            ProxyError::Upstream { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_error_message_fallbacks() {
        assert_eq!(error_message(r#"{"message":"bad key"}"#), "bad key");
        assert_eq!(error_message("gateway exploded"), "gateway exploded");
        assert_eq!(error_message(r#"{"error":{}}"#), r#"{"error":{}}"#);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&server)
            .await;

        let err = client()
            .with_max_body(16)
            .complete(&target(&server), &request(false))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::BodyTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn test_open_stream_yields_bytes() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(header("accept", "text/event-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = client();
        let stream = client
            .open_stream(&target(&server), &request(true))
            .await
            .unwrap();
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(String::from_utf8(joined).unwrap(), body);
    }

    #[tokio::test]
    async fn test_bound_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let client = client();
        let target = target(&server);
        let err = client.bind(&target).complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, ProxyError::Upstream { status: 503, .. }));
    }
}
