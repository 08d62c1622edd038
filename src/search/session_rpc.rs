//! Session-based JSON-RPC search provider (MCP-style tool server)
//!
//! Every search is a handshake (`initialize`) followed by an invocation
//! (`tools/call`), both POSTed to the same endpoint. The handshake hands out
//! a session token in a response header which later invocations echo back.
//! When the server complains about authorization, the session is dropped
//! and the whole sequence is retried once.

use super::models::{SearchResult, SearchResults};
use super::traits::{SearchProvider, DEFAULT_TIMEOUT};
use crate::config::SearchProviderConfig;
use crate::error::SearchError;
use crate::network::{bearer, HttpClient};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_ENDPOINT: &str = "https://open.bigmodel.cn/api/mcp/web_search_prime/mcp";
pub const DEFAULT_TOOL_NAME: &str = "webSearchPrime";
pub const DEFAULT_QUERY_PARAM: &str = "search_query";

/// Session token header
pub const SESSION_HEADER: &str = "mcp-session-id";

const PROTOCOL_VERSION: &str = "2024-11-05";
const ACCEPT: &str = "application/json, text/event-stream";
const INITIALIZE_ID: u64 = 1;
const INVOKE_ID: u64 = 2;

/// Error text fragments that mean the credential or session was rejected
const AUTH_MARKERS: &[&str] = &["apikey", "api key", "unauthorized", "-401"];
const AUTH_ERROR_CODE: i64 = -401;

/// An established session; the server may not hand out a token at all
#[derive(Debug, Clone)]
struct Session {
    token: Option<String>,
}

pub struct SessionRpcClient {
    name: String,
    api_key: String,
    endpoint: String,
    tool_name: String,
    query_param: String,
    timeout: Duration,
    client: HttpClient,
    /// Held across the handshake so concurrent searches share one session
    session: Mutex<Option<Session>>,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ToolResult {
    #[serde(default)]
    content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

#[derive(Deserialize)]
struct ToolContent {
    #[serde(default)]
    text: String,
}

/// The first content text is JSON holding either the hit list itself or a
/// string that encodes it once more
#[derive(Deserialize)]
#[serde(untagged)]
enum Encoded {
    Nested(String),
    Direct(Vec<Hit>),
}

#[derive(Deserialize)]
struct Hit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    snippet: String,
}

impl From<Hit> for SearchResult {
    fn from(hit: Hit) -> Self {
        let url = if hit.link.is_empty() { hit.url } else { hit.link };
        SearchResult {
            title: hit.title,
            url,
            content: hit.content,
            snippet: hit.snippet,
        }
    }
}

/// Result of one invocation attempt
enum Attempt {
    Done(SearchResults),
    AuthRejected(String),
}

impl SessionRpcClient {
    pub fn new(name: impl Into<String>, config: &SearchProviderConfig, client: HttpClient) -> Self {
        let non_empty = |v: &Option<String>, default: &str| {
            v.clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            name: name.into(),
            api_key: config.api_key.clone(),
            endpoint: non_empty(&config.base_url, DEFAULT_ENDPOINT),
            tool_name: non_empty(&config.tool_name, DEFAULT_TOOL_NAME),
            query_param: non_empty(&config.query_param, DEFAULT_QUERY_PARAM),
            timeout: config
                .timeout_secs
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            client,
            session: Mutex::new(None),
        }
    }

    fn request(&self, body: &RpcRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint, self.timeout)
            .header("Content-Type", "application/json")
            .header("Accept", ACCEPT)
            .header("Authorization", bearer(&self.api_key))
            .json(body)
    }

    /// Return the session token, running the handshake if no session exists
    async fn ensure_session(&self) -> Result<Option<String>, SearchError> {
        let mut session = self.session.lock().await;
        if let Some(existing) = session.as_ref() {
            return Ok(existing.token.clone());
        }

        debug!(provider = %self.name, "initializing new session");
        let established = self.handshake().await?;
        let token = established.token.clone();
        *session = Some(established);
        Ok(token)
    }

    async fn clear_session(&self) {
        *self.session.lock().await = None;
    }

    async fn handshake(&self) -> Result<Session, SearchError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            method: "initialize",
            params: json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
            id: INITIALIZE_ID,
        };

        let response = self.request(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // HeaderMap lookups ignore case
        let token = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        if token.is_none() {
            warn!(provider = %self.name, "no session token in handshake response, continuing without");
        }

        Ok(Session { token })
    }

    async fn invoke(&self, query: &str, token: Option<&str>) -> Result<Attempt, SearchError> {
        let mut arguments = Map::new();
        arguments.insert(self.query_param.clone(), Value::String(query.to_string()));

        let body = RpcRequest {
            jsonrpc: "2.0",
            method: "tools/call",
            params: json!({
                "name": self.tool_name,
                "arguments": arguments,
            }),
            id: INVOKE_ID,
        };

        let mut request = self.request(&body);
        if let Some(token) = token {
            request = request.header(SESSION_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(provider = %self.name, status = status.as_u16(), "tool call response received");

        if status == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::AuthRejected(text));
        }
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let envelope: RpcResponse = serde_json::from_str(unwrap_event_line(&text))?;

        if let Some(error) = envelope.error {
            if error.code == AUTH_ERROR_CODE || is_auth_complaint(&error.message) {
                return Ok(Attempt::AuthRejected(error.message));
            }
            return Err(SearchError::Provider(format!(
                "search tool error: {} (code: {})",
                error.message, error.code
            )));
        }

        let result: ToolResult = serde_json::from_value(envelope.result.unwrap_or(Value::Null))?;

        if result.is_error {
            let message = result
                .content
                .into_iter()
                .next()
                .map(|c| c.text)
                .unwrap_or_default();
            if is_auth_complaint(&message) {
                return Ok(Attempt::AuthRejected(message));
            }
            if message.is_empty() {
                return Err(SearchError::Provider("tool error: unknown error".to_string()));
            }
            return Err(SearchError::Provider(format!("tool error: {}", message)));
        }

        let first = result
            .content
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Provider("no content in response".to_string()))?;

        Ok(Attempt::Done(SearchResults::new(query, decode_hits(&first.text)?)))
    }
}

/// Body may be a single SSE-style `data:` line instead of raw JSON
fn unwrap_event_line(body: &str) -> &str {
    body.lines()
        .find_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .unwrap_or(body)
}

fn is_auth_complaint(message: &str) -> bool {
    let lower = message.to_lowercase();
    AUTH_MARKERS.iter().any(|m| lower.contains(m))
}

fn decode_hits(text: &str) -> Result<Vec<SearchResult>, SearchError> {
    let hits = match serde_json::from_str::<Encoded>(text)? {
        Encoded::Nested(inner) => serde_json::from_str::<Vec<Hit>>(&inner)?,
        Encoded::Direct(hits) => hits,
    };
    Ok(hits.into_iter().map(SearchResult::from).collect())
}

#[async_trait]
impl SearchProvider for SessionRpcClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "session_rpc"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Room for a handshake and invocation, twice
    fn timeout(&self) -> Duration {
        self.timeout * 4
    }

    async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        if !self.is_available() {
            return Err(SearchError::NotConfigured(self.name.clone()));
        }

        for attempt in 0..2 {
            let token = self.ensure_session().await?;
            match self.invoke(query, token.as_deref()).await? {
                Attempt::Done(results) => return Ok(results),
                Attempt::AuthRejected(message) => {
                    warn!(
                        provider = %self.name,
                        attempt,
                        error = %message,
                        "session rejected, re-initializing"
                    );
                    self.clear_session().await;
                }
            }
        }

        Err(SearchError::SessionExpired)
    }
}
