//! Error types

use thiserror::Error;

/// Failures while talking to the upstream chat provider
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Network failure or timeout
    #[error("failed to reach upstream: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with an error status
    #[error("upstream error: status {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The body could not be decoded
    #[error("failed to parse upstream response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("upstream response body too large, limit is {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The stream broke before the completion sentinel
    #[error("error reading upstream stream: {0}")]
    StreamRead(String),

    #[error("upstream stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

impl ProxyError {
    /// Whether the failure is gateway-class (network or timeout)
    pub fn is_transport(&self) -> bool {
        matches!(self, ProxyError::Transport(_) | ProxyError::StreamRead(_))
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

/// Failures of a web search attempt; these end up as tool-result text
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("web search is disabled")]
    Disabled,

    #[error("no available search provider")]
    NoProvider,

    /// The provider has no credential
    #[error("{0} provider not configured: missing API key")]
    NotConfigured(String),

    #[error("failed to reach search provider: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("search provider {provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("search provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode search response: {0}")]
    Decode(String),

    /// The provider reported a failure of its own
    #[error("{0}")]
    Provider(String),

    /// Authorization kept failing after a fresh session
    #[error("failed after retry: session error")]
    SessionExpired,
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Decode(err.to_string())
    }
}

/// Conversation history store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation id must not be empty")]
    EmptyKey,
}
