//! Settings structures for the relay configuration

use crate::protocol::Role;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Root of the YAML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    /// Default upstream target
    pub upstream: UpstreamSettings,
    /// Named upstream targets selectable per request
    pub providers: HashMap<String, UpstreamSettings>,
    /// Client model name → upstream model name
    pub model_mapping: HashMap<String, String>,
    pub translation: TranslationSettings,
    pub web_search: WebSearchSettings,
    pub history: HistorySettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Merge with environment variables (RELAY_* prefix)
    pub fn merge_env(&mut self) {
        self.merge_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn merge_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("RELAY_HOST") {
            self.server.host = val;
        }
        if let Some(val) = var("RELAY_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("RELAY_UPSTREAM_BASE_URL") {
            self.upstream.base_url = val;
        }
        if let Some(val) = var("RELAY_UPSTREAM_API_KEY") {
            self.upstream.default_api_key = val;
        }
        if let Some(val) = var("RELAY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = var("RELAY_LOG_FORMAT") {
            self.logging.format = val;
        }
    }

    /// Check values that serde alone cannot
    pub fn validate(&self) -> Result<()> {
        if !self.upstream.base_url.is_empty() {
            url::Url::parse(&self.upstream.base_url)
                .with_context(|| format!("invalid upstream base_url {}", self.upstream.base_url))?;
        }
        for (name, target) in &self.providers {
            url::Url::parse(&target.base_url)
                .with_context(|| format!("invalid base_url for provider {}", name))?;
        }
        for (name, provider) in &self.web_search.providers {
            if let Some(base) = provider.base_url.as_deref().filter(|b| !b.is_empty()) {
                url::Url::parse(base)
                    .with_context(|| format!("invalid base_url for search provider {}", name))?;
            }
        }
        if self.translation.max_search_rounds == 0 {
            bail!("translation.max_search_rounds must be at least 1");
        }
        if self.translation.fallback_role().is_none() {
            bail!(
                "unknown translation.developer_fallback_role {}",
                self.translation.developer_fallback_role
            );
        }
        Ok(())
    }

    /// Resolve an upstream target by provider name, falling back to the default
    pub fn target(&self, provider: Option<&str>) -> (&str, &UpstreamSettings) {
        match provider.and_then(|name| self.providers.get_key_value(name)) {
            Some((name, target)) => (name.as_str(), target),
            None => ("default", &self.upstream),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,
    pub port: u16,
    /// Maximum inbound request body size
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            body_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

/// One upstream Chat Completions target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub base_url: String,
    /// Appended to `base_url` to form the completions URL
    pub path_suffix: String,
    /// Used when the client sends no Authorization header
    pub default_api_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Whether the target accepts the `developer` role
    pub supports_developer_role: bool,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            path_suffix: "/v1/chat/completions".to_string(),
            default_api_key: String::new(),
            timeout_secs: 300,
            supports_developer_role: false,
        }
    }
}

impl UpstreamSettings {
    pub fn completions_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path_suffix)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    /// Role that replaces `developer` for targets without support for it
    pub developer_fallback_role: String,
    /// Search round trips before a forced final call
    pub max_search_rounds: usize,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            developer_fallback_role: "system".to_string(),
            max_search_rounds: 5,
        }
    }
}

impl TranslationSettings {
    pub fn fallback_role(&self) -> Option<Role> {
        match Role::parse(&self.developer_fallback_role) {
            Some(Role::System) => Some(Role::System),
            Some(Role::User) => Some(Role::User),
            _ => None,
        }
    }
}

/// Web search feature settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchSettings {
    pub enabled: bool,
    /// Preferred provider name
    pub default: String,
    pub providers: HashMap<String, SearchProviderConfig>,
}

/// Configuration of one search provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchProviderConfig {
    /// `rest` / `firecrawl` or `session_rpc` / `mcp`
    #[serde(rename = "type")]
    pub kind: String,
    pub api_key: String,
    /// Endpoint or API base; each provider type has its own default
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_results: Option<usize>,
    /// Remote tool name (session-RPC only)
    pub tool_name: Option<String>,
    /// Argument name carrying the query (session-RPC only)
    pub query_param: Option<String>,
}

/// Conversation history retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
