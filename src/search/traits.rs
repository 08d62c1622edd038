//! Search provider trait

use super::models::SearchResults;
use crate::error::SearchError;
use async_trait::async_trait;
use std::time::Duration;

/// Default per-provider timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A backend able to answer a web search query
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    /// Provider type as named in configuration
    fn kind(&self) -> &'static str;

    /// Whether the provider has what it needs to be called
    fn is_available(&self) -> bool;

    /// Upper bound for one search, including any handshake
    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    /// Run a query
    async fn search(&self, query: &str) -> Result<SearchResults, SearchError>;
}
