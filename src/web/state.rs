//! Application state shared across handlers

use crate::config::Settings;
use crate::metrics::Metrics;
use crate::network::{HttpClient, UpstreamClient};
use crate::search::{SearchLoader, SearchRegistry};
use crate::storage::{ConversationStore, MemoryStore};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Configured web search providers
    pub registry: Arc<SearchRegistry>,
    /// Conversation histories by response id
    pub store: Arc<dyn ConversationStore>,
    pub metrics: Arc<Metrics>,
    pub upstream: UpstreamClient,
}

impl AppState {
    /// Build the state from settings: one HTTP client, the search registry
    /// and an in-memory history store
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let client = HttpClient::new()?;
        let metrics = Arc::new(Metrics::new());
        let registry = SearchLoader::load(&settings.web_search, &client, metrics.clone());
        let store = MemoryStore::from_settings(&settings.history);

        Ok(Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            store: Arc::new(store),
            metrics,
            upstream: UpstreamClient::new(client),
        })
    }

    /// Replace the search registry
    pub fn with_registry(mut self, registry: SearchRegistry) -> Self {
        self.registry = Arc::new(registry.with_metrics(self.metrics.clone()));
        self
    }
}
