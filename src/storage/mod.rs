//! Conversation history storage
//!
//! Histories are keyed by response id and expire after a fixed TTL.

use crate::config::HistorySettings;
use crate::error::StoreError;
use crate::protocol::ChatMessage;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Persistence for per-turn message histories
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Replace the history stored under `id`
    async fn store(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), StoreError>;

    /// Fetch a history; empty histories count as absent
    async fn get(&self, id: &str) -> Option<Vec<ChatMessage>>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// In-memory store backed by a moka cache
pub struct MemoryStore {
    cache: Cache<String, Arc<Vec<ChatMessage>>>,
}

impl MemoryStore {
    pub fn new(ttl_seconds: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_seconds))
            .max_capacity(max_capacity)
            .build();

        Self { cache }
    }

    pub fn from_settings(settings: &HistorySettings) -> Self {
        Self::new(settings.ttl_secs, settings.max_entries)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        let settings = HistorySettings::default();
        Self::from_settings(&settings)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn store(&self, id: &str, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.cache.insert(id.to_string(), Arc::new(messages)).await;
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<Vec<ChatMessage>> {
        let messages = self.cache.get(id).await?;
        if messages.is_empty() {
            return None;
        }
        Some(messages.as_ref().clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.cache.invalidate(id).await;
        Ok(())
    }
}
