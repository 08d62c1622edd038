//! Registry of configured search providers

use super::models::SearchResults;
use super::traits::SearchProvider;
use crate::error::SearchError;
use crate::metrics::Metrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Named search providers plus the feature switch and default choice
pub struct SearchRegistry {
    /// Providers by name; name order is the fallback order
    providers: BTreeMap<String, Arc<dyn SearchProvider>>,
    default_provider: String,
    enabled: bool,
    metrics: Option<Arc<Metrics>>,
}

/// Provider listing for the providers endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub available: bool,
    pub default: bool,
}

impl SearchRegistry {
    pub fn new(enabled: bool, default_provider: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider: default_provider.into(),
            enabled,
            metrics: None,
        }
    }

    /// A registry with the feature switched off
    pub fn disabled() -> Self {
        Self::new(false, "")
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            warn!("Replacing search provider {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SearchProvider>> {
        self.providers.get(name)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// True when enabled and at least one provider is configured
    pub fn has_usable_provider(&self) -> bool {
        self.enabled && self.providers.values().any(|p| p.is_available())
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.providers
            .values()
            .map(|p| ProviderInfo {
                name: p.name().to_string(),
                kind: p.kind().to_string(),
                available: p.is_available(),
                default: p.name() == self.default_provider,
            })
            .collect()
    }

    /// The provider a search would go to: the default when usable, else the
    /// first usable one by name
    fn select(&self) -> Option<&Arc<dyn SearchProvider>> {
        if !self.default_provider.is_empty() {
            if let Some(p) = self
                .providers
                .get(&self.default_provider)
                .filter(|p| p.is_available())
            {
                return Some(p);
            }
        }
        self.providers.values().find(|p| p.is_available())
    }

    /// Run a query against the selected provider
    pub async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        if !self.enabled {
            return Err(SearchError::Disabled);
        }

        let provider = self.select().ok_or(SearchError::NoProvider)?;
        if provider.name() != self.default_provider {
            debug!(provider = provider.name(), query, "using fallback search provider");
        }

        self.run(provider.as_ref(), query).await
    }

    async fn run(&self, provider: &dyn SearchProvider, query: &str) -> Result<SearchResults, SearchError> {
        let name = provider.name();
        let limit = provider.timeout();
        let start = Instant::now();

        if let Some(metrics) = &self.metrics {
            metrics.record_search(name);
        }

        let result = match timeout(limit, provider.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout {
                provider: name.to_string(),
                secs: limit.as_secs(),
            }),
        };

        let elapsed = start.elapsed().as_millis() as u64;
        match &result {
            Ok(results) => {
                info!(
                    provider = name,
                    query,
                    result_count = results.results.len(),
                    elapsed_ms = elapsed,
                    "search completed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_success(name);
                    metrics.record_response_time(name, elapsed);
                }
            }
            Err(e) => {
                warn!(provider = name, query, error = %e, elapsed_ms = elapsed, "search failed");
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(name);
                }
            }
        }

        result
    }
}

impl Default for SearchRegistry {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::search::models::SearchResult;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Scripted provider for registry and orchestrator tests
    pub(crate) struct StubProvider {
        pub name: String,
        pub available: bool,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    impl StubProvider {
        pub fn ok(name: &str) -> Self {
            Self {
                name: name.to_string(),
                available: true,
                fail: false,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> &'static str {
            "stub"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SearchError::Provider(format!("{} exploded", self.name)));
            }
            Ok(SearchResults::new(
                query,
                vec![SearchResult {
                    title: format!("result from {}", self.name),
                    url: "https://example.com".to_string(),
                    ..Default::default()
                }],
            ))
        }
    }

    #[tokio::test]
    async fn test_disabled_registry_fails_fast() {
        let mut registry = SearchRegistry::new(false, "a");
        registry.register(Arc::new(StubProvider::ok("a")));

        assert!(!registry.has_usable_provider());
        assert!(matches!(registry.search("q").await, Err(SearchError::Disabled)));
    }

    #[tokio::test]
    async fn test_default_then_fallback() {
        let mut registry = SearchRegistry::new(true, "b");
        registry.register(Arc::new(StubProvider::ok("a")));
        registry.register(Arc::new(StubProvider::ok("b")));

        let results = registry.search("q").await.unwrap();
        assert_eq!(results.results[0].title, "result from b");

        let mut registry = SearchRegistry::new(true, "b");
        registry.register(Arc::new(StubProvider::ok("a")));
        registry.register(Arc::new(StubProvider {
            available: false,
            ..StubProvider::ok("b")
        }));
        let results = registry.search("q").await.unwrap();
        assert_eq!(results.results[0].title, "result from a");
    }

    #[tokio::test]
    async fn test_no_usable_provider() {
        let mut registry = SearchRegistry::new(true, "");
        registry.register(Arc::new(StubProvider {
            available: false,
            ..StubProvider::ok("a")
        }));

        assert!(!registry.has_usable_provider());
        assert!(matches!(registry.search("q").await, Err(SearchError::NoProvider)));
    }

    #[tokio::test]
    async fn test_timeout_and_metrics() {
        let metrics = Arc::new(Metrics::new());
        let mut registry = SearchRegistry::new(true, "slow").with_metrics(metrics.clone());
        registry.register(Arc::new(StubProvider {
            delay: Some(Duration::from_secs(5)),
            ..StubProvider::ok("slow")
        }));

        let err = registry.search("q").await.unwrap_err();
        assert!(matches!(err, SearchError::Timeout { .. }));

        let stats = metrics.provider_stats();
        assert_eq!(stats["slow"].searches, 1);
        assert_eq!(stats["slow"].errors, 1);
    }

    #[test]
    fn test_list_marks_default() {
        let mut registry = SearchRegistry::new(true, "b");
        registry.register(Arc::new(StubProvider::ok("a")));
        registry.register(Arc::new(StubProvider::ok("b")));

        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert!(!list[0].default);
        assert!(list[1].default);
    }
}
