//! Builds the search registry from configuration

use super::registry::SearchRegistry;
use super::rest::RestSearchClient;
use super::session_rpc::SessionRpcClient;
use super::traits::SearchProvider;
use crate::config::{SearchProviderConfig, WebSearchSettings};
use crate::metrics::Metrics;
use crate::network::HttpClient;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Loader for search providers
pub struct SearchLoader;

impl SearchLoader {
    /// Load every configured provider; unknown types are skipped
    pub fn load(
        settings: &WebSearchSettings,
        client: &HttpClient,
        metrics: Arc<Metrics>,
    ) -> SearchRegistry {
        let mut registry =
            SearchRegistry::new(settings.enabled, settings.default.clone()).with_metrics(metrics);

        if !settings.enabled {
            info!("Web search is disabled");
            return registry;
        }

        for (name, config) in &settings.providers {
            match Self::create_provider(name, config, client) {
                Ok(provider) => {
                    if !provider.is_available() {
                        warn!("Search provider {} has no API key and will not be used", name);
                    }
                    info!("Loaded search provider: {} ({})", name, provider.kind());
                    registry.register(provider);
                }
                Err(e) => {
                    warn!("Skipping search provider {}: {}", name, e);
                }
            }
        }

        info!(
            default = %settings.default,
            usable = registry.has_usable_provider(),
            "Loaded {} search providers",
            registry.len()
        );
        registry
    }

    fn create_provider(
        name: &str,
        config: &SearchProviderConfig,
        client: &HttpClient,
    ) -> Result<Arc<dyn SearchProvider>> {
        let provider: Arc<dyn SearchProvider> = match config.kind.as_str() {
            "rest" | "firecrawl" => Arc::new(RestSearchClient::new(name, config, client.clone())),
            "session_rpc" | "mcp" => Arc::new(SessionRpcClient::new(name, config, client.clone())),
            other => return Err(anyhow!("unknown provider type: {:?}", other)),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn provider(kind: &str, api_key: &str) -> SearchProviderConfig {
        SearchProviderConfig {
            kind: kind.to_string(),
            api_key: api_key.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_by_type() {
        let mut providers = HashMap::new();
        providers.insert("firecrawl".to_string(), provider("firecrawl", "fc"));
        providers.insert("zhipu".to_string(), provider("mcp", "zp"));
        providers.insert("bogus".to_string(), provider("carrier_pigeon", "x"));
        providers.insert("keyless".to_string(), provider("rest", ""));
        let settings = WebSearchSettings {
            enabled: true,
            default: "zhipu".to_string(),
            providers,
        };

        let registry = SearchLoader::load(
            &settings,
            &HttpClient::new().unwrap(),
            Arc::new(Metrics::new()),
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("zhipu").unwrap().kind(), "session_rpc");
        assert_eq!(registry.get("firecrawl").unwrap().kind(), "rest");
        assert!(!registry.get("keyless").unwrap().is_available());
        assert!(registry.get("bogus").is_none());
        assert!(registry.has_usable_provider());
    }

    #[test]
    fn test_disabled_loads_nothing() {
        let mut providers = HashMap::new();
        providers.insert("firecrawl".to_string(), provider("rest", "fc"));
        let settings = WebSearchSettings {
            enabled: false,
            default: String::new(),
            providers,
        };

        let registry = SearchLoader::load(
            &settings,
            &HttpClient::new().unwrap(),
            Arc::new(Metrics::new()),
        );
        assert!(registry.is_empty());
        assert!(!registry.has_usable_provider());
    }
}
