//! Metrics collection module
//!
//! Tracks turn counts and search provider performance.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of response times kept per provider
const RESPONSE_TIME_WINDOW: usize = 100;

/// Process-wide metrics collector
pub struct Metrics {
    /// Total turns handled
    total_turns: AtomicU64,
    /// Turns that went through the search loop
    orchestrated_turns: AtomicU64,
    /// Searches per provider
    provider_searches: RwLock<HashMap<String, u64>>,
    /// Provider response times in ms, most recent last
    provider_response_times: RwLock<HashMap<String, Vec<u64>>>,
    provider_errors: RwLock<HashMap<String, u64>>,
    provider_successes: RwLock<HashMap<String, u64>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_turns: AtomicU64::new(0),
            orchestrated_turns: AtomicU64::new(0),
            provider_searches: RwLock::new(HashMap::new()),
            provider_response_times: RwLock::new(HashMap::new()),
            provider_errors: RwLock::new(HashMap::new()),
            provider_successes: RwLock::new(HashMap::new()),
        }
    }

    pub fn inc_turn(&self) {
        self.total_turns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orchestrated_turn(&self) {
        self.orchestrated_turns.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a search attempt against a provider
    pub fn record_search(&self, provider: &str) {
        *write(&self.provider_searches)
            .entry(provider.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_response_time(&self, provider: &str, time_ms: u64) {
        let mut times = write(&self.provider_response_times);
        let entry = times.entry(provider.to_string()).or_default();

        if entry.len() >= RESPONSE_TIME_WINDOW {
            entry.remove(0);
        }
        entry.push(time_ms);
    }

    pub fn record_error(&self, provider: &str) {
        *write(&self.provider_errors)
            .entry(provider.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_success(&self, provider: &str) {
        *write(&self.provider_successes)
            .entry(provider.to_string())
            .or_insert(0) += 1;
    }

    pub fn total_turns(&self) -> u64 {
        self.total_turns.load(Ordering::Relaxed)
    }

    pub fn orchestrated_turns(&self) -> u64 {
        self.orchestrated_turns.load(Ordering::Relaxed)
    }

    /// Average response time for a provider
    pub fn avg_response_time(&self, provider: &str) -> Option<u64> {
        read(&self.provider_response_times)
            .get(provider)
            .filter(|t| !t.is_empty())
            .map(|t| t.iter().sum::<u64>() / t.len() as u64)
    }

    /// Success percentage for a provider
    pub fn reliability(&self, provider: &str) -> f64 {
        let error_count = read(&self.provider_errors).get(provider).copied().unwrap_or(0);
        let success_count = read(&self.provider_successes)
            .get(provider)
            .copied()
            .unwrap_or(0);

        let total = error_count + success_count;
        if total == 0 {
            100.0
        } else {
            (success_count as f64 / total as f64) * 100.0
        }
    }

    pub fn provider_stats(&self) -> BTreeMap<String, ProviderStats> {
        let searches = read(&self.provider_searches).clone();
        let errors = read(&self.provider_errors).clone();
        let successes = read(&self.provider_successes).clone();

        searches
            .into_iter()
            .map(|(name, count)| {
                let stats = ProviderStats {
                    searches: count,
                    successes: successes.get(&name).copied().unwrap_or(0),
                    errors: errors.get(&name).copied().unwrap_or(0),
                    avg_response_time_ms: self.avg_response_time(&name),
                    reliability: self.reliability(&name),
                };
                (name, stats)
            })
            .collect()
    }

    /// Snapshot served by the stats endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_turns: self.total_turns(),
            orchestrated_turns: self.orchestrated_turns(),
            search_providers: self.provider_stats(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a single search provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub searches: u64,
    pub successes: u64,
    pub errors: u64,
    pub avg_response_time_ms: Option<u64>,
    pub reliability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_turns: u64,
    pub orchestrated_turns: u64,
    pub search_providers: BTreeMap<String, ProviderStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = Metrics::new();

        metrics.inc_turn();
        metrics.record_search("firecrawl");
        metrics.record_response_time("firecrawl", 100);
        metrics.record_success("firecrawl");

        assert_eq!(metrics.total_turns(), 1);
        assert_eq!(metrics.avg_response_time("firecrawl"), Some(100));
        assert_eq!(metrics.reliability("firecrawl"), 100.0);
    }

    #[test]
    fn test_reliability_and_window() {
        let metrics = Metrics::new();
        metrics.record_search("rpc");
        metrics.record_success("rpc");
        metrics.record_error("rpc");
        assert_eq!(metrics.reliability("rpc"), 50.0);

        for i in 0..150 {
            metrics.record_response_time("rpc", i);
        }
        // Only the last 100 samples (50..150) count
        assert_eq!(metrics.avg_response_time("rpc"), Some(99));

        let snapshot = metrics.snapshot();
        let stats = &snapshot.search_providers["rpc"];
        assert_eq!(stats.searches, 1);
        assert_eq!(stats.errors, 1);
    }
}
