//! Responses-Relay: serves the Responses API on top of Chat Completions
//! providers
//!
//! Requests are translated to Chat Completions, forwarded to the selected
//! upstream and translated back, including incremental streams. When the
//! client declares the web search capability, the relay runs the model's
//! search calls itself against a configured search provider.

pub mod config;
pub mod error;
pub mod metrics;
pub mod network;
pub mod orchestrator;
pub mod protocol;
pub mod search;
pub mod storage;
pub mod translate;
pub mod web;

pub use config::Settings;
pub use error::{ProxyError, SearchError, StoreError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
