//! Web search providers
//!
//! A [`SearchRegistry`] owns the configured [`SearchProvider`]s and picks
//! one per query. Two provider types exist: a plain REST endpoint and a
//! session-based JSON-RPC tool server.

pub mod loader;
pub mod models;
pub mod registry;
pub mod rest;
pub mod session_rpc;
pub mod traits;

pub use loader::SearchLoader;
pub use models::{SearchOutcome, SearchResult, SearchResults};
pub use registry::{ProviderInfo, SearchRegistry};
pub use rest::RestSearchClient;
pub use session_rpc::SessionRpcClient;
pub use traits::SearchProvider;
