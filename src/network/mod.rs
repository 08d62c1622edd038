//! Outbound HTTP
//!
//! One pooled [`HttpClient`] is shared by the upstream chat transport and
//! every search provider.

mod client;
mod upstream;

pub use client::{bearer, HttpClient};
pub use upstream::{BoundTransport, UpstreamClient, UpstreamTarget, MAX_BODY_BYTES, TRACE_HEADER};
