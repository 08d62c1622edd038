//! Per-request trace ids

use crate::network::TRACE_HEADER;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Inbound headers checked for a caller-supplied trace id, in order
pub const TRACE_ID_HEADERS: &[&str] = &[
    "x-trace-id",
    "x-request-id",
    "x-correlation-id",
    "trace-id",
    "request-id",
    "openai-request-id",
];

const GENERATED_LEN: usize = 16;

/// Trace id of the current request, stored in request extensions
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

/// First non-empty trace header
pub fn extract_trace_id(headers: &HeaderMap) -> Option<String> {
    TRACE_ID_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

pub fn generate_trace_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(GENERATED_LEN);
    id
}

/// Attach a trace id, run the request inside its span and echo the id back
pub async fn trace_requests(mut request: Request, next: Next) -> Response {
    let trace_id = extract_trace_id(request.headers()).unwrap_or_else(generate_trace_id);
    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        info!("request received");
        let start = Instant::now();
        let mut response = next.run(request).await;
        info!(
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert(TRACE_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("request-id", HeaderValue::from_static("low"));
        headers.insert("x-correlation-id", HeaderValue::from_static("high"));
        assert_eq!(extract_trace_id(&headers).as_deref(), Some("high"));
    }

    #[test]
    fn test_blank_header_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", HeaderValue::from_static(" "));
        headers.insert("openai-request-id", HeaderValue::from_static("req_1"));
        assert_eq!(extract_trace_id(&headers).as_deref(), Some("req_1"));
        assert!(extract_trace_id(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_generated_length() {
        let id = generate_trace_id();
        assert_eq!(id.len(), 16);
        assert_ne!(id, generate_trace_id());
    }
}
