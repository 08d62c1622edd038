//! Route definitions

use super::handlers;
use super::state::AppState;
use super::trace::trace_requests;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.settings.server.body_limit_bytes;

    Router::new()
        // Service routes
        .route("/health", get(handlers::health))
        .route("/providers", get(handlers::providers))
        .route("/stats", get(handlers::stats))
        // Responses API
        .route("/v1/responses", post(handlers::create_response))
        .route(
            "/v1/responses/:id",
            get(handlers::get_response).delete(handlers::delete_response),
        )
        .route(
            "/:provider/v1/responses",
            post(handlers::create_provider_response),
        )
        .route(
            "/:provider/v1/responses/:id",
            get(handlers::get_provider_response),
        )
        .fallback(handlers::not_found)
        // Middleware
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::from_fn(trace_requests))
        .layer(cors)
        .with_state(state)
}
