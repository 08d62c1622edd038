//! HTTP request handlers

use super::error::ApiError;
use super::state::AppState;
use super::trace::TraceId;
use crate::config::UpstreamSettings;
use crate::network::{bearer, UpstreamTarget};
use crate::orchestrator::{replay_events, ToolOrchestrator};
use crate::protocol::{
    ChatMessage, ChatResponse, Input, ResponseEvent, ResponsesRequest, ResponsesResponse,
};
use crate::storage::ConversationStore;
use crate::translate::{response_id, sse_body, RequestTranslator, ResponseTranslator, StreamTranslator};
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Header naming the upstream provider; wins over the path segment
pub const PROVIDER_HEADER: &str = "x-target-provider";

const REQUEST_ID_LEN: usize = 24;

/// Health check handler
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

/// Upstream targets and search providers
pub async fn providers(State(state): State<AppState>) -> impl IntoResponse {
    let mut names: Vec<&String> = state.settings.providers.keys().collect();
    names.sort();

    Json(serde_json::json!({
        "providers": names,
        "default": state.settings.upstream.base_url,
        "web_search": {
            "enabled": state.registry.is_enabled(),
            "default": state.settings.web_search.default,
            "providers": state.registry.list(),
        },
    }))
}

/// Search metrics and turn counters
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Endpoint not found".to_string())
}

/// `POST /v1/responses`
pub async fn create_response(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    respond(state, trace, headers, None, body).await
}

/// `POST /:provider/v1/responses`
pub async fn create_provider_response(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    respond(state, trace, headers, Some(provider), body).await
}

/// `GET /v1/responses/:id`
pub async fn get_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ResponsesResponse>, ApiError> {
    render_history(&state, id).await
}

/// `GET /:provider/v1/responses/:id`
pub async fn get_provider_response(
    State(state): State<AppState>,
    Path((_provider, id)): Path<(String, String)>,
) -> Result<Json<ResponsesResponse>, ApiError> {
    render_history(&state, id).await
}

/// `DELETE /v1/responses/:id`
pub async fn delete_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state
        .store
        .delete(&id)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    info!(response_id = %id, "deleted conversation history");

    Ok(Json(DeletedResponse {
        id,
        object: "response.deleted",
        deleted: true,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: String,
    pub object: &'static str,
    pub deleted: bool,
}

async fn render_history(state: &AppState, id: String) -> Result<Json<ResponsesResponse>, ApiError> {
    info!(response_id = %id, "retrieving conversation history");
    let messages = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("Response not found".to_string()))?;

    let mut response = ResponsesResponse::new(id, String::new(), chrono::Utc::now().timestamp());
    response.output = ResponseTranslator::from_history(&messages);
    info!(
        response_id = %response.id,
        message_count = messages.len(),
        "conversation history retrieved"
    );
    Ok(Json(response))
}

/// Provider header, else the path segment
fn provider_name(headers: &HeaderMap, path: Option<String>) -> Option<String> {
    headers
        .get(PROVIDER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or(path)
}

/// Inbound `Authorization`, else the target's default key
fn authorization(headers: &HeaderMap, target: &UpstreamSettings) -> Option<String> {
    let inbound = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty());
    match inbound {
        Some(value) => Some(value.to_string()),
        None if !target.default_api_key.is_empty() => Some(bearer(&target.default_api_key)),
        None => None,
    }
}

fn new_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(REQUEST_ID_LEN);
    id
}

fn input_count(input: &Input) -> usize {
    match input {
        Input::Text(_) => 1,
        Input::Items(items) => items.len(),
    }
}

/// The request messages plus the assistant reply, as stored for follow-ups
fn transcript(mut messages: Vec<ChatMessage>, response: &ChatResponse) -> Vec<ChatMessage> {
    if let Some(message) = response.first_message() {
        messages.push(message.clone());
    }
    messages
}

async fn persist(store: &dyn ConversationStore, id: &str, messages: Vec<ChatMessage>) {
    let count = messages.len();
    match store.store(id, messages).await {
        Ok(()) => info!(response_id = id, message_count = count, "stored conversation history"),
        Err(e) => error!(response_id = id, error = %e, "failed to store conversation history"),
    }
}

fn event_stream<S>(stream: S) -> Response
where
    S: futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

fn replay_stream(events: Vec<ResponseEvent>) -> Response {
    let frames = events
        .into_iter()
        .map(|event| Ok::<_, std::io::Error>(Bytes::from(event.to_sse())));
    event_stream(futures::stream::iter(frames))
}

/// One turn: translate, run against the upstream (through the search loop
/// when the client declared search), translate back and persist history.
async fn respond(
    state: AppState,
    trace: TraceId,
    headers: HeaderMap,
    path_provider: Option<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let provider = provider_name(&headers, path_provider);
    let (target_name, target) = state.settings.target(provider.as_deref());
    if provider.as_deref().map_or(false, |p| p != target_name) {
        warn!(provider = ?provider, "unknown provider, using default target");
    }

    debug!(body = %String::from_utf8_lossy(&body), "raw request body");
    let req: ResponsesRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Failed to parse request: {}", e)))?;

    info!(
        provider = target_name,
        model = %req.model,
        stream = req.stream,
        input_count = input_count(&req.input),
        previous_response_id = req.previous_response_id.as_deref().unwrap_or(""),
        "parsed request"
    );

    let history = match req.previous_response_id.as_deref().filter(|id| !id.is_empty()) {
        Some(previous) => match state.store.get(previous).await {
            Some(history) => {
                info!(
                    previous_response_id = previous,
                    history_count = history.len(),
                    "loaded conversation history"
                );
                history
            }
            None => {
                warn!(
                    previous_response_id = previous,
                    "previous_response_id not found, starting fresh conversation"
                );
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let orchestrate = req.declares_search() && state.registry.has_usable_provider();
    let mut translator =
        RequestTranslator::new(state.settings.model_mapping.clone()).inject_search_tool(orchestrate);
    if let Some(fallback) = state.settings.translation.fallback_role() {
        translator = translator.developer_role(target.supports_developer_role, fallback);
    }
    let chat_req = translator.translate(&req, &history);
    debug!(
        model = %chat_req.model,
        message_count = chat_req.messages.len(),
        tool_count = chat_req.tools.len(),
        "converted request"
    );

    let authorization = authorization(&headers, target).ok_or(ApiError::Unauthorized)?;
    let upstream_target = UpstreamTarget {
        url: target.completions_url(),
        authorization,
        timeout: Duration::from_secs(target.timeout_secs),
        trace_id: Some(trace.0),
    };

    let resp_id = response_id(&new_request_id());
    state.metrics.inc_turn();

    if orchestrate {
        state.metrics.inc_orchestrated_turn();
        let transport = state.upstream.bind(&upstream_target);
        let turn = ToolOrchestrator::new(&state.registry)
            .with_max_rounds(state.settings.translation.max_search_rounds)
            .run(&transport, chat_req)
            .await?;
        info!(
            response_id = %resp_id,
            searches = turn.outcomes.len(),
            upstream_calls = turn.upstream_calls,
            "search turn finished"
        );

        persist(
            state.store.as_ref(),
            &resp_id,
            transcript(turn.messages.clone(), &turn.response),
        )
        .await;

        if req.stream {
            return Ok(replay_stream(replay_events(&turn, &resp_id)));
        }
        let out = ResponseTranslator::translate_with_search(&turn.response, &resp_id, &turn.outcomes);
        return Ok(Json(out).into_response());
    }

    if req.stream {
        let upstream = state.upstream.open_stream(&upstream_target, &chat_req).await?;
        let translator = StreamTranslator::new(resp_id.clone(), chat_req.model.clone());
        let store: Arc<dyn ConversationStore> = state.store.clone();
        let mut messages = chat_req.messages;

        let body = sse_body(translator, upstream, move |result| async move {
            match result {
                Ok(result) => {
                    messages.push(result.assistant_message());
                    persist(store.as_ref(), &resp_id, messages).await;
                }
                Err(e) => warn!(response_id = %resp_id, error = %e, "stream ended with error, history not stored"),
            }
        });
        return Ok(event_stream(body));
    }

    let chat_resp = state.upstream.complete(&upstream_target, &chat_req).await?;
    let out = ResponseTranslator::translate(&chat_resp, &resp_id);
    info!(
        response_id = %out.id,
        output_count = out.output.len(),
        input_tokens = out.usage.as_ref().map_or(0, |u| u.input_tokens),
        output_tokens = out.usage.as_ref().map_or(0, |u| u.output_tokens),
        "response converted"
    );

    persist(
        state.store.as_ref(),
        &resp_id,
        transcript(chat_req.messages, &chat_resp),
    )
    .await;

    Ok(Json(out).into_response())
}
