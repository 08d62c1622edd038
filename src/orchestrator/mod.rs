//! Search tool-call orchestration
//!
//! When the client declares the search capability, the relay answers the
//! model's `web_search` calls itself: it runs the query, appends the result
//! as a tool message and asks the model again. The loop is bounded; once
//! the bound is hit, one final call is made and returned as-is.

mod replay;

pub use replay::replay_events;

use crate::error::ProxyError;
use crate::protocol::{ChatMessage, ChatRequest, ChatResponse, ToolCall};
use crate::search::{SearchOutcome, SearchRegistry};
use crate::translate::SEARCH_TOOL_NAME;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Search round trips before the forced final call
pub const DEFAULT_MAX_ROUNDS: usize = 5;

/// Query used when the model's arguments cannot be parsed
pub const UNKNOWN_QUERY: &str = "unknown";

/// Non-streaming access to the upstream chat endpoint
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProxyError>;
}

/// Final aggregate of an orchestrated turn
#[derive(Debug, Clone)]
pub struct OrchestratedTurn {
    /// The last upstream response
    pub response: ChatResponse,
    /// One entry per executed search, in execution order
    pub outcomes: Vec<SearchOutcome>,
    /// Transcript sent with the last upstream call
    pub messages: Vec<ChatMessage>,
    pub upstream_calls: usize,
}

#[derive(Deserialize)]
struct SearchArguments {
    query: String,
}

/// Mutable state of one run
struct LoopState {
    iteration: usize,
    upstream_calls: usize,
    messages: Vec<ChatMessage>,
    outcomes: Vec<SearchOutcome>,
}

impl LoopState {
    fn request(&self, template: &ChatRequest) -> ChatRequest {
        ChatRequest {
            messages: self.messages.clone(),
            ..template.clone()
        }
    }

    fn finish(self, response: ChatResponse) -> OrchestratedTurn {
        OrchestratedTurn {
            response,
            outcomes: self.outcomes,
            messages: self.messages,
            upstream_calls: self.upstream_calls,
        }
    }
}

pub struct ToolOrchestrator<'a> {
    registry: &'a SearchRegistry,
    max_rounds: usize,
}

impl<'a> ToolOrchestrator<'a> {
    pub fn new(registry: &'a SearchRegistry) -> Self {
        Self {
            registry,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Drive the turn to completion. Upstream calls are always
    /// non-streaming; only transport failures abort.
    pub async fn run<T>(&self, transport: &T, request: ChatRequest) -> Result<OrchestratedTurn, ProxyError>
    where
        T: ChatTransport + ?Sized,
    {
        let mut template = request;
        template.stream = false;

        let mut state = LoopState {
            iteration: 0,
            upstream_calls: 0,
            messages: std::mem::take(&mut template.messages),
            outcomes: Vec::new(),
        };

        while state.iteration < self.max_rounds {
            state.iteration += 1;
            debug!(
                iteration = state.iteration,
                message_count = state.messages.len(),
                "search round"
            );

            state.upstream_calls += 1;
            let response = transport.complete(&state.request(&template)).await?;

            let (assistant, search_calls) = match response.first_message() {
                Some(message) => {
                    let calls: Vec<ToolCall> = message
                        .tool_calls
                        .iter()
                        .filter(|c| c.function.name == SEARCH_TOOL_NAME)
                        .cloned()
                        .collect();
                    let assistant = ChatMessage::assistant_tool_calls(
                        message.content.clone(),
                        message.tool_calls.clone(),
                    );
                    (assistant, calls)
                }
                None => return Ok(state.finish(response)),
            };

            if search_calls.is_empty() {
                return Ok(state.finish(response));
            }

            info!(count = search_calls.len(), "detected web_search calls");
            state.messages.push(assistant);

            for call in &search_calls {
                let outcome = self.execute(call).await;
                state
                    .messages
                    .push(ChatMessage::tool_result(call.id.clone(), outcome.tool_content()));
                state.outcomes.push(outcome);
            }
        }

        info!(rounds = self.max_rounds, "search round bound reached, making final call");
        state.upstream_calls += 1;
        let response = transport.complete(&state.request(&template)).await?;
        Ok(state.finish(response))
    }

    async fn execute(&self, call: &ToolCall) -> SearchOutcome {
        let query = match serde_json::from_str::<SearchArguments>(&call.function.arguments) {
            Ok(args) => args.query,
            Err(e) => {
                warn!(
                    error = %e,
                    arguments = %call.function.arguments,
                    "failed to parse web_search arguments"
                );
                UNKNOWN_QUERY.to_string()
            }
        };

        info!(query = %query, call_id = %call.id, "executing web_search");
        match self.registry.search(&query).await {
            Ok(results) => SearchOutcome::completed(call.id.clone(), results),
            Err(e) => SearchOutcome::failed(call.id.clone(), query, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatChoice, ItemStatus, MessageContent, Role};
    use crate::search::registry::tests::StubProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replies with scripted messages; the last one repeats forever
    struct ScriptedTransport {
        script: Vec<ChatMessage>,
        calls: AtomicUsize,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<ChatMessage>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProxyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let message = self.script[n.min(self.script.len() - 1)].clone();
            Ok(ChatResponse {
                model: "m".to_string(),
                choices: vec![ChatChoice {
                    index: 0,
                    message,
                    finish_reason: None,
                }],
                ..Default::default()
            })
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl ChatTransport for FailingTransport {
        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, ProxyError> {
            Err(ProxyError::Upstream {
                status: 503,
                message: "overloaded".to_string(),
            })
        }
    }

    fn search_call(id: &str, arguments: &str) -> ChatMessage {
        ChatMessage::assistant_tool_calls(
            None,
            vec![ToolCall::function(id, SEARCH_TOOL_NAME, arguments)],
        )
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::text(Role::User, "latest rust release?")],
            tools: vec![crate::translate::search_tool_definition()],
            stream: true,
            temperature: None,
            max_tokens: None,
        }
    }

    fn registry() -> SearchRegistry {
        let mut registry = SearchRegistry::new(true, "stub");
        registry.register(Arc::new(StubProvider::ok("stub")));
        registry
    }

    #[tokio::test]
    async fn test_bound_forces_final_call() {
        let transport = ScriptedTransport::new(vec![search_call("c", r#"{"query":"rust"}"#)]);
        let registry = registry();
        let turn = ToolOrchestrator::new(&registry)
            .with_max_rounds(5)
            .run(&transport, request())
            .await
            .unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 6);
        assert_eq!(turn.upstream_calls, 6);
        assert_eq!(turn.outcomes.len(), 5);
        assert!(!turn.response.choices.is_empty());
    }

    #[tokio::test]
    async fn test_search_then_answer() {
        let transport = ScriptedTransport::new(vec![
            search_call("call_1", r#"{"query":"rust 1.80"}"#),
            ChatMessage::text(Role::Assistant, "Rust 1.80 shipped LazyLock."),
        ]);
        let registry = registry();
        let turn = ToolOrchestrator::new(&registry)
            .run(&transport, request())
            .await
            .unwrap();

        assert_eq!(turn.upstream_calls, 2);
        assert_eq!(turn.outcomes.len(), 1);
        assert_eq!(turn.outcomes[0].query, "rust 1.80");
        assert_eq!(turn.outcomes[0].status, ItemStatus::Completed);

        let roles: Vec<Role> = turn.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(turn.messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert!(turn.messages[2]
            .text_content()
            .starts_with("Search results for: rust 1.80"));

        let requests = transport.requests.lock().unwrap();
        assert!(requests.iter().all(|r| !r.stream));
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[1].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_arguments_use_sentinel() {
        let transport = ScriptedTransport::new(vec![
            search_call("call_1", "not json"),
            ChatMessage::text(Role::Assistant, "done"),
        ]);
        let registry = registry();
        let turn = ToolOrchestrator::new(&registry)
            .run(&transport, request())
            .await
            .unwrap();

        assert_eq!(turn.outcomes[0].query, UNKNOWN_QUERY);
        assert_eq!(turn.outcomes[0].status, ItemStatus::Completed);
    }

    #[tokio::test]
    async fn test_search_failure_becomes_tool_content() {
        let transport = ScriptedTransport::new(vec![
            search_call("call_1", r#"{"query":"x"}"#),
            ChatMessage::text(Role::Assistant, "sorry"),
        ]);
        let mut registry = SearchRegistry::new(true, "stub");
        registry.register(Arc::new(StubProvider {
            fail: true,
            ..StubProvider::ok("stub")
        }));
        let turn = ToolOrchestrator::new(&registry)
            .run(&transport, request())
            .await
            .unwrap();

        assert_eq!(turn.outcomes[0].status, ItemStatus::Failed);
        assert_eq!(
            turn.messages[2].content,
            Some(MessageContent::Text("Search failed: stub exploded".to_string()))
        );
    }

    #[tokio::test]
    async fn test_other_tool_calls_returned_untouched() {
        let transport = ScriptedTransport::new(vec![ChatMessage::assistant_tool_calls(
            None,
            vec![ToolCall::function("call_x", "shell", r#"{"cmd":"ls"}"#)],
        )]);
        let registry = registry();
        let turn = ToolOrchestrator::new(&registry)
            .run(&transport, request())
            .await
            .unwrap();

        assert_eq!(turn.upstream_calls, 1);
        assert!(turn.outcomes.is_empty());
        assert_eq!(
            turn.response.first_message().unwrap().tool_calls[0].function.name,
            "shell"
        );
    }

    #[tokio::test]
    async fn test_transport_error_aborts() {
        let registry = registry();
        let err = ToolOrchestrator::new(&registry)
            .run(&FailingTransport, request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Upstream { status: 503, .. }));
    }
}
