//! Chat Completions response → Responses response

use crate::protocol::{
    ChatMessage, ChatResponse, ItemStatus, OutputItem, ResponsesResponse, Role, Usage,
};
use crate::search::SearchOutcome;

/// Converts complete upstream responses
pub struct ResponseTranslator;

impl ResponseTranslator {
    /// Translate a non-streaming upstream response.
    ///
    /// Function calls on the first choice come before the message item.
    pub fn translate(resp: &ChatResponse, response_id: &str) -> ResponsesResponse {
        let created_at = if resp.created > 0 {
            resp.created
        } else {
            chrono::Utc::now().timestamp()
        };
        let mut out = ResponsesResponse::new(response_id, resp.model.clone(), created_at);

        if let Some(message) = resp.first_message() {
            for (i, call) in message.tool_calls.iter().enumerate() {
                out.output.push(OutputItem::function_call(
                    function_call_item_id(response_id, i),
                    call.id.clone(),
                    call.function.name.clone(),
                    call.function.arguments.clone(),
                    ItemStatus::Completed,
                ));
            }

            out.output.push(
                OutputItem::message(
                    message_item_id(response_id),
                    message.role.as_str(),
                    &message.text_content(),
                )
                .with_status(ItemStatus::Completed),
            );
        }

        out.usage = resp.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        out
    }

    /// Translate and prepend one `web_search_call` item per search outcome
    pub fn translate_with_search(
        resp: &ChatResponse,
        response_id: &str,
        outcomes: &[SearchOutcome],
    ) -> ResponsesResponse {
        let mut out = Self::translate(resp, response_id);
        let mut output: Vec<OutputItem> = outcomes.iter().map(SearchOutcome::to_output_item).collect();
        output.append(&mut out.output);
        out.output = output;
        out
    }

    /// Render a stored history as output items. System messages are
    /// skipped; a message's tool calls come before its text.
    pub fn from_history(messages: &[ChatMessage]) -> Vec<OutputItem> {
        let mut output = Vec::new();
        for (i, message) in messages.iter().enumerate() {
            if message.role == Role::System {
                continue;
            }

            for (j, call) in message.tool_calls.iter().enumerate() {
                output.push(OutputItem::function_call(
                    format!("fc_{}_{}", i, j),
                    call.id.clone(),
                    call.function.name.clone(),
                    call.function.arguments.clone(),
                    ItemStatus::Completed,
                ));
            }

            let text = message.text_content();
            if !text.is_empty() {
                output.push(
                    OutputItem::message(format!("msg_{}", i), message.role.as_str(), &text)
                        .with_status(ItemStatus::Completed),
                );
            }
        }
        output
    }
}

/// Response id for a request id
pub fn response_id(request_id: &str) -> String {
    format!("resp-{}", request_id)
}

/// Message item id; response ids already carry their `resp-` prefix
pub fn message_item_id(response_id: &str) -> String {
    format!("msg-{}", response_id.trim_start_matches("resp-"))
}

pub fn function_call_item_id(response_id: &str, n: usize) -> String {
    format!("fc-{}-{}", response_id.trim_start_matches("resp-"), n)
}
