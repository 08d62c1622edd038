//! Responses request → Chat Completions request

use crate::protocol::{
    ChatMessage, ChatRequest, ContentPart, FunctionDef, ImageUrl, Input, InputContent, InputItem,
    InputPart, MessageContent, ResponsesRequest, Role, ToolCall, ToolDefinition,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Name of the function injected in place of the search capability
pub const SEARCH_TOOL_NAME: &str = "web_search";

/// Translates client requests into upstream chat requests.
///
/// Translation never fails: malformed optional pieces are dropped.
#[derive(Debug, Clone)]
pub struct RequestTranslator {
    model_mapping: HashMap<String, String>,
    developer_role_supported: bool,
    developer_fallback: Role,
    inject_search_tool: bool,
}

impl RequestTranslator {
    pub fn new(model_mapping: HashMap<String, String>) -> Self {
        Self {
            model_mapping,
            developer_role_supported: false,
            developer_fallback: Role::System,
            inject_search_tool: false,
        }
    }

    /// Whether the destination accepts the `developer` role as-is
    pub fn developer_role(mut self, supported: bool, fallback: Role) -> Self {
        self.developer_role_supported = supported;
        self.developer_fallback = fallback;
        self
    }

    /// Replace search capability declarations with the `web_search` function
    pub fn inject_search_tool(mut self, inject: bool) -> Self {
        self.inject_search_tool = inject;
        self
    }

    /// Map a client model name through the configured table
    pub fn map_model(&self, model: &str) -> String {
        self.model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    /// Build the upstream request; `history` goes before the new input
    pub fn translate(&self, req: &ResponsesRequest, history: &[ChatMessage]) -> ChatRequest {
        let mut messages: Vec<ChatMessage> = history.to_vec();

        match &req.input {
            Input::Text(text) => messages.push(ChatMessage::text(Role::User, text.clone())),
            Input::Items(items) => {
                messages.extend(items.iter().filter_map(|item| self.translate_item(item)))
            }
        }

        if let Some(instructions) = req.instructions.as_deref().filter(|s| !s.is_empty()) {
            if !messages.iter().any(|m| m.role == Role::System) {
                messages.insert(0, ChatMessage::text(Role::System, instructions));
            }
        }

        let tools = self.translate_tools(req);

        debug!(
            model = %req.model,
            message_count = messages.len(),
            tool_count = tools.len(),
            "translated request"
        );

        ChatRequest {
            model: self.map_model(&req.model),
            messages,
            tools,
            stream: req.stream,
            temperature: req.temperature,
            max_tokens: req
                .max_output_tokens
                .filter(|&n| n > 0)
                .and_then(|n| u32::try_from(n).ok()),
        }
    }

    fn translate_item(&self, item: &InputItem) -> Option<ChatMessage> {
        match item.kind.as_str() {
            "message" => self.translate_message(item),
            "function_call" => Some(ChatMessage::assistant_tool_calls(
                None,
                vec![ToolCall::function(
                    item.call_id.clone().unwrap_or_default(),
                    item.name.clone().unwrap_or_default(),
                    item.arguments.clone().unwrap_or_default(),
                )],
            )),
            "function_call_output" => Some(ChatMessage::tool_result(
                item.call_id.clone().unwrap_or_default(),
                item.output.clone().unwrap_or_default(),
            )),
            other => {
                debug!(kind = other, "dropping unsupported input item");
                None
            }
        }
    }

    fn translate_message(&self, item: &InputItem) -> Option<ChatMessage> {
        let raw_role = item.role.as_deref().unwrap_or_default();
        let role = match Role::parse(raw_role) {
            Some(Role::Developer) if !self.developer_role_supported => self.developer_fallback,
            Some(role) => role,
            None => {
                warn!(role = raw_role, "dropping message with unknown role");
                return None;
            }
        };

        let content = match &item.content {
            None => None,
            Some(InputContent::Text(text)) => Some(MessageContent::Text(text.clone())),
            Some(InputContent::Parts(parts)) => translate_parts(parts),
        };

        Some(ChatMessage {
            role,
            content,
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        })
    }

    fn translate_tools(&self, req: &ResponsesRequest) -> Vec<ToolDefinition> {
        let mut tools = Vec::new();
        let mut search_injected = false;

        for decl in &req.tools {
            if let Some(def) = decl.function_def() {
                tools.push(ToolDefinition::function(def));
            } else if decl.is_search_capability() && self.inject_search_tool {
                if !search_injected {
                    tools.push(search_tool_definition());
                    search_injected = true;
                }
            } else {
                debug!(kind = %decl.kind, "dropping unsupported tool declaration");
            }
        }

        tools
    }
}

/// Multi-part content. Unusable parts are dropped first; nothing left means
/// no content, and a lone text part collapses to a plain string.
fn translate_parts(parts: &[InputPart]) -> Option<MessageContent> {
    let mut converted: Vec<ContentPart> = parts.iter().filter_map(translate_part).collect();

    match converted.as_mut_slice() {
        [] => None,
        [ContentPart::Text { text }] => Some(MessageContent::Text(std::mem::take(text))),
        _ => Some(MessageContent::Parts(converted)),
    }
}

fn is_text_part(part: &InputPart) -> bool {
    matches!(part.kind.as_str(), "input_text" | "output_text" | "text")
}

fn translate_part(part: &InputPart) -> Option<ContentPart> {
    if is_text_part(part) {
        return Some(ContentPart::Text {
            text: part.text.clone().unwrap_or_default(),
        });
    }

    if part.kind == "input_image" {
        let url = part
            .image_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| part.data.as_deref().filter(|d| !d.is_empty()))?;
        return Some(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.to_string(),
            },
        });
    }

    debug!(kind = %part.kind, "dropping unsupported content part");
    None
}

/// The function declaration advertised to the model for search
pub fn search_tool_definition() -> ToolDefinition {
    ToolDefinition::function(FunctionDef {
        name: SEARCH_TOOL_NAME.to_string(),
        description: Some(
            "Search the web for up-to-date information. Returns titles, URLs and summaries."
                .to_string(),
        ),
        parameters: Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })),
        strict: None,
    })
}
