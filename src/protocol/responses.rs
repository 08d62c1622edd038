//! Responses API wire types (the client-facing side)

use crate::protocol::chat::FunctionDef;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Incoming Responses API request
///
/// Optional fields of the wrong shape read as absent rather than failing
/// the whole request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub model: String,
    #[serde(default, deserialize_with = "lenient")]
    pub instructions: Option<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub input: Input,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tools: Vec<ToolDeclaration>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub stream: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub temperature: Option<f64>,
    /// Non-positive values mean no limit
    #[serde(default, deserialize_with = "lenient")]
    pub max_output_tokens: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub previous_response_id: Option<String>,
}

/// Deserialize an optional field, reading a mismatched value as `None`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Keep the well-formed entries of a list; anything but an array is empty
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries: Vec<Value> = lenient_or_default(deserializer)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

fn lenient_item_kind<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient(deserializer)?.unwrap_or_else(message_type))
}

impl ResponsesRequest {
    /// Whether the request declares a search capability tool
    pub fn declares_search(&self) -> bool {
        self.tools.iter().any(ToolDeclaration::is_search_capability)
    }
}

/// The `input` field: a bare prompt string or a list of items
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Text(String),
    Items(Vec<InputItem>),
}

impl Default for Input {
    fn default() -> Self {
        Input::Items(Vec::new())
    }
}

/// One input item; `kind` selects which of the optional fields apply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputItem {
    /// `message`, `function_call` or `function_call_output`
    #[serde(
        rename = "type",
        default = "message_type",
        deserialize_with = "lenient_item_kind"
    )]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<InputContent>,
    #[serde(default, deserialize_with = "lenient")]
    pub call_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub arguments: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub output: Option<String>,
}

fn message_type() -> String {
    "message".to_string()
}

/// Message item content: bare string or typed parts
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputContent {
    Text(String),
    Parts(Vec<InputPart>),
}

/// A typed content part (`input_text`, `output_text`, `input_image`, ...)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputPart {
    #[serde(rename = "type", default, deserialize_with = "lenient_or_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<String>,
}

/// A tool declaration as sent by the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolDeclaration {
    #[serde(rename = "type", default, deserialize_with = "lenient_or_default")]
    pub kind: String,
    /// Nested function form
    #[serde(default, deserialize_with = "lenient")]
    pub function: Option<FunctionDef>,
    /// Flat function form
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub strict: Option<bool>,
}

/// Declaration types that ask for the built-in search capability
pub const SEARCH_CAPABILITY_TYPES: &[&str] = &["web_search", "web_search_preview"];

impl ToolDeclaration {
    pub fn is_search_capability(&self) -> bool {
        SEARCH_CAPABILITY_TYPES.contains(&self.kind.as_str())
    }

    /// The function definition in either nested or flat form
    pub fn function_def(&self) -> Option<FunctionDef> {
        if self.kind != "function" {
            return None;
        }
        let def = match &self.function {
            Some(def) => def.clone(),
            None => FunctionDef {
                name: self.name.clone().unwrap_or_default(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
                strict: self.strict,
            },
        };
        if def.name.is_empty() {
            None
        } else {
            Some(def)
        }
    }
}

/// Lifecycle status of an output item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Failed,
}

/// Output item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
    FunctionCall,
    WebSearchCall,
}

/// One unit of output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<OutputContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<SearchAction>,
}

impl OutputItem {
    /// A message item; empty text yields a contentless item
    pub fn message(id: impl Into<String>, role: impl Into<String>, text: &str) -> Self {
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![OutputContent::text(text)]
        };
        Self {
            kind: ItemKind::Message,
            id: id.into(),
            role: Some(role.into()),
            content,
            call_id: None,
            name: None,
            arguments: None,
            status: None,
            action: None,
        }
    }

    pub fn function_call(
        id: impl Into<String>,
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
        status: ItemStatus,
    ) -> Self {
        Self {
            kind: ItemKind::FunctionCall,
            id: id.into(),
            role: None,
            content: Vec::new(),
            call_id: Some(call_id.into()),
            name: Some(name.into()),
            arguments: Some(arguments.into()),
            status: Some(status),
            action: None,
        }
    }

    pub fn web_search_call(id: impl Into<String>, query: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            kind: ItemKind::WebSearchCall,
            id: id.into(),
            role: None,
            content: Vec::new(),
            call_id: None,
            name: None,
            arguments: None,
            status: Some(status),
            action: Some(SearchAction {
                kind: "search".to_string(),
                query: query.into(),
            }),
        }
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Concatenated text of the item's content parts
    pub fn text(&self) -> String {
        self.content.iter().map(|c| c.text.as_str()).collect()
    }
}

/// A content part of an output message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl OutputContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "output_text".to_string(),
            text: text.into(),
        }
    }
}

/// The action recorded on a web search call item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub query: String,
}

/// Token usage in Responses terms
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Status of a whole response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Failed,
}

/// Non-streaming Responses API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub object: String,
    pub created_at: i64,
    pub status: ResponseStatus,
    pub model: String,
    pub output: Vec<OutputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ResponsesResponse {
    pub fn new(id: impl Into<String>, model: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            object: "response".to_string(),
            created_at,
            status: ResponseStatus::Completed,
            model: model.into(),
            output: Vec::new(),
            usage: None,
        }
    }
}

/// Minimal response reference carried by lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRef {
    pub id: String,
    pub status: ResponseStatus,
}

/// Error body returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

/// Server-sent events of the Responses streaming protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ResponseEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponseRef },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { output_index: usize, item: OutputItem },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        output_index: usize,
        item_id: String,
        delta: String,
    },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { output_index: usize, item: OutputItem },
    #[serde(rename = "response.completed")]
    Completed { response: ResponsesResponse },
    #[serde(rename = "response.failed")]
    Failed { response: ResponseRef },
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
}

impl ResponseEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            ResponseEvent::Created { .. } => "response.created",
            ResponseEvent::OutputItemAdded { .. } => "response.output_item.added",
            ResponseEvent::OutputTextDelta { .. } => "response.output_text.delta",
            ResponseEvent::OutputItemDone { .. } => "response.output_item.done",
            ResponseEvent::Completed { .. } => "response.completed",
            ResponseEvent::Failed { .. } => "response.failed",
            ResponseEvent::Error { .. } => "error",
        }
    }

    /// Encode as one SSE frame (`event:` + `data:` + blank line)
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.name(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_with_string_input() {
        let req: ResponsesRequest =
            serde_json::from_value(json!({"model": "gpt-4", "input": "hi"})).unwrap();
        assert!(matches!(req.input, Input::Text(ref t) if t == "hi"));
        assert!(!req.stream);
    }

    #[test]
    fn test_negative_max_output_tokens_accepted() {
        let req: ResponsesRequest = serde_json::from_value(
            json!({"model": "m", "input": "hi", "max_output_tokens": -1}),
        )
        .unwrap();
        assert_eq!(req.max_output_tokens, Some(-1));
    }

    #[test]
    fn test_mismatched_optional_fields_read_as_absent() {
        let req: ResponsesRequest = serde_json::from_value(json!({
            "model": "m",
            "instructions": 42,
            "temperature": "warm",
            "max_output_tokens": "lots",
            "previous_response_id": {"id": "r"},
            "stream": "yes",
            "tools": [{"type": "function", "name": "shell"}, 7],
            "input": [{
                "role": "user",
                "content": [
                    {"type": "input_text", "text": "look"},
                    {"type": "input_image", "image_url": {"url": "https://x/y.png"}}
                ]
            }]
        }))
        .unwrap();

        assert!(req.instructions.is_none());
        assert!(req.temperature.is_none());
        assert!(req.max_output_tokens.is_none());
        assert!(req.previous_response_id.is_none());
        assert!(!req.stream);
        assert_eq!(req.tools.len(), 1);

        let items = match &req.input {
            Input::Items(items) => items,
            other => panic!("unexpected input {:?}", other),
        };
        assert_eq!(items[0].kind, "message");
        match &items[0].content {
            Some(InputContent::Parts(parts)) => {
                assert_eq!(parts.len(), 2);
                assert!(parts[1].image_url.is_none());
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_flat_and_nested_function_tools() {
        let flat: ToolDeclaration = serde_json::from_value(json!({
            "type": "function", "name": "shell", "parameters": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(flat.function_def().unwrap().name, "shell");

        let nested: ToolDeclaration = serde_json::from_value(json!({
            "type": "function", "function": {"name": "read_file"}
        }))
        .unwrap();
        assert_eq!(nested.function_def().unwrap().name, "read_file");

        let unnamed: ToolDeclaration =
            serde_json::from_value(json!({"type": "function", "function": {"name": ""}})).unwrap();
        assert!(unnamed.function_def().is_none());
    }

    #[test]
    fn test_event_sse_frame() {
        let event = ResponseEvent::OutputTextDelta {
            output_index: 0,
            item_id: "msg-1".to_string(),
            delta: "Hi".to_string(),
        };
        let frame = event.to_sse();
        assert!(frame.starts_with("event: response.output_text.delta\ndata: {"));
        assert!(frame.contains(r#""type":"response.output_text.delta""#));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn test_web_search_item_shape() {
        let item = OutputItem::web_search_call("ws_1", "rust", ItemStatus::Completed);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "web_search_call");
        assert_eq!(value["action"]["query"], "rust");
        assert_eq!(value["status"], "completed");
    }
}
