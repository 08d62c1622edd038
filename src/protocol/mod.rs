//! Wire protocol types
//!
//! `responses` holds the client-facing Responses API shapes, `chat` holds the
//! Chat Completions shapes spoken by upstream providers.

pub mod chat;
pub mod responses;

pub use chat::{
    ChatChoice, ChatChunk, ChatMessage, ChatRequest, ChatResponse, ChatUsage, ContentPart,
    FunctionCall, FunctionDef, ImageUrl, MessageContent, Role, ToolCall, ToolCallDelta,
    ToolDefinition,
};
pub use responses::{
    ErrorBody, ErrorDetail, Input, InputContent, InputItem, InputPart, ItemKind, ItemStatus,
    OutputContent, OutputItem, ResponseEvent, ResponseRef, ResponseStatus, ResponsesRequest,
    ResponsesResponse, ToolDeclaration, Usage,
};
