//! Incremental translation of a Chat Completions delta stream into
//! Responses server-sent events.
//!
//! [`StreamTranslator`] is a synchronous state machine fed one line at a
//! time. [`LineDecoder`] frames raw upstream bytes into lines and
//! [`sse_body`] ties both to an upstream byte stream, yielding encoded SSE
//! frames ready to be written to the client.

use crate::error::ProxyError;
use crate::protocol::{
    ChatChunk, ChatMessage, ErrorDetail, ItemStatus, MessageContent, OutputItem, ResponseEvent,
    ResponseRef, ResponseStatus, ResponsesResponse, Role, ToolCall, ToolCallDelta,
};
use crate::translate::response::{function_call_item_id, message_item_id};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, warn};

/// Hard ceiling for one buffered upstream line
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const DONE_SENTINEL: &str = "[DONE]";

/// What the stream produced, handed back for persistence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamResult {
    pub output_text: String,
    /// Tool calls in first-discovery order
    pub tool_calls: Vec<ToolCall>,
    /// Whether the completion sentinel was seen
    pub completed: bool,
}

impl StreamResult {
    /// The assistant message this stream amounts to
    pub fn assistant_message(&self) -> ChatMessage {
        let content = if self.output_text.is_empty() && !self.tool_calls.is_empty() {
            None
        } else {
            Some(MessageContent::Text(self.output_text.clone()))
        };
        ChatMessage::assistant_tool_calls(content, self.tool_calls.clone())
    }
}

/// One tool call being assembled
#[derive(Debug)]
struct CallSlot {
    output_index: usize,
    item: OutputItem,
    /// Whether the call id came from the provider
    provider_id: bool,
}

/// Per-stream translation state
pub struct StreamTranslator {
    response_id: String,
    model: String,
    created_at: i64,
    message_id: String,
    text: String,
    message_index: Option<usize>,
    next_output_index: usize,
    calls: Vec<CallSlot>,
    by_id: HashMap<String, usize>,
    by_index: HashMap<u32, usize>,
    last_call: Option<usize>,
    completed: bool,
}

impl StreamTranslator {
    pub fn new(response_id: impl Into<String>, model: impl Into<String>) -> Self {
        let response_id = response_id.into();
        let message_id = message_item_id(&response_id);
        Self {
            response_id,
            model: model.into(),
            created_at: chrono::Utc::now().timestamp(),
            message_id,
            text: String::new(),
            message_index: None,
            next_output_index: 0,
            calls: Vec::new(),
            by_id: HashMap::new(),
            by_index: HashMap::new(),
            last_call: None,
            completed: false,
        }
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    /// Emit the opening `response.created` event
    pub fn begin(&self, events: &mut Vec<ResponseEvent>) {
        events.push(ResponseEvent::Created {
            response: ResponseRef {
                id: self.response_id.clone(),
                status: ResponseStatus::InProgress,
            },
        });
    }

    /// Process one upstream line. Returns `true` once the stream is done;
    /// later lines are ignored.
    pub fn feed_line(&mut self, line: &str, events: &mut Vec<ResponseEvent>) -> bool {
        if self.completed {
            return true;
        }

        let payload = match line.strip_prefix("data:") {
            Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
            None => return false,
        };

        if payload.trim() == DONE_SENTINEL {
            self.complete(events);
            return true;
        }

        let chunk: ChatChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(
                    error = %e,
                    payload = %preview(payload),
                    "skipping malformed stream chunk"
                );
                return false;
            }
        };

        // One choice per turn
        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(delta) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.text_delta(delta, events);
            }
            for call in &choice.delta.tool_calls {
                self.tool_call_delta(call, events);
            }
        }

        false
    }

    fn text_delta(&mut self, delta: String, events: &mut Vec<ResponseEvent>) {
        let output_index = match self.message_index {
            Some(index) => index,
            None => {
                let index = self.allocate_output_index();
                self.message_index = Some(index);
                events.push(ResponseEvent::OutputItemAdded {
                    output_index: index,
                    item: OutputItem::message(&self.message_id, Role::Assistant.as_str(), "")
                        .with_status(ItemStatus::InProgress),
                });
                index
            }
        };

        self.text.push_str(&delta);
        events.push(ResponseEvent::OutputTextDelta {
            output_index,
            item_id: self.message_id.clone(),
            delta,
        });
    }

    fn tool_call_delta(&mut self, delta: &ToolCallDelta, events: &mut Vec<ResponseEvent>) {
        let slot = self.resolve_slot(delta, events);
        let call = &mut self.calls[slot];

        if let Some(function) = &delta.function {
            if let Some(name) = function.name.as_deref().filter(|n| !n.is_empty()) {
                call.item.name = Some(name.to_string());
            }
            if let Some(fragment) = &function.arguments {
                call.item
                    .arguments
                    .get_or_insert_with(String::new)
                    .push_str(fragment);
            }
        }

        self.last_call = Some(slot);
    }

    /// Find the slot a fragment belongs to, allocating one on first sight.
    ///
    /// A non-empty id wins, then the provider index, then the most recently
    /// opened call. Interleaved calls that carry neither cannot be told
    /// apart and merge.
    fn resolve_slot(&mut self, delta: &ToolCallDelta, events: &mut Vec<ResponseEvent>) -> usize {
        let id = delta.id.as_deref().filter(|id| !id.is_empty());

        if let Some(id) = id {
            if let Some(&slot) = self.by_id.get(id) {
                return slot;
            }
            // An index-keyed call learning its provider id late
            if let Some(&slot) = delta.index.as_ref().and_then(|i| self.by_index.get(i)) {
                let call = &mut self.calls[slot];
                if !call.provider_id {
                    call.item.call_id = Some(id.to_string());
                    call.provider_id = true;
                    self.by_id.insert(id.to_string(), slot);
                    return slot;
                }
            }
            let slot = self.allocate_call(Some(id), events);
            if let Some(index) = delta.index {
                self.by_index.insert(index, slot);
            }
            return slot;
        }

        if let Some(index) = delta.index {
            if let Some(&slot) = self.by_index.get(&index) {
                return slot;
            }
            let slot = self.allocate_call(None, events);
            self.by_index.insert(index, slot);
            return slot;
        }

        match self.last_call {
            Some(slot) => slot,
            None => self.allocate_call(None, events),
        }
    }

    fn allocate_call(&mut self, id: Option<&str>, events: &mut Vec<ResponseEvent>) -> usize {
        let n = self.calls.len();
        let call_id = match id {
            Some(id) => id.to_string(),
            None => format!("call-{}-{}", self.response_id.trim_start_matches("resp-"), n),
        };
        let item = OutputItem::function_call(
            function_call_item_id(&self.response_id, n),
            call_id.clone(),
            "",
            "",
            ItemStatus::InProgress,
        );
        let output_index = self.allocate_output_index();

        debug!(call_id = %call_id, slot = n, "tool call opened");
        events.push(ResponseEvent::OutputItemAdded {
            output_index,
            item: item.clone(),
        });

        self.calls.push(CallSlot {
            output_index,
            item,
            provider_id: id.is_some(),
        });
        if let Some(id) = id {
            self.by_id.insert(id.to_string(), n);
        }
        n
    }

    fn allocate_output_index(&mut self) -> usize {
        let index = self.next_output_index;
        self.next_output_index += 1;
        index
    }

    fn complete(&mut self, events: &mut Vec<ResponseEvent>) {
        for call in &mut self.calls {
            call.item.status = Some(ItemStatus::Completed);
            events.push(ResponseEvent::OutputItemDone {
                output_index: call.output_index,
                item: call.item.clone(),
            });
        }

        let message_index = match self.message_index {
            Some(index) => index,
            None => self.allocate_output_index(),
        };
        events.push(ResponseEvent::OutputItemDone {
            output_index: message_index,
            item: self.message_item(),
        });

        self.completed = true;
        events.push(ResponseEvent::Completed {
            response: self.to_response(),
        });
    }

    fn message_item(&self) -> OutputItem {
        OutputItem::message(&self.message_id, Role::Assistant.as_str(), &self.text)
            .with_status(ItemStatus::Completed)
    }

    /// The aggregate response: function calls first, then the message
    pub fn to_response(&self) -> ResponsesResponse {
        let mut response =
            ResponsesResponse::new(&self.response_id, self.model.clone(), self.created_at);
        if !self.completed {
            response.status = ResponseStatus::InProgress;
        }
        response.output = self.calls.iter().map(|c| c.item.clone()).collect();
        response.output.push(self.message_item());
        response
    }

    /// Events reporting a broken stream
    pub fn fail(&self, message: &str) -> Vec<ResponseEvent> {
        vec![
            ResponseEvent::Error {
                error: ErrorDetail {
                    kind: "stream_error".to_string(),
                    code: None,
                    message: message.to_string(),
                },
            },
            ResponseEvent::Failed {
                response: ResponseRef {
                    id: self.response_id.clone(),
                    status: ResponseStatus::Failed,
                },
            },
        ]
    }

    pub fn finish(self) -> StreamResult {
        let tool_calls = self
            .calls
            .into_iter()
            .map(|c| {
                ToolCall::function(
                    c.item.call_id.unwrap_or_default(),
                    c.item.name.unwrap_or_default(),
                    c.item.arguments.unwrap_or_default(),
                )
            })
            .collect();
        StreamResult {
            output_text: self.text,
            tool_calls,
            completed: self.completed,
        }
    }
}

/// Splits a byte stream into `\n`-terminated lines with a length ceiling
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    limit: usize,
}

impl LineDecoder {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Feed bytes, returning every completed line
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ProxyError> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            if raw.len() - 1 > self.limit {
                return Err(ProxyError::LineTooLong { limit: self.limit });
            }
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }

        if self.buf.len() > self.limit {
            return Err(ProxyError::LineTooLong { limit: self.limit });
        }
        Ok(lines)
    }

    /// The unterminated trailing line, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn preview(payload: &str) -> String {
    const PREVIEW_CHARS: usize = 200;
    payload.chars().take(PREVIEW_CHARS).collect()
}

fn frame(event: &ResponseEvent) -> Result<Bytes, std::io::Error> {
    Ok(Bytes::from(event.to_sse()))
}

/// Drive a translator over an upstream byte stream, yielding SSE frames.
///
/// `on_finish` runs once after the last frame with the collected result, or
/// the read error that ended the stream.
pub fn sse_body<S, E, F, Fut>(
    mut translator: StreamTranslator,
    upstream: S,
    on_finish: F,
) -> impl Stream<Item = Result<Bytes, std::io::Error>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display,
    F: FnOnce(Result<StreamResult, ProxyError>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    async_stream::stream! {
        let mut events = Vec::new();
        translator.begin(&mut events);
        for event in events.drain(..) {
            yield frame(&event);
        }

        let mut decoder = LineDecoder::new(MAX_LINE_BYTES);
        let mut failure: Option<ProxyError> = None;
        let mut done = false;

        futures::pin_mut!(upstream);
        while let Some(chunk) = upstream.next().await {
            let lines = match chunk {
                Ok(bytes) => decoder.push(&bytes),
                Err(e) => Err(ProxyError::StreamRead(e.to_string())),
            };
            let lines = match lines {
                Ok(lines) => lines,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            for line in lines {
                if translator.feed_line(&line, &mut events) {
                    done = true;
                    break;
                }
            }
            for event in events.drain(..) {
                yield frame(&event);
            }
            if done {
                break;
            }
        }

        if !done && failure.is_none() {
            if let Some(line) = decoder.finish() {
                translator.feed_line(&line, &mut events);
                for event in events.drain(..) {
                    yield frame(&event);
                }
            }
        }

        match failure {
            Some(err) => {
                warn!(response_id = %translator.response_id(), error = %err, "upstream stream failed");
                for event in translator.fail(&err.to_string()) {
                    yield frame(&event);
                }
                on_finish(Err(err)).await;
            }
            None => {
                let result = translator.finish();
                if !result.completed {
                    warn!("upstream closed the stream without a completion sentinel");
                }
                on_finish(Ok(result)).await;
            }
        }
    }
}
