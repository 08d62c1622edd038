//! Protocol translation between the Responses API and Chat Completions

pub mod request;
pub mod response;
pub mod stream;

pub use request::{search_tool_definition, RequestTranslator, SEARCH_TOOL_NAME};
pub use response::{response_id, ResponseTranslator};
pub use stream::{sse_body, LineDecoder, StreamResult, StreamTranslator, MAX_LINE_BYTES};
