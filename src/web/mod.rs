//! HTTP boundary
//!
//! Serves the Responses API and a few service endpoints. Every request gets
//! a trace id that is logged, forwarded upstream and echoed back.

mod error;
mod handlers;
mod routes;
mod state;
mod trace;


pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use trace::{extract_trace_id, generate_trace_id, TraceId, TRACE_ID_HEADERS};
