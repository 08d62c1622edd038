//! API errors rendered in the Responses error format

use crate::error::ProxyError;
use crate::protocol::{ErrorBody, ErrorDetail};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("API key is required")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Upstream(#[from] ProxyError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(ProxyError::Upstream { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Upstream(e) if e.is_transport() => StatusCode::BAD_GATEWAY,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Front error body for this failure
    pub fn detail(&self) -> ErrorDetail {
        let (kind, code) = match self {
            Self::BadRequest(_) => ("parse_error", None),
            Self::Unauthorized => ("unauthorized", None),
            Self::NotFound(_) => ("not_found", None),
            Self::Upstream(ProxyError::Upstream { status, .. }) => {
                ("upstream_error", Some(status.to_string()))
            }
            Self::Upstream(e) if e.is_transport() => ("upstream_error", None),
            Self::Upstream(_) => ("parse_error", None),
        };
        let message = match self {
            Self::Upstream(ProxyError::Upstream { message, .. }) => message.clone(),
            other => other.to_string(),
        };
        ErrorDetail {
            kind: kind.to_string(),
            code,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        error!(
            status = status.as_u16(),
            error_type = %detail.kind,
            message = %detail.message,
            "request error"
        );
        (status, Json(ErrorBody { error: detail })).into_response()
    }
}
