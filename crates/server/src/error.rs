//! Mapping from export errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use framestitch_common::error::ExportError;

/// Error returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (missing or unparsable header).
    BadRequest(String),
    /// Frame for an unknown token while strict mode is on.
    UnknownToken(String),
    Export(ExportError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownToken(_) => StatusCode::NOT_FOUND,
            Self::Export(err) => match err {
                ExportError::DuplicateSession { .. } => StatusCode::CONFLICT,
                ExportError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
                ExportError::InvalidFrameIndex { .. }
                | ExportError::InvalidFrameCount { .. }
                | ExportError::InvalidToken { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        Self::Export(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(msg) => msg,
            Self::UnknownToken(token) => format!("Session not found: {token}"),
            Self::Export(err) => {
                if err.is_client_error() {
                    tracing::debug!(error = %err, "Request rejected");
                } else {
                    tracing::error!(error = %err, "Request failed");
                }
                err.to_string()
            }
        };
        (status, message).into_response()
    }
}
