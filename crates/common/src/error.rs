//! Error types shared across framestitch crates.

/// Top-level error type for export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Session already registered: {token}")]
    DuplicateSession { token: String },

    #[error("Session not found: {token}")]
    SessionNotFound { token: String },

    #[error("Frame index {index} out of range for {expected} expected frames")]
    InvalidFrameIndex { index: u32, expected: u32 },

    #[error("Invalid frame count: {value}")]
    InvalidFrameCount { value: String },

    #[error("Invalid session token: {token:?}")]
    InvalidToken { token: String },

    #[error("Failed to store frame {index}: {source}")]
    IngestionFailed {
        index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoding failed: {message}")]
    EncodingFailed { message: String },

    #[error("Encoder unavailable: {message}")]
    EncoderUnavailable { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ExportError.
pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    pub fn duplicate_session(token: impl Into<String>) -> Self {
        Self::DuplicateSession {
            token: token.into(),
        }
    }

    pub fn session_not_found(token: impl Into<String>) -> Self {
        Self::SessionNotFound {
            token: token.into(),
        }
    }

    pub fn invalid_token(token: impl Into<String>) -> Self {
        Self::InvalidToken {
            token: token.into(),
        }
    }

    pub fn invalid_frame_count(value: impl Into<String>) -> Self {
        Self::InvalidFrameCount {
            value: value.into(),
        }
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: msg.into(),
        }
    }

    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSession { .. }
                | Self::SessionNotFound { .. }
                | Self::InvalidFrameIndex { .. }
                | Self::InvalidFrameCount { .. }
                | Self::InvalidToken { .. }
        )
    }
}
