//! Error taxonomy for the agent protocol server.
//!
//! Mirrors the JSON-RPC code space from the protocol spec plus the
//! transport/auth errors that sit above it. Every error that can reach a
//! client is constructed through one of the helpers here so the boundary
//! (`transport::http`, `transport::stdio`) has one place to sanitize.

use thiserror::Error;

/// JSON-RPC / protocol error codes.
///
/// Named constants rather than a closed enum: application-defined codes
/// live in `-32000..-32099` and callers may need to construct one that
/// isn't pre-declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const PARSE_ERROR: ErrorCode = ErrorCode(-32700);
    pub const INVALID_REQUEST: ErrorCode = ErrorCode(-32600);
    pub const METHOD_NOT_FOUND: ErrorCode = ErrorCode(-32601);
    pub const INVALID_PARAMS: ErrorCode = ErrorCode(-32602);
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(-32603);
    pub const CANCELLED: ErrorCode = ErrorCode(-32800);
    pub const CONTENT_TOO_LARGE: ErrorCode = ErrorCode(-32801);

    pub fn as_i32(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Top-level error type for every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A protocol-level error with a specific JSON-RPC code.
    #[error("{code}: {message}")]
    Protocol { code: ErrorCode, message: String },

    /// The request could not be served because of session/lifecycle state.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Authentication/authorization failure (bearer validation, scopes).
    #[error("authorization error: {0}")]
    Authorization(String),

    /// An OAuth endpoint-level error, carrying the OAuth 2.1 error code.
    #[error("oauth error: {error}")]
    OAuth {
        error: String,
        description: Option<String>,
    },

    /// Something unexpected; never shown to clients verbatim.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn lifecycle(message: impl Into<String>) -> Self {
        Error::Lifecycle(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Error::Authorization(message.into())
    }

    pub fn oauth(error: impl Into<String>, description: Option<String>) -> Self {
        Error::OAuth {
            error: error.into(),
            description,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// The JSON-RPC error code this error should be reported under.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Protocol { code, .. } => *code,
            Error::Lifecycle(_) => ErrorCode::INVALID_REQUEST,
            Error::Authorization(_) => ErrorCode::INVALID_REQUEST,
            Error::OAuth { .. } => ErrorCode::INVALID_REQUEST,
            Error::Internal(_) | Error::Io(_) | Error::Jwt(_) => ErrorCode::INTERNAL_ERROR,
            Error::Json(_) => ErrorCode::PARSE_ERROR,
        }
    }

    /// Message safe to return to an untrusted client: never a stack trace
    /// or a file path, regardless of the underlying cause.
    pub fn sanitized_message(&self) -> String {
        match self {
            Error::Protocol { message, .. } => message.clone(),
            Error::Lifecycle(message) => message.clone(),
            Error::Authorization(message) => message.clone(),
            Error::OAuth { error, .. } => error.clone(),
            Error::Internal(_) | Error::Io(_) | Error::Jwt(_) => {
                "internal server error".to_string()
            },
            Error::Json(_) => "invalid JSON".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
