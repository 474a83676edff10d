//! Error types for document construction, loading, and navigation.

use std::fmt;

/// What went wrong inside the transport collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    Redirect,
    Body,
    Request,
    Unsupported,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Redirect => "redirect",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Unsupported => "unsupported",
            TransportErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A transport-level failure: DNS, connect, timeout, or a body stream fault.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unsupported, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_redirect() {
            TransportErrorKind::Redirect
        } else if e.is_body() || e.is_decode() {
            TransportErrorKind::Body
        } else if e.is_request() || e.is_builder() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

/// Errors returned by documents, sessions, and the HTML layer.
///
/// `Clone` so that a cached load outcome can be handed out on every call.
#[derive(thiserror::Error, Debug, Clone)]
pub enum DocError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP status code {status}")]
    Status { status: u16 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Middleware error: {0}")]
    Middleware(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Load cancelled before completion")]
    Cancelled,

    #[error("Element is not attached to a live document")]
    DetachedElement,

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl DocError {
    /// Status errors still leave the response inspectable.
    pub fn is_status(&self) -> bool {
        matches!(self, DocError::Status { .. })
    }
}

impl From<serde_json::Error> for DocError {
    fn from(e: serde_json::Error) -> Self {
        DocError::Json(e.to_string())
    }
}

impl From<std::io::Error> for DocError {
    fn from(e: std::io::Error) -> Self {
        DocError::Io(e.to_string())
    }
}

/// Convenience result type.
pub type DocResult<T> = Result<T, DocError>;
