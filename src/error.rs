//! Framework error taxonomy.
//!
//! Every fallible operation on the request path returns [`JoltError`]. The
//! dispatcher is the only place that turns an error into a response, via
//! [`JoltError::status`] and the configured
//! [`ExceptionHandler`](crate::exception::ExceptionHandler).

use thiserror::Error;

use crate::http::{Method, StatusCode};

/// Convenience alias used throughout the crate.
pub type JoltResult<T> = Result<T, JoltError>;

/// Errors raised while configuring an application or processing a request.
#[derive(Debug, Error)]
pub enum JoltError {
    // ── Startup / configuration ──────────────────────────────────────────────
    #[error("duplicate route: {method} {path}")]
    DuplicateRoute { method: Method, path: String },

    #[error("versioned group `{inner}` cannot be nested inside versioned group `{outer}`")]
    NestedVersionedGroup { outer: String, inner: String },

    #[error("invalid route pattern `{path}`: {source}")]
    InvalidPattern {
        path: String,
        #[source]
        source: regex::Error,
    },

    // ── Routing ──────────────────────────────────────────────────────────────
    #[error("no route for {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },

    // ── Binding ──────────────────────────────────────────────────────────────
    #[error("cannot bind parameter `{name}`: {reason}")]
    Binding { name: String, reason: String },

    #[error("unsupported parameter at position {index}")]
    UnsupportedParameter { index: usize },

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] crate::http::multipart::MultipartError),

    // ── Response buffer ──────────────────────────────────────────────────────
    #[error("response already committed")]
    ResponseCommitted,

    // ── Collaborators ────────────────────────────────────────────────────────
    #[error("template `{template}` failed to render: {reason}")]
    Template { template: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Application ──────────────────────────────────────────────────────────
    /// An application error carrying its own status code.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// Any other application failure; mapped to 500.
    #[error("handler failed: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl JoltError {
    /// Builds an application error that maps to `status`.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Wraps an arbitrary error as an internal (500) failure.
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Internal(err.into())
    }

    /// The HTTP status this error maps to when it reaches the top of the pipeline.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::MethodNotAllowed { .. } => StatusCode::MethodNotAllowed,
            Self::Binding { .. } | Self::InvalidJson(_) | Self::Multipart(_) => {
                StatusCode::BadRequest
            }
            Self::Http { status, .. } => *status,
            Self::DuplicateRoute { .. }
            | Self::NestedVersionedGroup { .. }
            | Self::InvalidPattern { .. }
            | Self::UnsupportedParameter { .. }
            | Self::ResponseCommitted
            | Self::Template { .. }
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// Returns `true` for errors raised by route resolution (404 / 405).
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MethodNotAllowed { .. })
    }

    /// Short, client-safe message for the response body.
    ///
    /// Internal failures never leak their source text.
    pub fn public_message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            Self::Binding { .. } | Self::InvalidJson(_) | Self::Multipart(_) => self.to_string(),
            _ => self.status().canonical_reason().to_owned(),
        }
    }
}
