//! Error taxonomy for turn execution
//!
//! One error type flows through the protocol client, the reactive toolkit and the
//! orchestrator. It is `Clone` because a single failure is delivered to every observer
//! and every pending post of a connection.

use thiserror::Error;

/// Errors that can occur while executing turns against a bot backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// The connection was ended, or the resource is permanently closed.
    #[error("closed")]
    Closed,

    #[error("Server returned {status} while calling the service.")]
    Status { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Server did not respond with content type of \"text/event-stream\", instead, received \"{0}\".")]
    UnexpectedContentType(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Too many turns")]
    TooManyTurns,

    #[error("start_new_conversation() must be called before {0}().")]
    NoConversation(&'static str),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("{0}")]
    Other(String),
}

impl TurnError {
    /// Whether the request that produced this error may be retried.
    ///
    /// Only network failures and 5xx responses are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error represents cancellation rather than a failure.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Build an error from any displayable value, e.g. a test fixture or a boxed error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<reqwest::Error> for TurnError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Self::InvalidRequest(error.to_string())
        } else if error.is_decode() {
            Self::MalformedResponse(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for TurnError {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedResponse(error.to_string())
    }
}
