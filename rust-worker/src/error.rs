//! Error types for parsing and dispatching queued HTTP requests.

use thiserror::Error;

/// Terminal failure turning an envelope into a request descriptor.
///
/// A message that fails to parse must never be dispatched.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The message body is not a valid request payload
    #[error("failed to decode message body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A required field is missing or empty
    #[error("invalid message: {0}")]
    Validation(&'static str),
}

/// Failure attached to a dispatch outcome.
///
/// Holds rendered messages rather than the underlying library errors so that
/// completed descriptors can be cloned and compared.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The request could not be built from the descriptor (bad URL, bad header)
    #[error("invalid http request: {0}")]
    Construction(String),

    /// The target could not be reached, or the attempt timed out
    #[error("error on http POST: {message}")]
    Transport { message: String, timed_out: bool },

    /// The target answered with a 4xx status
    #[error("4xx status on http POST (no retry): {status_text}")]
    ClientStatus { status: u16, status_text: String },

    /// The target answered with a 1xx, 3xx or 5xx status
    #[error("error on http POST: {status_text}")]
    UnexpectedStatus { status: u16, status_text: String },
}

impl DispatchError {
    /// Whether this is a transport failure caused by the request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Transport { timed_out: true, .. })
    }
}

/// Result type for parsing.
pub type ParseResult<T> = Result<T, ParseError>;
