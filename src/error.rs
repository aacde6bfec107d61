//! Error types for the streaming clients
//!
//! `ClientError` covers everything that can abort a request: the transfer
//! itself, the HTTP status, the byte stream's encoding, and cancellation.
//! A single malformed data line is not fatal and has its own type,
//! `LineParseError`, so the reconstructor can report and skip it.

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that abort a streaming request
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Response is not valid UTF-8: {0}")]
    Decode(String),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Whether the error came from the caller's cancellation token
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

/// A data line that does not follow the grep wire schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineParseError {
    #[error("expected 7 space-separated fields, found {0}")]
    FieldCount(usize),

    #[error("field `{field}` is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("text block is not a quoted string: {0}")]
    InvalidTextBlock(String),

    #[error("context counts ({before} before, {after} after) exceed the {total}-line block")]
    InconsistentContext {
        before: usize,
        after: usize,
        total: usize,
    },

    #[error("line and column numbers are 1-indexed, found 0 in `{0}`")]
    ZeroIndex(&'static str),
}
