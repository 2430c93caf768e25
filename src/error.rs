//! Error types for inbox-sweep

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mailbox API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed mail: {0}")]
    Decode(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Quota error: {0}")]
    Quota(String),

    #[error("no unsubscriber available")]
    NoUnsubscriber,

    #[error("Unsubscribe request rejected with status {status}")]
    Unsubscribe { status: u16 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether re-issuing the same remote call may succeed.
    ///
    /// Only rate limiting (429) and server-side (5xx) API statuses are
    /// transient. A missing message or a rejected token fails the same
    /// way every time, as do decode and cancellation errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Http(_) | Self::Json(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
