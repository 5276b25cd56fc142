//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HistoryError`]
//! via `From`, so adapters never leak their error types past a port.

use crate::token::TokenError;

/// Top-level error for every history operation.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The caller violated a parameter contract. Nothing was read or written.
    #[error("invalid parameters")]
    InvalidParameters(#[from] ValidationError),

    /// A token payload failed strict decoding.
    #[error("malformed token at byte {offset}: {reason}")]
    MalformedToken { offset: u64, reason: &'static str },

    /// A token carried an unknown kind prefix.
    #[error("unsupported token `{key}` at byte {offset}")]
    UnsupportedToken { offset: u64, key: String },

    /// A shard ends in the middle of a token or of a Begin/Value/End triple.
    #[error("corrupt history log at byte {offset}")]
    CorruptLog { offset: u64 },

    /// The per-series lock could not be acquired in time.
    #[error("timed out waiting for the lock of series {series}")]
    SeriesLockTimeout { series: String },

    /// The operation observed a cancelled token and stopped.
    #[error("operation cancelled")]
    Cancelled,

    /// Infrastructure failure (I/O, task join, …).
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HistoryError {
    /// Stable `snake_case` name of the error kind, used in API error bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameters(_) => "invalid_parameters",
            Self::MalformedToken { .. } => "malformed_token",
            Self::UnsupportedToken { .. } => "unsupported_token",
            Self::CorruptLog { .. } => "corrupt_log",
            Self::SeriesLockTimeout { .. } => "series_lock_timeout",
            Self::Cancelled => "cancelled",
            Self::Storage(_) => "storage",
        }
    }

    /// Attach a byte offset to a codec error.
    #[must_use]
    pub fn from_token(offset: u64, err: TokenError) -> Self {
        match err {
            TokenError::Malformed(reason) => Self::MalformedToken { offset, reason },
            TokenError::Unsupported(key) => Self::UnsupportedToken { offset, key },
        }
    }
}

/// Caller-boundary contract violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("component uid must not be empty")]
    EmptyComponentUid,

    #[error("status uid must not be empty")]
    EmptyStatusUid,

    #[error("range start is after range end")]
    InvertedRange,

    #[error("interval must be positive")]
    NonPositiveInterval,

    #[error("text extracts do not accept an interval")]
    IntervalWithText,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("a status uid filter requires a component uid")]
    StatusWithoutComponent,

    #[error("unknown data type `{0}`")]
    InvalidDataType(String),
}
