//! Storage-specific error type for the token log.

use hubhist_domain::error::HistoryError;
use hubhist_domain::token::TokenError;

/// Errors originating from the token log storage layer.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Reading, writing or seeking a shard failed.
    #[error("i/o error")]
    Io(#[from] std::io::Error),

    /// A token did not decode.
    #[error("invalid token at byte {offset}")]
    Token {
        offset: u64,
        #[source]
        source: TokenError,
    },

    /// The shard ends inside a token or inside a Begin/Value/End triple.
    #[error("truncated interval log at byte {offset}")]
    Truncated { offset: u64 },

    /// A blocking storage task panicked or was aborted.
    #[error("storage task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl From<LogError> for HistoryError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::Token { offset, source } => Self::from_token(offset, source),
            LogError::Truncated { offset } => Self::CorruptLog { offset },
            err @ (LogError::Io(_) | LogError::Task(_)) => Self::Storage(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_truncation_to_corrupt_log() {
        let err: HistoryError = LogError::Truncated { offset: 12 }.into();
        assert!(matches!(err, HistoryError::CorruptLog { offset: 12 }));
    }

    #[test]
    fn should_keep_token_offset() {
        let err: HistoryError = LogError::Token {
            offset: 3,
            source: TokenError::Unsupported("x:".to_string()),
        }
        .into();
        assert!(matches!(err, HistoryError::UnsupportedToken { offset: 3, .. }));
    }

    #[test]
    fn should_wrap_io_errors_as_storage() {
        let io = std::io::Error::other("disk on fire");
        let err: HistoryError = LogError::Io(io).into();
        assert_eq!(err.kind(), "storage");
    }
}
