//! Storage adapter configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::LogError;
use crate::repository::TokenLogRepository;

/// Configuration for the token log storage adapter.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the `History` tree.
    pub root: PathBuf,
    /// How long an operation waits for the lock of its series.
    pub lock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Build a [`TokenLogRepository`] from this configuration.
    ///
    /// Creates the history directory if missing.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Io`] if the directory cannot be created.
    pub fn build(self) -> Result<TokenLogRepository, LogError> {
        TokenLogRepository::open(self)
    }
}
