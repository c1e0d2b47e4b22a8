//! Error types for the workqueue engine

use core::fmt;

/// Result type for workqueue operations
pub type WqResult<T> = Result<T, WqError>;

/// Errors that can occur while building or driving a workqueue
///
/// Work items themselves never produce errors here; a primary or ordered
/// function reports failure through whatever state the producer captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WqError {
    /// A worker thread could not be created
    SpawnFailed(String),

    /// Rejected configuration value
    InvalidConfig(&'static str),

    /// The executor has already been torn down
    ShutDown,
}

impl fmt::Display for WqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WqError::SpawnFailed(why) => write!(f, "failed to spawn worker thread: {}", why),
            WqError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            WqError::ShutDown => write!(f, "executor is shut down"),
        }
    }
}

impl std::error::Error for WqError {}

impl From<std::io::Error> for WqError {
    fn from(e: std::io::Error) -> Self {
        WqError::SpawnFailed(e.to_string())
    }
}
