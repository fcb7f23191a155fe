//! Error types for key-space scanning

use thiserror::Error;

/// Error type for scan sessions and data sources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// A scan is already running on this source. The session state is left untouched.
    #[error("A scan is already running on this source")]
    AlreadyRunning,

    /// The connection to the backend was lost or could not be used
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The identifier no longer exists on the backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend rejected a command
    #[error("Source error: {0}")]
    Source(String),

    #[error("Invalid scan options: {0}")]
    InvalidOptions(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ScanError {
    /// Whether the error only concerns a single item and scanning may continue
    ///
    /// A key that vanished or changed type between listing and lookup is
    /// skipped; a lost connection is not.
    pub fn is_per_item(&self) -> bool {
        matches!(self, ScanError::NotFound(_) | ScanError::Source(_))
    }
}

/// Result type alias for scan operations
pub type Result<T> = std::result::Result<T, ScanError>;
