//! Error types for the facade.
//!
//! A single unified error type covers both facade-level misuse
//! (configuration, lifecycle) and failures bubbled up from backend
//! transactions, so callers have one `Result` to match on.

use std::fmt;
use std::io;

/// Unified error type for facade operations.
#[derive(Debug)]
pub enum FacadeError {
    /// Invalid configuration: missing state file path, empty target list,
    /// a null target, or a target without a backend.
    Configuration(String),
    /// An operation that requires `start()` was called before it.
    NotStarted,
    /// `start()` or a configuration setter was called after the facade
    /// already started.
    AlreadyStarted,
    /// The state file's magic cookie or format version did not match.
    /// This is fatal at startup (unlike a target-count mismatch, which
    /// is only a warning — see `StateStore::load`).
    StateFileCorrupt(String),
    /// A failure class the caller should retry: a transaction whose
    /// commit straddled a migration boundary.
    Retry(String),
    /// A failure class that is not retryable; a migration or operation
    /// was abandoned because of it.
    Fatal(String),
    /// An opaque error surfaced by a backend or transaction
    /// implementation that doesn't fit a more specific kind.
    Backend(String),
    /// I/O error from the state file or another filesystem operation.
    Io(io::Error),
}

impl FacadeError {
    /// Whether this error signals "retry the whole operation", as
    /// opposed to a fatal or configuration error retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FacadeError::Retry(_))
    }
}

impl fmt::Display for FacadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacadeError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            FacadeError::NotStarted => write!(f, "facade has not been started"),
            FacadeError::AlreadyStarted => write!(f, "facade is already started"),
            FacadeError::StateFileCorrupt(msg) => write!(f, "state file corrupt: {}", msg),
            FacadeError::Retry(msg) => write!(f, "retry: {}", msg),
            FacadeError::Fatal(msg) => write!(f, "fatal: {}", msg),
            FacadeError::Backend(msg) => write!(f, "backend error: {}", msg),
            FacadeError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FacadeError {}

impl From<io::Error> for FacadeError {
    fn from(e: io::Error) -> Self {
        FacadeError::Io(e)
    }
}

/// Result type alias for facade operations.
pub type Result<T> = std::result::Result<T, FacadeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_is_retryable() {
        assert!(FacadeError::Retry("x".into()).is_retryable());
    }

    #[test]
    fn others_are_not_retryable() {
        assert!(!FacadeError::Fatal("x".into()).is_retryable());
        assert!(!FacadeError::NotStarted.is_retryable());
        assert!(!FacadeError::Configuration("x".into()).is_retryable());
    }

    #[test]
    fn display_io_passes_through() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "nope");
        let err = FacadeError::from(io_err);
        assert_eq!(err.to_string(), "nope");
    }
}
