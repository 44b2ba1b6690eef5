//! Error types for hire-reputation.

use hire_persist::PersistError;
use thiserror::Error;

/// Errors surfaced by a [`ReputationBackend`](crate::storage::ReputationBackend).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached or refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Snapshot file could not be read or written.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Errors that can occur in reputation operations.
#[derive(Debug, Error)]
pub enum ReputationError {
    /// Feedback record failed validation.
    #[error("invalid feedback: {0}")]
    InvalidFeedback(String),

    /// Configuration value out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Storage failure that the caller asked to see.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ReputationError::InvalidFeedback("quality_score 1.5 outside [0, 1]".into());
        assert!(err.to_string().contains("quality_score 1.5"));

        let err = ReputationError::from(StorageError::Unavailable("disk full".into()));
        assert_eq!(err.to_string(), "storage unavailable: disk full");
    }
}
