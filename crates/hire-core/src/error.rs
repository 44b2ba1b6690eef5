//! Error types for hire-core.

use thiserror::Error;

/// Errors that can occur when building core primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Invalid amount (overflow, negative, or malformed).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
