//! Error types for hire-market.

use thiserror::Error;

/// Errors that can occur in marketplace operations.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Malformed hire request. Nothing was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Listing rejected at registration.
    #[error("invalid listing: {0}")]
    InvalidListing(String),

    /// Agent not in the catalog.
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Invalid escrow state transition.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// Payment verification hook refused the payment.
    #[error("payment verification failed: {0}")]
    PaymentVerification(String),

    /// Ledger hash chain does not verify.
    #[error("ledger integrity violated at sequence {sequence}")]
    LedgerIntegrity {
        /// First entry whose hash does not match.
        sequence: u64,
    },

    /// Configuration invalid or unreadable.
    #[error("config error: {0}")]
    Config(String),

    /// Amount could not be constructed.
    #[error(transparent)]
    Amount(#[from] hire_core::CoreError),

    /// Reputation layer error.
    #[error(transparent)]
    Reputation(#[from] hire_reputation::ReputationError),
}

/// Failure reported by the task execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task execution failed for {agent_id}: {reason}")]
pub struct ExecutionError {
    /// Agent that was executing the task.
    pub agent_id: String,
    /// What went wrong.
    pub reason: String,
}

impl ExecutionError {
    /// Creates an execution error.
    pub fn new(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = MarketError::Validation("budget must be positive".into());
        assert_eq!(err.to_string(), "validation failed: budget must be positive");

        let err = MarketError::InvalidStateTransition {
            from: "released".into(),
            to: "refunded".into(),
        };
        assert!(err.to_string().contains("released -> refunded"));

        let err = ExecutionError::new("agent-1", "timed out");
        assert_eq!(err.to_string(), "task execution failed for agent-1: timed out");
    }

    #[test]
    fn amount_errors_convert() {
        let err: MarketError = "abc".parse::<hire_core::Amount>().unwrap_err().into();
        assert!(matches!(err, MarketError::Amount(_)));
    }
}
