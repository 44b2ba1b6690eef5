//! Payment verification hook.
//!
//! Every hire asks a [`PaymentVerifier`] to approve the payment before any
//! funds are held. The default [`AcceptAllVerifier`] approves everything; a
//! settlement layer can plug in a real check.

use hire_core::Amount;
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// A payment awaiting approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Task being paid for.
    pub task_id: String,
    /// Party paying.
    pub payer: String,
    /// Party being paid.
    pub payee: String,
    /// Agreed price.
    pub amount: Amount,
}

/// Approves or rejects payments.
pub trait PaymentVerifier: Send + Sync {
    /// Returns `Err(MarketError::PaymentVerification)` to refuse the payment.
    fn verify(&self, request: &PaymentRequest) -> Result<(), MarketError>;
}

/// Approves every payment.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllVerifier;

impl PaymentVerifier for AcceptAllVerifier {
    fn verify(&self, _request: &PaymentRequest) -> Result<(), MarketError> {
        Ok(())
    }
}
