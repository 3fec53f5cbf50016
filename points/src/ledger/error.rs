//! Error types for ledger operations.
//!
//! Every failure mode of [`LedgerEngine::apply`](super::engine::LedgerEngine)
//! is a variant here. The engine never retries on its own — retry policy
//! belongs to the caller, which is why each variant carries enough context
//! to decide whether retrying can possibly help.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while applying a ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The source wallet cannot cover the requested debit.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Amount the operation tried to debit.
        required: u64,
        /// Balance actually available.
        available: i64,
    },

    /// A referenced wallet does not exist.
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    /// Registration attempted with an id that is already taken.
    #[error("wallet already exists: {0}")]
    WalletExists(String),

    /// A referenced wallet is suspended and cannot transact.
    #[error("wallet suspended: {0}")]
    WalletSuspended(String),

    /// A referenced wallet is closed. Terminal; no reactivation.
    #[error("wallet closed: {0}")]
    WalletClosed(String),

    /// The amount is zero, negative after conversion, or arithmetically
    /// unrepresentable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The operation's shape is wrong for its kind (e.g., a transfer
    /// without a source, or source == destination).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The idempotency key was already used with a materially different
    /// payload. The original outcome stands; this request is refused.
    #[error("idempotency key reused with a different payload: {key}")]
    DuplicateKeyConflict {
        /// The conflicting key.
        key: String,
    },

    /// The debit would exceed the wallet's daily spend cap.
    #[error("daily spend cap exceeded: cap {cap}, attempted total {attempted}")]
    DailyCapExceeded {
        /// The configured cap.
        cap: u64,
        /// What the day's total would have been.
        attempted: u64,
    },

    /// An idempotency terminal points at a record that is not in the
    /// store. Indicates corruption; surfaced, never papered over.
    #[error("ledger state inconsistent: {0}")]
    Inconsistent(String),

    /// The persistent store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// `true` if retrying the same operation (same idempotency key) could
    /// succeed once the underlying condition clears. Validation failures
    /// are not retryable; store faults are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_retryable() {
        let err = LedgerError::Store(StoreError::Serialization("boom".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = LedgerError::InsufficientFunds {
            required: 100,
            available: 5,
        };
        assert!(!err.is_retryable());

        let err = LedgerError::DuplicateKeyConflict { key: "k".into() };
        assert!(!err.is_retryable());
    }
}
