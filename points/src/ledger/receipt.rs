//! # Receipts
//!
//! A [`Receipt`] is the proof artifact a caller gets back for a posted
//! transaction: who paid whom, how much, and the balances that resulted.
//! Receipts are written in the same atomic batch as the transaction, so
//! a receipt exists if and only if the transaction posted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transaction::Transaction;

/// Proof of a posted transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    /// The transaction this receipt attests to.
    pub transaction_id: String,
    /// Debited wallet, when the kind has one.
    pub from: Option<String>,
    /// Credited wallet, when the kind has one.
    pub to: Option<String>,
    pub amount: u64,
    pub reason: String,
    /// Source balance after application, for audit trails.
    pub source_balance_after: Option<i64>,
    /// Destination balance after application.
    pub destination_balance_after: Option<i64>,
    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    pub fn for_transaction(
        tx: &Transaction,
        source_balance_after: Option<i64>,
        destination_balance_after: Option<i64>,
    ) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            from: tx.source.clone(),
            to: tx.destination.clone(),
            amount: tx.amount,
            reason: tx.reason.clone(),
            source_balance_after,
            destination_balance_after,
            issued_at: tx.created_at,
        }
    }
}
