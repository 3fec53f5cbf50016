//! # Transaction Records
//!
//! A [`Transaction`] is the durable record of an applied operation. Once
//! posted it is immutable; corrections happen through new reversal or
//! refund transactions, never by editing history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation::{Operation, OperationKind};

// ---------------------------------------------------------------------------
// Transaction Status
// ---------------------------------------------------------------------------

/// Lifecycle of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Accepted but not yet applied to balances.
    Pending,
    /// Applied to balances. Terminal.
    Posted,
    /// Rejected during application. Terminal.
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Posted => "posted",
            TransactionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Immutable record of a balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Ledger-assigned identifier.
    pub id: String,
    pub kind: OperationKind,
    pub amount: u64,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub reason: String,
    pub idempotency_key: String,
    pub actor: String,
    pub invoice_id: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Builds a posted transaction from a validated operation.
    pub fn posted(op: &Operation, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: op.kind,
            amount: op.amount,
            source: op.source.clone(),
            destination: op.destination.clone(),
            reason: op.reason.clone(),
            idempotency_key: op.idempotency_key.clone(),
            actor: op.actor.clone(),
            invoice_id: op.invoice_id.clone(),
            status: TransactionStatus::Posted,
            created_at: now,
        }
    }
}
