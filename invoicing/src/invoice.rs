//! # Invoice State Machine
//!
//! An invoice moves through a strict lifecycle:
//!
//! ```text
//! draft ──issue──▶ issued ──pay (cumulative ≥ amount)──▶ paid
//!   │                │ ├──cancel──▶ cancelled
//!   └──cancel──▶ cancelled
//!                    └──past due date──▶ expired
//! ```
//!
//! `paid`, `cancelled`, and `expired` are terminal. Transitions are
//! monotonic: there is no path back to `draft` and no way to reopen a
//! terminal invoice. The state machine validates amounts against the
//! payment terms; actually moving points is the ledger engine's job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use nanda_points::ledger::LedgerError;
use nanda_points::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during invoice operations.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// The invoice is not in a state that allows this operation.
    #[error("invalid state transition: invoice is {current}, expected {expected}")]
    InvalidState {
        /// The invoice's current status.
        current: String,
        /// The status required for this operation.
        expected: String,
    },

    /// The invoice is past its due date.
    #[error("invoice expired: due {due}")]
    Expired {
        /// The due date that passed.
        due: DateTime<Utc>,
    },

    /// The payment amount violates the invoice's terms.
    #[error("amount out of range: {reason}")]
    AmountOutOfRange {
        /// Why the amount was refused.
        reason: String,
    },

    /// No invoice with the given id exists.
    #[error("invoice not found: {0}")]
    NotFound(String),

    /// The ledger refused or failed the underlying transfer.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The persistent store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The current status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Being drafted; not yet payable.
    Draft,
    /// Issued to the recipient and open for payment.
    Issued,
    /// Fully paid. Terminal.
    Paid,
    /// Withdrawn by the issuer. Terminal.
    Cancelled,
    /// Passed its due date unpaid. Terminal.
    Expired,
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Draft => write!(f, "draft"),
            InvoiceStatus::Issued => write!(f, "issued"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Cancelled => write!(f, "cancelled"),
            InvoiceStatus::Expired => write!(f, "expired"),
        }
    }
}

/// The invoiced amount with its display parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceAmount {
    /// Value in minor units.
    pub value: u64,
    pub currency: String,
    pub scale: u32,
}

impl InvoiceAmount {
    pub fn np(value: u64) -> Self {
        Self {
            value,
            currency: nanda_points::config::DEFAULT_CURRENCY.to_string(),
            scale: nanda_points::config::DEFAULT_SCALE,
        }
    }
}

/// Terms governing how an invoice may be paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTerms {
    /// Payments after this instant fail with [`InvoiceError::Expired`].
    pub due_date: Option<DateTime<Utc>>,
    /// Whether installments below the full amount are accepted.
    pub accept_partial: bool,
    /// Smallest acceptable installment, when partial payment is on.
    pub min_amount: Option<u64>,
    /// Largest acceptable installment.
    pub max_amount: Option<u64>,
    /// Whether cumulative payments may exceed the invoiced amount.
    pub allow_overpayment: bool,
}

impl Default for PaymentTerms {
    fn default() -> Self {
        Self {
            due_date: None,
            accept_partial: false,
            min_amount: None,
            max_amount: None,
            allow_overpayment: false,
        }
    }
}

/// A ledger transaction applied against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedPayment {
    /// Ledger transaction id that moved the points.
    pub transaction_id: String,
    pub amount: u64,
    /// The paying wallet.
    pub wallet_id: String,
    pub paid_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Invoice
// ---------------------------------------------------------------------------

/// A payment request with lifecycle state and an applied-payment trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    /// Human-readable invoice number.
    pub number: String,
    pub status: InvoiceStatus,
    pub amount: InvoiceAmount,
    pub issuer_did: String,
    /// Wallet that invoice payments credit.
    pub issuer_wallet: String,
    pub recipient_did: String,
    /// The wallet expected to pay, when known up front.
    pub recipient_wallet: Option<String>,
    pub terms: PaymentTerms,
    /// Ledger transactions applied against this invoice, in order.
    pub payments: Vec<AppliedPayment>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Creates a draft invoice.
    pub fn draft(
        issuer_did: &str,
        issuer_wallet: &str,
        recipient_did: &str,
        amount: InvoiceAmount,
        terms: PaymentTerms,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let number = format!("INV-{}", &id[..8]);
        let now = Utc::now();
        Self {
            id,
            number,
            status: InvoiceStatus::Draft,
            amount,
            issuer_did: issuer_did.to_string(),
            issuer_wallet: issuer_wallet.to_string(),
            recipient_did: recipient_did.to_string(),
            recipient_wallet: None,
            terms,
            payments: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            issued_at: None,
            paid_at: None,
            updated_at: now,
        }
    }

    /// Sum of all applied payments.
    pub fn total_applied(&self) -> u64 {
        self.payments
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.amount))
    }

    /// What remains to be paid. Zero once fully covered.
    pub fn outstanding(&self) -> u64 {
        self.amount.value.saturating_sub(self.total_applied())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Expired
        )
    }

    // -- Transitions ---------------------------------------------------------

    /// draft → issued.
    pub fn issue(&mut self, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        if self.status != InvoiceStatus::Draft {
            return Err(self.invalid_state("draft"));
        }
        self.status = InvoiceStatus::Issued;
        self.issued_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// draft or issued → cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        match self.status {
            InvoiceStatus::Draft | InvoiceStatus::Issued => {
                self.status = InvoiceStatus::Cancelled;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid_state("draft or issued")),
        }
    }

    /// issued → expired when past the due date. Returns whether the
    /// transition happened.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != InvoiceStatus::Issued {
            return false;
        }
        match self.terms.due_date {
            Some(due) if now > due => {
                self.status = InvoiceStatus::Expired;
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Validates a proposed installment against the terms. Read-only; the
    /// registry calls this before touching the ledger.
    pub fn validate_payment(&self, amount: u64, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        if self.status != InvoiceStatus::Issued {
            return Err(self.invalid_state("issued"));
        }
        if let Some(due) = self.terms.due_date {
            if now > due {
                return Err(InvoiceError::Expired { due });
            }
        }
        if amount == 0 {
            return Err(InvoiceError::AmountOutOfRange {
                reason: "amount must be positive".to_string(),
            });
        }

        let outstanding = self.outstanding();
        if !self.terms.accept_partial && amount < outstanding {
            return Err(InvoiceError::AmountOutOfRange {
                reason: format!(
                    "partial payment not accepted: {} of {} outstanding",
                    amount, outstanding
                ),
            });
        }
        if !self.terms.allow_overpayment && amount > outstanding {
            return Err(InvoiceError::AmountOutOfRange {
                reason: format!(
                    "overpayment not allowed: {} exceeds {} outstanding",
                    amount, outstanding
                ),
            });
        }
        if let Some(min) = self.terms.min_amount {
            // The closing installment may be smaller than the floor.
            if amount < min && amount < outstanding {
                return Err(InvoiceError::AmountOutOfRange {
                    reason: format!("below minimum installment {}", min),
                });
            }
        }
        if let Some(max) = self.terms.max_amount {
            if amount > max {
                return Err(InvoiceError::AmountOutOfRange {
                    reason: format!("above maximum installment {}", max),
                });
            }
        }
        Ok(())
    }

    /// Appends a settled payment and transitions to `paid` when the
    /// invoice is fully covered. Idempotent per transaction id: recording
    /// an already-applied ledger transaction is a no-op.
    pub fn record_payment(
        &mut self,
        transaction_id: &str,
        amount: u64,
        wallet_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InvoiceError> {
        if self.payments.iter().any(|p| p.transaction_id == transaction_id) {
            return Ok(());
        }
        if self.status != InvoiceStatus::Issued {
            return Err(self.invalid_state("issued"));
        }

        self.payments.push(AppliedPayment {
            transaction_id: transaction_id.to_string(),
            amount,
            wallet_id: wallet_id.to_string(),
            paid_at: now,
        });
        self.updated_at = now;

        if self.total_applied() >= self.amount.value {
            self.status = InvoiceStatus::Paid;
            self.paid_at = Some(now);
        }
        Ok(())
    }

    fn invalid_state(&self, expected: &str) -> InvoiceError {
        InvoiceError::InvalidState {
            current: self.status.to_string(),
            expected: expected.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
