//! # Ledger Operations
//!
//! An [`Operation`] is the engine's input: what to do, how much, between
//! which wallets, under which idempotency key. Operations are validated
//! for shape before the engine touches any state, so every downstream
//! step can assume the source/destination combination is consistent with
//! the kind.

use serde::{Deserialize, Serialize};

use super::error::LedgerError;

// ---------------------------------------------------------------------------
// Operation Kind
// ---------------------------------------------------------------------------

/// The kind of balance mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Create points out of thin air into a destination wallet.
    Mint,
    /// Destroy points from a source wallet.
    Burn,
    /// Move points from a source to a destination wallet.
    Transfer,
    /// Debit leg of a two-phase payment: funds leave the source and are
    /// parked until captured or reversed.
    Hold,
    /// Credit leg completing a prior hold.
    Capture,
    /// Transfer in the reverse direction of an earlier payment.
    Refund,
    /// Administrative undo of an earlier transaction.
    Reversal,
}

impl OperationKind {
    /// `true` if this kind debits a source wallet.
    pub fn debits_source(&self) -> bool {
        !matches!(self, OperationKind::Mint | OperationKind::Capture)
    }

    /// `true` if this kind credits a destination wallet.
    pub fn credits_destination(&self) -> bool {
        !matches!(self, OperationKind::Burn | OperationKind::Hold)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Mint => "mint",
            OperationKind::Burn => "burn",
            OperationKind::Transfer => "transfer",
            OperationKind::Hold => "hold",
            OperationKind::Capture => "capture",
            OperationKind::Refund => "refund",
            OperationKind::Reversal => "reversal",
        };
        write!(f, "{}", s)
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A request for a single balance mutation.
///
/// The idempotency key is mandatory: it is the handle through which a
/// caller that lost a response can safely retry, and the handle through
/// which the facilitator maps external transaction ids onto exactly-once
/// semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// What to do.
    pub kind: OperationKind,
    /// Amount in minor units. Must be positive.
    pub amount: u64,
    /// Wallet to debit. Absent for mint/capture.
    pub source: Option<String>,
    /// Wallet to credit. Absent for burn/hold.
    pub destination: Option<String>,
    /// Free-form reason code, stamped on the transaction record.
    pub reason: String,
    /// Caller-supplied key guaranteeing at-most-once application.
    pub idempotency_key: String,
    /// Who asked for this: an agent DID or "system".
    pub actor: String,
    /// Optional link to the invoice this operation settles.
    pub invoice_id: Option<String>,
}

impl Operation {
    /// Builds a mint operation: points appear in `destination`.
    pub fn mint(destination: &str, amount: u64, reason: &str, idempotency_key: &str) -> Self {
        Self {
            kind: OperationKind::Mint,
            amount,
            source: None,
            destination: Some(destination.to_string()),
            reason: reason.to_string(),
            idempotency_key: idempotency_key.to_string(),
            actor: "system".to_string(),
            invoice_id: None,
        }
    }

    /// Builds a burn operation: points disappear from `source`.
    pub fn burn(source: &str, amount: u64, reason: &str, idempotency_key: &str) -> Self {
        Self {
            kind: OperationKind::Burn,
            amount,
            source: Some(source.to_string()),
            destination: None,
            reason: reason.to_string(),
            idempotency_key: idempotency_key.to_string(),
            actor: "system".to_string(),
            invoice_id: None,
        }
    }

    /// Builds a transfer operation: points move `source` → `destination`.
    pub fn transfer(
        source: &str,
        destination: &str,
        amount: u64,
        reason: &str,
        idempotency_key: &str,
    ) -> Self {
        Self {
            kind: OperationKind::Transfer,
            amount,
            source: Some(source.to_string()),
            destination: Some(destination.to_string()),
            reason: reason.to_string(),
            idempotency_key: idempotency_key.to_string(),
            actor: "system".to_string(),
            invoice_id: None,
        }
    }

    /// Sets the acting agent.
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    /// Links this operation to an invoice.
    pub fn with_invoice(mut self, invoice_id: &str) -> Self {
        self.invoice_id = Some(invoice_id.to_string());
        self
    }

    /// Validates shape: positive amount, non-empty key, and the right
    /// source/destination combination for the kind.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "amount must be positive".to_string(),
            ));
        }
        if i64::try_from(self.amount).is_err() {
            return Err(LedgerError::InvalidAmount(format!(
                "amount {} exceeds the representable range",
                self.amount
            )));
        }
        if self.idempotency_key.is_empty() {
            return Err(LedgerError::InvalidOperation(
                "idempotency key must not be empty".to_string(),
            ));
        }

        let needs_source = self.kind.debits_source();
        let needs_destination = self.kind.credits_destination();

        if needs_source && self.source.is_none() {
            return Err(LedgerError::InvalidOperation(format!(
                "{} requires a source wallet",
                self.kind
            )));
        }
        if !needs_source && self.source.is_some() {
            return Err(LedgerError::InvalidOperation(format!(
                "{} must not name a source wallet",
                self.kind
            )));
        }
        if needs_destination && self.destination.is_none() {
            return Err(LedgerError::InvalidOperation(format!(
                "{} requires a destination wallet",
                self.kind
            )));
        }
        if !needs_destination && self.destination.is_some() {
            return Err(LedgerError::InvalidOperation(format!(
                "{} must not name a destination wallet",
                self.kind
            )));
        }
        if needs_source && needs_destination && self.source == self.destination {
            return Err(LedgerError::InvalidOperation(
                "source and destination must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Canonical fingerprint of the material payload, used to detect an
    /// idempotency key being reused with a different operation. Actor and
    /// invoice link are deliberately excluded — they do not change what
    /// the operation does to balances.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.kind,
            self.amount,
            self.source.as_deref().unwrap_or("-"),
            self.destination.as_deref().unwrap_or("-"),
            self.reason,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
