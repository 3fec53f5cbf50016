// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NANDA Points Invoicing
//!
//! The invoice workflow for the NP payment network. An invoice is a
//! payment request with a lifecycle: it is drafted, issued, and then paid
//! (possibly in installments), cancelled, or expired. Balance effects are
//! never executed here — the state machine delegates every movement of
//! points to the ledger engine and records the resulting transaction ids
//! against the invoice.
//!
//! - **invoice** — the invoice record and its state machine.
//! - **registry** — persistence and the pay/issue/cancel entry points
//!   wired to a ledger engine.
//!
//! ## Design Principles
//!
//! 1. Amount arithmetic never wraps: sums saturate and the ledger
//!    rejects anything that would overflow a balance.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Payment idempotency keys flow through untouched, so a retried
//!    `pay` call can never double-apply an installment.

pub mod invoice;
pub mod registry;

pub use invoice::{
    AppliedPayment, Invoice, InvoiceAmount, InvoiceError, InvoiceStatus, PaymentTerms,
};
pub use registry::InvoiceRegistry;
