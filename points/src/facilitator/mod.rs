//! # x402 Facilitator
//!
//! Implements the verify/settle/supported protocol that lets third-party
//! resource servers gate access behind paid requests without touching the
//! ledger themselves:
//!
//! ```text
//! payload.rs — wire types (PaymentPayload, PaymentRequirements) and the
//!              base64 X-PAYMENT header codec
//! handler.rs — the Facilitator itself: verify, settle, supported
//! worker.rs  — deferred settlement with a bounded retry budget
//! ```
//!
//! Verify is pure: it classifies a payment as acceptable or not without
//! mutating anything. Settle re-verifies and then drives the mutation
//! through the ledger engine, using the payment's transaction id as the
//! idempotency key, so resubmitting a settle never double-charges.

pub mod handler;
pub mod payload;
pub mod worker;

pub use handler::{
    Facilitator, PendingTxPolicy, SettleOutcome, SupportedKind, SupportedResponse, VerifyOutcome,
};
pub use payload::{PaymentPayload, PaymentRequirements, PayloadError};
pub use worker::{SettlementJob, SettlementOutcome, SettlementQueue, SettlementWorker};
