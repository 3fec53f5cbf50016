//! # Ledger Module — Balance Mutation & Double-Spend Prevention
//!
//! Everything that moves NP between wallets goes through this module. If
//! the facilitator is the front door, the ledger is the vault door — and
//! it only opens one way.
//!
//! ```text
//! operation.rs   — operation kinds, shape validation, payload fingerprint
//! transaction.rs — the durable transaction record
//! idempotency.rs — Unseen → Reserved → Terminal key guard
//! locks.rs       — per-wallet lock table (same-wallet ops serialize)
//! engine.rs      — the apply() pipeline: replay, validate, atomic commit
//! receipt.rs     — immutable settlement receipts
//! error.rs       — the failure taxonomy
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are integer minor units.** The protocol never divides.
//! 2. **Exactly-once.** An idempotency key maps to at most one terminal
//!    outcome; replays return the original result without re-mutating.
//! 3. **All-or-nothing.** Debit, credit, transaction record, idempotency
//!    terminal, and receipt commit in a single store transaction.

pub mod engine;
pub mod error;
pub mod idempotency;
pub mod locks;
pub mod operation;
pub mod receipt;
pub mod transaction;

pub use engine::{Applied, LedgerEngine};
pub use error::LedgerError;
pub use idempotency::{IdempotencyGuard, IdempotencyRecord, Reservation};
pub use operation::{Operation, OperationKind};
pub use receipt::Receipt;
pub use transaction::{Transaction, TransactionStatus};
