// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NANDA Points — Core Library
//!
//! The settlement core for NANDA Points (NP): a point-denominated currency
//! that autonomous agents hold in wallets and move through mint, burn, and
//! transfer operations. The library turns an externally supplied payment
//! intent into a durable, exactly-once balance mutation and exposes the
//! two-phase verify/settle contract consumed by the HTTP facilitator and
//! by the invoice workflow.
//!
//! ## Architecture
//!
//! The library is split into modules that mirror the actual concerns of a
//! settlement service:
//!
//! - **wallet** — Durable wallet records: balance, status, spend limits.
//! - **ledger** — The engine that applies mint/burn/transfer mutations as
//!   atomic state transitions, guarded against replay and double spend.
//! - **facilitator** — The x402-style verify/settle/supported protocol and
//!   its wire types.
//! - **directory** — Agent directory and reputation oracle seams, consumed
//!   as opaque collaborators.
//! - **store** — Persistent storage over sled.
//! - **config** — Protocol constants.
//!
//! ## Design Philosophy
//!
//! 1. Balances are integers in minor units. Floats near money are a bug.
//! 2. Only the ledger engine writes balances. Everyone else reads.
//! 3. Every operation carries an idempotency key; retries are always safe.
//! 4. If it touches money, it has tests. Plural.

pub mod config;
pub mod directory;
pub mod facilitator;
pub mod ledger;
pub mod store;
pub mod wallet;
