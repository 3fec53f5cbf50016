//! # Idempotency Guard
//!
//! Exactly-once semantics rest on a two-step key protocol: a key is first
//! *reserved* with the operation's fingerprint, and only marked *terminal*
//! in the same atomic batch that posts the transaction. A reservation left
//! behind by a crashed attempt is taken over on retry; a terminal record
//! short-circuits the retry into a replay of the stored result.
//!
//! Validation failures release the reservation instead of finalizing it:
//! only a posted transaction counts as "done", so a caller may fix the
//! problem and retry under the same key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use crate::store::{decode, encode, idem_key, PointsStore};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Durable state of an idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IdempotencyRecord {
    /// An attempt is (or was) in flight.
    Reserved {
        fingerprint: String,
        reserved_at: DateTime<Utc>,
    },
    /// The operation posted; `tx_id` locates the result to replay.
    Terminal {
        fingerprint: String,
        tx_id: String,
        committed_at: DateTime<Utc>,
    },
}

impl IdempotencyRecord {
    pub fn fingerprint(&self) -> &str {
        match self {
            IdempotencyRecord::Reserved { fingerprint, .. } => fingerprint,
            IdempotencyRecord::Terminal { fingerprint, .. } => fingerprint,
        }
    }
}

/// Outcome of [`IdempotencyGuard::reserve`].
#[derive(Debug)]
pub enum Reservation {
    /// The key is ours; proceed to apply the operation.
    Reserved,
    /// The key already posted a transaction with this id; replay it.
    AlreadyTerminal(String),
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Mediates idempotency-key state in the ledger tree.
pub struct IdempotencyGuard {
    store: Arc<PointsStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<PointsStore>) -> Self {
        Self { store }
    }

    /// Claims `key` for an operation with the given fingerprint.
    ///
    /// A leftover reservation with a matching fingerprint is taken over:
    /// the engine serializes attempts per wallet, so a live competitor
    /// cannot hold it, only a crashed one. A mismatched fingerprint in
    /// either state is a key-reuse conflict.
    pub fn reserve(&self, key: &str, fingerprint: &str) -> Result<Reservation, LedgerError> {
        let k = idem_key(key);
        loop {
            let current = self.store.ledger.get(&k).map_err(crate::store::StoreError::from)?;
            match current.as_deref().map(decode::<IdempotencyRecord>).transpose()? {
                None => {
                    let record = IdempotencyRecord::Reserved {
                        fingerprint: fingerprint.to_string(),
                        reserved_at: Utc::now(),
                    };
                    let swap = self
                        .store
                        .ledger
                        .compare_and_swap(&k, None as Option<&[u8]>, Some(encode(&record)?))
                        .map_err(crate::store::StoreError::from)?;
                    if swap.is_ok() {
                        return Ok(Reservation::Reserved);
                    }
                    // Lost the race; re-read and reclassify.
                }
                Some(IdempotencyRecord::Terminal {
                    fingerprint: fp,
                    tx_id,
                    ..
                }) => {
                    if fp == fingerprint {
                        return Ok(Reservation::AlreadyTerminal(tx_id));
                    }
                    return Err(LedgerError::DuplicateKeyConflict {
                        key: key.to_string(),
                    });
                }
                Some(IdempotencyRecord::Reserved { fingerprint: fp, .. }) => {
                    if fp != fingerprint {
                        return Err(LedgerError::DuplicateKeyConflict {
                            key: key.to_string(),
                        });
                    }
                    let record = IdempotencyRecord::Reserved {
                        fingerprint: fingerprint.to_string(),
                        reserved_at: Utc::now(),
                    };
                    let swap = self
                        .store
                        .ledger
                        .compare_and_swap(&k, current.as_deref(), Some(encode(&record)?))
                        .map_err(crate::store::StoreError::from)?;
                    if swap.is_ok() {
                        return Ok(Reservation::Reserved);
                    }
                }
            }
        }
    }

    /// Drops a reservation after a failed attempt, freeing the key for a
    /// corrected retry.
    pub fn release(&self, key: &str) -> Result<(), LedgerError> {
        self.store
            .ledger
            .remove(idem_key(key))
            .map_err(crate::store::StoreError::from)?;
        Ok(())
    }

    /// Reads the current record for a key, if any.
    pub fn lookup(&self, key: &str) -> Result<Option<IdempotencyRecord>, LedgerError> {
        let raw = self
            .store
            .ledger
            .get(idem_key(key))
            .map_err(crate::store::StoreError::from)?;
        Ok(raw.as_deref().map(decode).transpose()?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
