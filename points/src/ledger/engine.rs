//! # Ledger Engine
//!
//! [`LedgerEngine::apply`] is the only path that mutates balances. The
//! pipeline per operation:
//!
//! ```text
//! validate shape
//!   → lock the involved wallets (sorted order)
//!     → reserve the idempotency key   (terminal? replay stored result)
//!       → validate wallets & funds    (failure releases the key)
//!         → atomic commit: debit + credit + transaction + terminal + receipt
//! ```
//!
//! The commit is a single cross-tree sled transaction over the `wallets`
//! and `ledger` trees, so a crash leaves either the complete outcome or
//! no trace of the attempt beyond a takeover-able reservation.

use std::sync::Arc;

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use tracing::{debug, info};

use super::error::LedgerError;
use super::idempotency::{IdempotencyGuard, IdempotencyRecord, Reservation};
use super::locks::WalletLocks;
use super::operation::Operation;
use super::receipt::Receipt;
use super::transaction::Transaction;
use crate::store::{decode, encode, idem_key, receipt_key, tx_key, PointsStore, StoreError};
use crate::wallet::{Wallet, WalletLimits, WalletStatus};

// ---------------------------------------------------------------------------
// Applied
// ---------------------------------------------------------------------------

/// The outcome of a successful (or replayed) apply.
#[derive(Debug, Clone)]
pub struct Applied {
    pub transaction: Transaction,
    pub receipt: Receipt,
    /// `true` when this result was served from a prior terminal outcome
    /// rather than a fresh mutation.
    pub replayed: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Serializes, validates, and atomically applies ledger operations.
pub struct LedgerEngine {
    store: Arc<PointsStore>,
    guard: IdempotencyGuard,
    locks: WalletLocks,
}

impl LedgerEngine {
    pub fn new(store: Arc<PointsStore>) -> Self {
        Self {
            guard: IdempotencyGuard::new(store.clone()),
            locks: WalletLocks::new(),
            store,
        }
    }

    /// The underlying store, for read-side consumers.
    pub fn store(&self) -> &Arc<PointsStore> {
        &self.store
    }

    /// Current state of an idempotency key, for read-only inspection
    /// (the facilitator's prior-transaction lookup during verify).
    pub fn idempotency_state(
        &self,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, LedgerError> {
        self.guard.lookup(key)
    }

    // -- Wallet management ---------------------------------------------------

    /// Registers a wallet. Fails if the id is taken.
    pub fn register_wallet(
        &self,
        id: &str,
        owner_did: &str,
        limits: WalletLimits,
    ) -> Result<Wallet, LedgerError> {
        self.locks.with_locked(&[id], || {
            if self.store.get_wallet(id)?.is_some() {
                return Err(LedgerError::WalletExists(id.to_string()));
            }
            let wallet = Wallet::with_limits(id, owner_did, limits);
            self.store.put_wallet(&wallet)?;
            info!(wallet = %id, owner = %owner_did, "wallet registered");
            Ok(wallet)
        })
    }

    /// Looks up a wallet by id.
    pub fn get_wallet(&self, id: &str) -> Result<Option<Wallet>, LedgerError> {
        Ok(self.store.get_wallet(id)?)
    }

    /// Suspends a wallet. Pending retries against it will fail until it
    /// is reactivated.
    pub fn suspend_wallet(&self, id: &str, reason: &str) -> Result<Wallet, LedgerError> {
        self.mutate_wallet(id, |w| {
            w.suspend(reason);
            Ok(())
        })
    }

    /// Reactivates a suspended wallet. Closed wallets stay closed.
    pub fn reactivate_wallet(&self, id: &str) -> Result<Wallet, LedgerError> {
        self.mutate_wallet(id, |w| {
            if w.status == WalletStatus::Closed {
                return Err(LedgerError::WalletClosed(w.id.clone()));
            }
            w.reactivate();
            Ok(())
        })
    }

    /// Closes a wallet permanently.
    pub fn close_wallet(&self, id: &str) -> Result<Wallet, LedgerError> {
        self.mutate_wallet(id, |w| {
            w.close();
            Ok(())
        })
    }

    fn mutate_wallet(
        &self,
        id: &str,
        f: impl FnOnce(&mut Wallet) -> Result<(), LedgerError>,
    ) -> Result<Wallet, LedgerError> {
        self.locks.with_locked(&[id], || {
            let mut wallet = self
                .store
                .get_wallet(id)?
                .ok_or_else(|| LedgerError::WalletNotFound(id.to_string()))?;
            f(&mut wallet)?;
            wallet.updated_at = Utc::now();
            self.store.put_wallet(&wallet)?;
            Ok(wallet)
        })
    }

    // -- Apply ---------------------------------------------------------------

    /// Applies an operation with exactly-once semantics.
    ///
    /// A retry under the same idempotency key and payload returns the
    /// original transaction and receipt with `replayed = true`. The same
    /// key with a different payload is a [`LedgerError::DuplicateKeyConflict`].
    pub fn apply(&self, op: &Operation) -> Result<Applied, LedgerError> {
        op.validate()?;

        let ids: Vec<&str> = op
            .source
            .iter()
            .chain(op.destination.iter())
            .map(String::as_str)
            .collect();

        self.locks.with_locked(&ids, || self.apply_locked(op))
    }

    fn apply_locked(&self, op: &Operation) -> Result<Applied, LedgerError> {
        let key = &op.idempotency_key;
        let fingerprint = op.fingerprint();

        match self.guard.reserve(key, &fingerprint)? {
            Reservation::AlreadyTerminal(tx_id) => {
                debug!(key = %key, tx = %tx_id, "idempotent replay");
                return self.load_applied(&tx_id);
            }
            Reservation::Reserved => {}
        }

        // Failures from here on release the reservation so the caller can
        // correct the condition and retry under the same key.
        if let Err(e) = self.validate_wallets(op) {
            self.guard.release(key)?;
            return Err(e);
        }

        let now = Utc::now();
        let result = (&self.store.wallets, &self.store.ledger).transaction(
            |(wallets, ledger)| {
                let mut source_after = None;
                let mut destination_after = None;

                if let Some(id) = &op.source {
                    let raw = wallets.get(id.as_bytes())?.ok_or_else(|| {
                        abort(LedgerError::WalletNotFound(id.clone()))
                    })?;
                    let mut wallet: Wallet = decode(&raw).map_err(store_abort)?;
                    let after = wallet.debit(op.amount, now).ok_or_else(|| {
                        abort(LedgerError::InvalidAmount(format!(
                            "debit of {} overflows wallet {}",
                            op.amount, id
                        )))
                    })?;
                    wallets.insert(id.as_bytes(), encode(&wallet).map_err(store_abort)?)?;
                    source_after = Some(after);
                }

                if let Some(id) = &op.destination {
                    let raw = wallets.get(id.as_bytes())?.ok_or_else(|| {
                        abort(LedgerError::WalletNotFound(id.clone()))
                    })?;
                    let mut wallet: Wallet = decode(&raw).map_err(store_abort)?;
                    let after = wallet.credit(op.amount, now).ok_or_else(|| {
                        abort(LedgerError::InvalidAmount(format!(
                            "credit of {} overflows wallet {}",
                            op.amount, id
                        )))
                    })?;
                    wallets.insert(id.as_bytes(), encode(&wallet).map_err(store_abort)?)?;
                    destination_after = Some(after);
                }

                let tx = Transaction::posted(op, now);
                let receipt = Receipt::for_transaction(&tx, source_after, destination_after);
                let terminal = IdempotencyRecord::Terminal {
                    fingerprint: fingerprint.clone(),
                    tx_id: tx.id.clone(),
                    committed_at: now,
                };

                ledger.insert(tx_key(&tx.id), encode(&tx).map_err(store_abort)?)?;
                ledger.insert(
                    receipt_key(&tx.id),
                    encode(&receipt).map_err(store_abort)?,
                )?;
                ledger.insert(idem_key(key), encode(&terminal).map_err(store_abort)?)?;

                Ok((tx, receipt))
            },
        );

        match result {
            Ok((transaction, receipt)) => {
                self.store.flush()?;
                info!(
                    tx = %transaction.id,
                    kind = %transaction.kind,
                    amount = transaction.amount,
                    source = transaction.source.as_deref().unwrap_or("-"),
                    destination = transaction.destination.as_deref().unwrap_or("-"),
                    "transaction posted"
                );
                Ok(Applied {
                    transaction,
                    receipt,
                    replayed: false,
                })
            }
            Err(TransactionError::Abort(e)) => {
                self.guard.release(key)?;
                Err(e)
            }
            Err(TransactionError::Storage(e)) => Err(LedgerError::Store(StoreError::from(e))),
        }
    }

    /// Pre-commit wallet checks. Runs under the wallet locks, so nothing
    /// can change between here and the commit.
    fn validate_wallets(&self, op: &Operation) -> Result<(), LedgerError> {
        let today = Utc::now().date_naive();

        if let Some(id) = &op.source {
            let wallet = self
                .store
                .get_wallet(id)?
                .ok_or_else(|| LedgerError::WalletNotFound(id.clone()))?;
            check_active(&wallet)?;

            let required = op.amount as i64;
            if !wallet.limits.allow_overdraft && wallet.balance() < required {
                return Err(LedgerError::InsufficientFunds {
                    required: op.amount,
                    available: wallet.balance(),
                });
            }
            if let Some(cap) = wallet.limits.daily_spend_cap {
                let attempted = wallet.spent_today(today).saturating_add(op.amount);
                if attempted > cap {
                    return Err(LedgerError::DailyCapExceeded { cap, attempted });
                }
            }
        }

        if let Some(id) = &op.destination {
            let wallet = self
                .store
                .get_wallet(id)?
                .ok_or_else(|| LedgerError::WalletNotFound(id.clone()))?;
            check_active(&wallet)?;
        }

        Ok(())
    }

    /// Rehydrates a previously posted outcome for an idempotent replay.
    fn load_applied(&self, tx_id: &str) -> Result<Applied, LedgerError> {
        let transaction = self.store.get_transaction(tx_id)?.ok_or_else(|| {
            LedgerError::Inconsistent(format!(
                "idempotency terminal points at missing transaction {}",
                tx_id
            ))
        })?;
        let receipt = self.store.get_receipt(tx_id)?.ok_or_else(|| {
            LedgerError::Inconsistent(format!(
                "posted transaction {} has no receipt",
                tx_id
            ))
        })?;
        Ok(Applied {
            transaction,
            receipt,
            replayed: true,
        })
    }
}

fn check_active(wallet: &Wallet) -> Result<(), LedgerError> {
    match wallet.status {
        WalletStatus::Active => Ok(()),
        WalletStatus::Suspended => Err(LedgerError::WalletSuspended(wallet.id.clone())),
        WalletStatus::Closed => Err(LedgerError::WalletClosed(wallet.id.clone())),
    }
}

fn abort(e: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(e)
}

fn store_abort(e: StoreError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(LedgerError::Store(e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
