//! # PointsStore — Persistent Storage Engine
//!
//! The persistence layer for the NP ledger, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees", each an independent B+ tree
//! with its own keyspace:
//!
//! | Tree       | Key                 | Value                       |
//! |------------|---------------------|-----------------------------|
//! | `wallets`  | wallet id (UTF-8)   | `bincode(Wallet)`           |
//! | `ledger`   | `tx/<tx id>`        | `bincode(Transaction)`      |
//! |            | `idem/<key>`        | `bincode(IdempotencyRecord)`|
//! |            | `receipt/<tx id>`   | `bincode(Receipt)`          |
//! | `metadata` | key (UTF-8)         | value (bytes)               |
//!
//! Transactions, idempotency records, and receipts share the `ledger` tree
//! (with key prefixes) rather than living in trees of their own: a ledger
//! apply must commit a balance pair, a transaction record, an idempotency
//! terminal, and a receipt as one atomic unit, and sled transactions span
//! a fixed tuple of trees. Two trees — `wallets` plus `ledger` — cover it.
//!
//! ## Atomicity
//!
//! The ledger engine wraps its writes in a cross-tree sled transaction:
//! either every sub-write lands or none do. Everything else here is plain
//! per-key atomic access.

use sled::{Db, Tree};
use std::path::Path;

use crate::ledger::receipt::Receipt;
use crate::ledger::transaction::Transaction;
use crate::wallet::Wallet;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Key Prefixes
// ---------------------------------------------------------------------------

/// Builds the `ledger` tree key for a transaction record.
pub(crate) fn tx_key(tx_id: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(3 + tx_id.len());
    k.extend_from_slice(b"tx/");
    k.extend_from_slice(tx_id.as_bytes());
    k
}

/// Builds the `ledger` tree key for an idempotency record.
pub(crate) fn idem_key(key: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(5 + key.len());
    k.extend_from_slice(b"idem/");
    k.extend_from_slice(key.as_bytes());
    k
}

/// Builds the `ledger` tree key for a receipt.
pub(crate) fn receipt_key(tx_id: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(8 + tx_id.len());
    k.extend_from_slice(b"receipt/");
    k.extend_from_slice(tx_id.as_bytes());
    k
}

// ---------------------------------------------------------------------------
// Serialization Helpers
// ---------------------------------------------------------------------------

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// PointsStore
// ---------------------------------------------------------------------------

/// Persistent storage engine for wallets, transactions, receipts, and
/// idempotency records.
///
/// # Thread Safety
///
/// sled is inherently thread-safe — all trees support lock-free concurrent
/// reads and serialized per-key writes. `PointsStore` can be shared across
/// threads via `Arc<PointsStore>` without external synchronization; the
/// ledger engine adds its own per-wallet ordering on top.
#[derive(Debug, Clone)]
pub struct PointsStore {
    /// The underlying sled database handle.
    db: Db,
    /// Wallet records indexed by wallet id.
    pub(crate) wallets: Tree,
    /// Transactions, idempotency records, and receipts (prefixed keys).
    pub(crate) ledger: Tree,
    /// Arbitrary key-value metadata (settlement outcomes, bootstrap marks).
    metadata: Tree,
}

impl PointsStore {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that lives in memory and is cleaned up
    /// automatically when dropped. Ideal for unit tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let wallets = db.open_tree("wallets")?;
        let ledger = db.open_tree("ledger")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            wallets,
            ledger,
            metadata,
        })
    }

    /// Open a named sled tree from the underlying database.
    ///
    /// Used by higher-level components (e.g., the invoice store) that need
    /// dedicated key-value storage within the same database instance. The
    /// tree is created if it doesn't exist.
    pub fn open_tree(&self, name: &str) -> StoreResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    // -- Wallet operations ---------------------------------------------------

    /// Persist a wallet record, overwriting any previous version.
    pub fn put_wallet(&self, wallet: &Wallet) -> StoreResult<()> {
        let bytes = encode(wallet)?;
        self.wallets.insert(wallet.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Retrieve a wallet by id. Returns `None` for unknown wallets.
    pub fn get_wallet(&self, id: &str) -> StoreResult<Option<Wallet>> {
        match self.wallets.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of wallets in the store.
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    // -- Transaction operations ---------------------------------------------

    /// Retrieve a transaction by its id.
    pub fn get_transaction(&self, tx_id: &str) -> StoreResult<Option<Transaction>> {
        match self.ledger.get(tx_key(tx_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve a receipt by the transaction id it settles.
    pub fn get_receipt(&self, tx_id: &str) -> StoreResult<Option<Receipt>> {
        match self.ledger.get(receipt_key(tx_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Metadata operations ------------------------------------------------

    /// Store an arbitrary metadata value under the given key.
    pub fn put_metadata(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.metadata.insert(key.as_bytes(), value)?;
        Ok(())
    }

    /// Retrieve a metadata value.
    pub fn get_metadata(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    // -- Utility operations -------------------------------------------------

    /// Force a flush of all pending writes to disk.
    ///
    /// sled buffers writes in memory for performance. This call blocks
    /// until all data is durable on the underlying storage device.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_temporary_database() {
        let store = PointsStore::open_temporary().expect("temp store");
        assert_eq!(store.wallet_count(), 0);
    }

    #[test]
    fn open_persistent_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PointsStore::open(dir.path()).expect("open");
        store
            .put_wallet(&Wallet::new("did:nanda:alice", "did:nanda:alice"))
            .unwrap();
        store.flush().unwrap();
        drop(store);

        // Re-open to verify the data survived.
        let store2 = PointsStore::open(dir.path()).expect("reopen");
        assert_eq!(store2.wallet_count(), 1);
        assert!(store2.get_wallet("did:nanda:alice").unwrap().is_some());
    }

    #[test]
    fn wallet_crud() {
        let store = PointsStore::open_temporary().unwrap();
        assert!(store.get_wallet("did:nanda:alice").unwrap().is_none());

        let w = Wallet::new("did:nanda:alice", "did:nanda:alice");
        store.put_wallet(&w).unwrap();

        let got = store.get_wallet("did:nanda:alice").unwrap().unwrap();
        assert_eq!(got.id, "did:nanda:alice");
        assert_eq!(got.balance(), 0);
        assert_eq!(store.wallet_count(), 1);
    }

    #[test]
    fn missing_records_read_as_none() {
        let store = PointsStore::open_temporary().unwrap();
        assert!(store.get_transaction("nope").unwrap().is_none());
        assert!(store.get_receipt("nope").unwrap().is_none());
        assert!(store.get_metadata("nope").unwrap().is_none());
    }

    #[test]
    fn metadata_roundtrip() {
        let store = PointsStore::open_temporary().unwrap();
        store.put_metadata("bootstrap", b"done").unwrap();
        assert_eq!(store.get_metadata("bootstrap").unwrap().unwrap(), b"done");
    }

    #[test]
    fn key_prefixes_do_not_collide() {
        // "tx/abc" must never alias "idem/abc" or "receipt/abc".
        assert_ne!(tx_key("abc"), idem_key("abc"));
        assert_ne!(tx_key("abc"), receipt_key("abc"));
        assert_ne!(idem_key("abc"), receipt_key("abc"));
    }
}
