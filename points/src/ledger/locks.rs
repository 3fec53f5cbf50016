//! # Wallet Locks
//!
//! The engine serializes operations per wallet: two operations touching
//! disjoint wallets run concurrently, two touching the same wallet run one
//! after the other. Locks are acquired in sorted id order so that
//! concurrent multi-wallet operations cannot deadlock.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Registry of per-wallet mutexes, created on first use.
#[derive(Default)]
pub struct WalletLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the locks for every id in `ids`.
    ///
    /// Ids are sorted and deduplicated before acquisition, so callers may
    /// pass them in any order.
    pub fn with_locked<T>(&self, ids: &[&str], f: impl FnOnce() -> T) -> T {
        let mut sorted: Vec<&str> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = sorted
            .iter()
            .map(|id| {
                self.locks
                    .entry(id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            })
            .collect();

        let _guards: Vec<_> = mutexes.iter().map(|m| m.lock()).collect();
        f()
    }
}
