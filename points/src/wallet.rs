//! # Wallet Records
//!
//! A [`Wallet`] is the durable record of one agent's NP holdings. It is a
//! plain data carrier: balance, status, spend limits, metadata. The one
//! hard rule in this module is that **nothing outside the ledger engine
//! mutates a balance** — the credit/debit helpers here are crate-private
//! and only reachable from [`crate::ledger::engine`].
//!
//! ## Amount Model
//!
//! Balances are `i64` minor units. A non-overdraft wallet never goes
//! negative (the engine enforces it); a wallet with `allow_overdraft` may,
//! which is why the representation is signed rather than `u64`.
//!
//! ## Persistence
//!
//! The whole struct derives `Serialize`/`Deserialize` and is stored in
//! sled as a single key-value pair (key = wallet id, value = bincode blob).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Status & Limits
// ---------------------------------------------------------------------------

/// Lifecycle status of a wallet.
///
/// Only `Active` wallets participate in ledger operations. `Suspended`
/// wallets are frozen by an operator or compliance process and may be
/// reactivated; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Active,
    Suspended,
    Closed,
}

impl std::fmt::Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletStatus::Active => write!(f, "active"),
            WalletStatus::Suspended => write!(f, "suspended"),
            WalletStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Optional spend controls attached to a wallet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletLimits {
    /// Maximum total debits allowed per UTC day. `None` means uncapped.
    pub daily_spend_cap: Option<u64>,
    /// When `true`, debits may drive the balance negative.
    pub allow_overdraft: bool,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// A single agent's NP wallet.
///
/// # Thread Safety
///
/// `Wallet` is a value type. Concurrent access is coordinated by the
/// ledger engine's per-wallet lock table and sled's per-key atomicity,
/// never by callers holding wallets in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet identifier. For agent wallets this is the agent's DID.
    pub id: String,
    /// DID of the agent that owns this wallet.
    pub owner_did: String,
    /// Balance in minor units. Negative only when overdraft is allowed.
    balance: i64,
    /// Currency code, e.g. "NP".
    pub currency: String,
    /// Decimal places for display purposes.
    pub scale: u32,
    /// Lifecycle status.
    pub status: WalletStatus,
    /// Optional spend controls.
    pub limits: WalletLimits,
    /// Total debited so far on `spent_on` (for the daily cap).
    spent_today: u64,
    /// The UTC day `spent_today` refers to.
    spent_on: NaiveDate,
    /// Application-layer metadata (display name, service URL, etc.).
    pub metadata: HashMap<String, String>,
    /// When this wallet was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent balance or status change.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates a new active wallet with a zero balance and default limits.
    ///
    /// The wallet id doubles as the agent identifier on the wire: the
    /// `from`/`payTo` fields of a payment payload name wallets directly.
    pub fn new(id: &str, owner_did: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            owner_did: owner_did.to_string(),
            balance: 0,
            currency: crate::config::DEFAULT_CURRENCY.to_string(),
            scale: crate::config::DEFAULT_SCALE,
            status: WalletStatus::Active,
            limits: WalletLimits::default(),
            spent_today: 0,
            spent_on: now.date_naive(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a wallet with explicit limits.
    pub fn with_limits(id: &str, owner_did: &str, limits: WalletLimits) -> Self {
        let mut w = Self::new(id, owner_did);
        w.limits = limits;
        w
    }

    /// Current balance in minor units.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// `true` if the wallet can participate in ledger operations.
    pub fn is_active(&self) -> bool {
        self.status == WalletStatus::Active
    }

    /// Amount debited so far today, after rolling the day over if needed.
    pub fn spent_today(&self, today: NaiveDate) -> u64 {
        if self.spent_on == today {
            self.spent_today
        } else {
            0
        }
    }

    /// Suspends the wallet. Incoming credits still land; debits are refused.
    pub fn suspend(&mut self, reason: &str) {
        self.status = WalletStatus::Suspended;
        self.metadata
            .insert("suspend_reason".to_string(), reason.to_string());
        self.updated_at = Utc::now();
    }

    /// Reactivates a suspended wallet. Closed wallets stay closed.
    pub fn reactivate(&mut self) {
        if self.status == WalletStatus::Suspended {
            self.status = WalletStatus::Active;
            self.metadata.remove("suspend_reason");
            self.updated_at = Utc::now();
        }
    }

    /// Closes the wallet permanently.
    pub fn close(&mut self) {
        self.status = WalletStatus::Closed;
        self.updated_at = Utc::now();
    }

    // -----------------------------------------------------------------------
    // Balance mutation — ledger engine only
    // -----------------------------------------------------------------------

    /// Credits `amount` minor units. Crate-private: only the ledger engine
    /// calls this, inside an atomic store transaction.
    pub(crate) fn credit(&mut self, amount: u64, now: DateTime<Utc>) -> Option<i64> {
        let delta = i64::try_from(amount).ok()?;
        self.balance = self.balance.checked_add(delta)?;
        self.updated_at = now;
        Some(self.balance)
    }

    /// Debits `amount` minor units and charges it against the daily cap.
    /// Returns `None` on arithmetic overflow; funds and cap checks are the
    /// engine's job, performed before this is called.
    pub(crate) fn debit(&mut self, amount: u64, now: DateTime<Utc>) -> Option<i64> {
        let delta = i64::try_from(amount).ok()?;
        self.balance = self.balance.checked_sub(delta)?;
        let today = now.date_naive();
        if self.spent_on != today {
            self.spent_on = today;
            self.spent_today = 0;
        }
        self.spent_today = self.spent_today.checked_add(amount)?;
        self.updated_at = now;
        Some(self.balance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_wallet_is_empty_and_active() {
        let w = Wallet::new("did:nanda:alice", "did:nanda:alice");
        assert_eq!(w.balance(), 0);
        assert!(w.is_active());
        assert_eq!(w.currency, "NP");
        assert!(w.limits.daily_spend_cap.is_none());
        assert!(!w.limits.allow_overdraft);
    }

    #[test]
    fn credit_and_debit_roundtrip() {
        let mut w = Wallet::new("did:nanda:alice", "did:nanda:alice");
        let now = Utc::now();
        assert_eq!(w.credit(5000, now), Some(5000));
        assert_eq!(w.debit(2000, now), Some(3000));
        assert_eq!(w.balance(), 3000);
    }

    #[test]
    fn debit_tracks_daily_spend() {
        let mut w = Wallet::new("did:nanda:alice", "did:nanda:alice");
        let now = Utc::now();
        w.credit(10_000, now);
        w.debit(400, now);
        w.debit(100, now);
        assert_eq!(w.spent_today(now.date_naive()), 500);

        // A different day reads as zero spent.
        let tomorrow = now.date_naive().succ_opt().unwrap();
        assert_eq!(w.spent_today(tomorrow), 0);
    }

    #[test]
    fn suspend_and_reactivate() {
        let mut w = Wallet::new("did:nanda:bob", "did:nanda:bob");
        w.suspend("compliance review");
        assert_eq!(w.status, WalletStatus::Suspended);
        assert!(w.metadata.contains_key("suspend_reason"));

        w.reactivate();
        assert!(w.is_active());
        assert!(!w.metadata.contains_key("suspend_reason"));
    }

    #[test]
    fn closed_wallet_stays_closed() {
        let mut w = Wallet::new("did:nanda:bob", "did:nanda:bob");
        w.close();
        w.reactivate();
        assert_eq!(w.status, WalletStatus::Closed);
    }

    #[test]
    fn wallet_serialization_roundtrip() {
        let mut w = Wallet::new("did:nanda:alice", "did:nanda:alice");
        w.credit(42_000, Utc::now());
        w.metadata
            .insert("display_name".to_string(), "Alice".to_string());

        let bytes = bincode::serialize(&w).expect("serialize");
        let recovered: Wallet = bincode::deserialize(&bytes).expect("deserialize");

        assert_eq!(recovered.id, "did:nanda:alice");
        assert_eq!(recovered.balance(), 42_000);
        assert_eq!(recovered.metadata.get("display_name").unwrap(), "Alice");
    }
}
