//! # Verify / Settle / Supported
//!
//! The [`Facilitator`] answers the three x402 questions:
//!
//! - **verify** — would this payment succeed? Pure read-only validation.
//! - **settle** — execute it, exactly once, keyed by the payment's tx id.
//! - **supported** — which schemes does this facilitator speak?
//!
//! Business rejections come back as `Ok` outcomes carrying a reason string
//! (the HTTP layer maps them to 402); an `Err` from these methods always
//! means the store itself failed (500).

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::payload::{PaymentPayload, PaymentRequirements};
use crate::config;
use crate::directory::{AgentDirectory, AlwaysEligible, OpenDirectory, ReputationOracle};
use crate::ledger::{
    IdempotencyRecord, LedgerEngine, LedgerError, Operation, Receipt,
};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a verify call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    pub payer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
}

impl VerifyOutcome {
    fn valid(payload: &PaymentPayload, amount: u64) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: payload.from.clone(),
            amount: Some(amount),
            tx_id: Some(payload.tx_id.clone()),
        }
    }

    fn invalid(payload: &PaymentPayload, reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            payer: payload.from.clone(),
            amount: None,
            tx_id: Some(payload.tx_id.clone()),
        }
    }
}

/// Result of a settle call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl SettleOutcome {
    fn rejected(payload: &PaymentPayload, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_id: Some(payload.tx_id.clone()),
            amount: None,
            from: None,
            to: None,
            timestamp: None,
            receipt: None,
            error_reason: Some(reason.into()),
        }
    }
}

/// One entry in the supported-schemes descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedKind {
    pub scheme: String,
    pub network: String,
    pub asset: String,
    pub extra: serde_json::Value,
}

/// Response of the supported call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedKind>,
}

// ---------------------------------------------------------------------------
// Pending-Transaction Policy
// ---------------------------------------------------------------------------

/// What verify reports when the payment's tx id has a reservation in
/// flight but no terminal outcome yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingTxPolicy {
    /// Report the payment invalid outright.
    #[default]
    Reject,
    /// Report it invalid with a reason that tells the caller to poll
    /// again shortly.
    Retryable,
}

// ---------------------------------------------------------------------------
// Facilitator
// ---------------------------------------------------------------------------

/// The x402 protocol handler, bound to a ledger engine and the identity
/// collaborators.
pub struct Facilitator {
    engine: Arc<LedgerEngine>,
    directory: Arc<dyn AgentDirectory>,
    oracle: Arc<dyn ReputationOracle>,
    pending_policy: PendingTxPolicy,
}

impl Facilitator {
    /// Builds a facilitator with open directory and always-eligible
    /// oracle defaults.
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self {
            engine,
            directory: Arc::new(OpenDirectory),
            oracle: Arc::new(AlwaysEligible),
            pending_policy: PendingTxPolicy::default(),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn AgentDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ReputationOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_pending_policy(mut self, policy: PendingTxPolicy) -> Self {
        self.pending_policy = policy;
        self
    }

    pub fn engine(&self) -> &Arc<LedgerEngine> {
        &self.engine
    }

    // -- verify --------------------------------------------------------------

    /// Read-only validation of a payment against requirements.
    ///
    /// An already-settled tx id verifies as valid without re-checking the
    /// balance: the money has moved, a replayed settle will return the
    /// stored receipt.
    pub fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyOutcome, LedgerError> {
        if payload.scheme != config::PAYMENT_SCHEME
            || requirements.scheme != config::PAYMENT_SCHEME
        {
            return Ok(VerifyOutcome::invalid(payload, "unsupported scheme"));
        }
        if payload.network != config::PAYMENT_NETWORK
            || requirements.network != config::PAYMENT_NETWORK
        {
            return Ok(VerifyOutcome::invalid(payload, "unsupported network"));
        }
        if payload.pay_to != requirements.pay_to {
            return Ok(VerifyOutcome::invalid(
                payload,
                "recipient does not match requirements",
            ));
        }

        let amount = match payload.parsed_amount() {
            Ok(a) if a > 0 => a,
            _ => return Ok(VerifyOutcome::invalid(payload, "unparseable amount")),
        };
        let required = match requirements.parsed_amount() {
            Ok(r) => r,
            Err(_) => {
                return Ok(VerifyOutcome::invalid(
                    payload,
                    "unparseable required amount",
                ))
            }
        };
        if amount < required {
            return Ok(VerifyOutcome::invalid(
                payload,
                format!("amount {} below required {}", amount, required),
            ));
        }

        // Prior-transaction lookup: the tx id IS the idempotency key.
        match self.engine.idempotency_state(&payload.tx_id)? {
            Some(IdempotencyRecord::Terminal { .. }) => {
                return Ok(VerifyOutcome::valid(payload, amount));
            }
            Some(IdempotencyRecord::Reserved { .. }) => {
                let reason = match self.pending_policy {
                    PendingTxPolicy::Reject => "transaction already in flight",
                    PendingTxPolicy::Retryable => {
                        "transaction in flight; retry after it resolves"
                    }
                };
                return Ok(VerifyOutcome::invalid(payload, reason));
            }
            None => {}
        }

        if !self.oracle.is_eligible(&payload.from) {
            return Ok(VerifyOutcome::invalid(payload, "payer not eligible"));
        }

        let payer = match self.engine.get_wallet(&payload.from)? {
            Some(w) => w,
            None => return Ok(VerifyOutcome::invalid(payload, "payer wallet not found")),
        };
        if !payer.is_active() {
            return Ok(VerifyOutcome::invalid(payload, "payer wallet not active"));
        }
        if !payer.limits.allow_overdraft && payer.balance() < amount as i64 {
            return Ok(VerifyOutcome::invalid(payload, "insufficient balance"));
        }

        match self.engine.get_wallet(&payload.pay_to)? {
            Some(w) if w.is_active() => {}
            Some(_) => {
                return Ok(VerifyOutcome::invalid(
                    payload,
                    "recipient wallet not active",
                ))
            }
            None => {
                return Ok(VerifyOutcome::invalid(
                    payload,
                    "recipient wallet not found",
                ))
            }
        }

        Ok(VerifyOutcome::valid(payload, amount))
    }

    // -- settle --------------------------------------------------------------

    /// Executes the payment through the ledger engine, exactly once per
    /// tx id. Resubmitting a settled payment returns the original receipt.
    pub fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleOutcome, LedgerError> {
        let verdict = self.verify(payload, requirements)?;
        if !verdict.is_valid {
            warn!(
                tx = %payload.tx_id,
                reason = verdict.invalid_reason.as_deref().unwrap_or("unknown"),
                "settlement refused at verification"
            );
            return Ok(SettleOutcome::rejected(
                payload,
                verdict
                    .invalid_reason
                    .unwrap_or_else(|| "verification failed".to_string()),
            ));
        }

        let amount = verdict.amount.unwrap_or_default();
        let op = Operation::transfer(
            &payload.from,
            &payload.pay_to,
            amount,
            config::REASON_X402_SETTLEMENT,
            &payload.tx_id,
        )
        .with_actor(&payload.from);

        match self.engine.apply(&op) {
            Ok(applied) => {
                info!(
                    tx = %payload.tx_id,
                    ledger_tx = %applied.transaction.id,
                    amount,
                    replayed = applied.replayed,
                    "settlement complete"
                );
                Ok(SettleOutcome {
                    success: true,
                    tx_id: Some(payload.tx_id.clone()),
                    amount: Some(amount),
                    from: Some(payload.from.clone()),
                    to: Some(payload.pay_to.clone()),
                    timestamp: Some(applied.transaction.created_at.timestamp_millis()),
                    receipt: Some(applied.receipt),
                    error_reason: None,
                })
            }
            // Store faults bubble up (the HTTP layer answers 500);
            // everything else is a business rejection with a reason.
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => Ok(SettleOutcome::rejected(payload, e.to_string())),
        }
    }

    // -- supported -----------------------------------------------------------

    /// Static capability descriptor.
    pub fn supported(&self) -> SupportedResponse {
        SupportedResponse {
            kinds: vec![SupportedKind {
                scheme: config::PAYMENT_SCHEME.to_string(),
                network: config::PAYMENT_NETWORK.to_string(),
                asset: config::ASSET_CODE.to_string(),
                extra: json!({
                    "x402Version": config::X402_VERSION,
                    "maxTimeoutSeconds": config::DEFAULT_PAYMENT_TIMEOUT_SECS,
                    "generatedAt": Utc::now().timestamp_millis(),
                }),
            }],
        }
    }

    /// Resolves the payer against the directory, for enriched audit logs.
    pub fn resolve_payer(&self, did: &str) -> Option<crate::directory::AgentRecord> {
        self.directory.resolve(did)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PointsStore;
    use crate::wallet::WalletLimits;

    fn facilitator() -> Facilitator {
        let engine = Arc::new(LedgerEngine::new(Arc::new(
            PointsStore::open_temporary().unwrap(),
        )));
        Facilitator::new(engine)
    }

    fn funded(f: &Facilitator, id: &str, amount: u64) {
        f.engine()
            .register_wallet(id, &format!("{}-owner", id), WalletLimits::default())
            .unwrap();
        if amount > 0 {
            f.engine()
                .apply(&Operation::mint(id, amount, "seed", &format!("seed-{}", id)))
                .unwrap();
        }
    }

    fn payment(f: &Facilitator, amount: u64) -> (PaymentPayload, PaymentRequirements) {
        funded(f, "did:nanda:payer", 1000);
        funded(f, "did:nanda:payee", 0);
        let payload = PaymentPayload::new("did:nanda:payer", "did:nanda:payee", amount);
        let reqs =
            PaymentRequirements::for_resource("did:nanda:payee", amount, "/report", "a report");
        (payload, reqs)
    }

    #[test]
    fn valid_payment_verifies() {
        let f = facilitator();
        let (payload, reqs) = payment(&f, 100);
        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(verdict.is_valid, "{:?}", verdict.invalid_reason);
        assert_eq!(verdict.payer, "did:nanda:payer");
        assert_eq!(verdict.amount, Some(100));
    }

    #[test]
    fn wrong_scheme_rejected() {
        let f = facilitator();
        let (mut payload, reqs) = payment(&f, 100);
        payload.scheme = "lightning".to_string();
        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.invalid_reason.as_deref(), Some("unsupported scheme"));
    }

    #[test]
    fn recipient_mismatch_rejected() {
        let f = facilitator();
        let (mut payload, reqs) = payment(&f, 100);
        payload.pay_to = "did:nanda:mallory".to_string();
        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(!verdict.is_valid);
    }

    #[test]
    fn underpayment_rejected() {
        let f = facilitator();
        funded(&f, "did:nanda:payer", 1000);
        funded(&f, "did:nanda:payee", 0);
        let payload = PaymentPayload::new("did:nanda:payer", "did:nanda:payee", 50);
        let reqs =
            PaymentRequirements::for_resource("did:nanda:payee", 100, "/report", "a report");
        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(!verdict.is_valid);
        assert!(verdict.invalid_reason.unwrap().contains("below required"));
    }

    #[test]
    fn insufficient_balance_rejected() {
        let f = facilitator();
        funded(&f, "did:nanda:payer", 10);
        funded(&f, "did:nanda:payee", 0);
        let payload = PaymentPayload::new("did:nanda:payer", "did:nanda:payee", 100);
        let reqs =
            PaymentRequirements::for_resource("did:nanda:payee", 100, "/report", "a report");
        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(
            verdict.invalid_reason.as_deref(),
            Some("insufficient balance")
        );
    }

    #[test]
    fn settle_moves_funds_once() {
        let f = facilitator();
        let (payload, reqs) = payment(&f, 100);

        let first = f.settle(&payload, &reqs).unwrap();
        assert!(first.success);
        let receipt = first.receipt.unwrap();
        assert_eq!(receipt.source_balance_after, Some(900));
        assert_eq!(receipt.destination_balance_after, Some(100));

        // Scenario B — identical resubmission: same receipt, no re-charge.
        let second = f.settle(&payload, &reqs).unwrap();
        assert!(second.success);
        assert_eq!(
            second.receipt.unwrap().transaction_id,
            receipt.transaction_id
        );
        assert_eq!(
            f.engine()
                .get_wallet("did:nanda:payer")
                .unwrap()
                .unwrap()
                .balance(),
            900
        );
    }

    #[test]
    fn settled_tx_id_verifies_valid_even_after_balance_drained() {
        let f = facilitator();
        let (payload, reqs) = payment(&f, 100);
        f.settle(&payload, &reqs).unwrap();

        // Drain the payer entirely.
        f.engine()
            .apply(&Operation::burn("did:nanda:payer", 900, "drain", "drain-1"))
            .unwrap();

        // Verify remains valid: the money for this tx id already moved.
        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(verdict.is_valid);
    }

    #[test]
    fn pending_reservation_reported_per_policy() {
        let f = facilitator();
        let (payload, reqs) = payment(&f, 100);

        // Simulate an in-flight attempt by reserving the tx id directly.
        let guard = crate::ledger::IdempotencyGuard::new(f.engine().store().clone());
        guard.reserve(&payload.tx_id, "some-other-attempt").unwrap();

        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(
            verdict.invalid_reason.as_deref(),
            Some("transaction already in flight")
        );

        let retryable = facilitator().with_pending_policy(PendingTxPolicy::Retryable);
        assert_eq!(retryable.pending_policy, PendingTxPolicy::Retryable);
    }

    #[test]
    fn oracle_rejection_blocks_payment() {
        struct Blocklist;
        impl ReputationOracle for Blocklist {
            fn is_eligible(&self, did: &str) -> bool {
                did != "did:nanda:payer"
            }
        }

        let f = facilitator().with_oracle(Arc::new(Blocklist));
        let (payload, reqs) = payment(&f, 100);
        let verdict = f.verify(&payload, &reqs).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.invalid_reason.as_deref(), Some("payer not eligible"));
    }

    #[test]
    fn supported_advertises_the_scheme() {
        let f = facilitator();
        let supported = f.supported();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.kinds[0].scheme, "nanda-points");
        assert_eq!(supported.kinds[0].asset, "NP");
    }
}
