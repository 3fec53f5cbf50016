//! # Deferred Settlement Worker
//!
//! Resource servers often want to answer the client before the settlement
//! round-trip completes. Deferral must not mean silence: every enqueued
//! settlement either posts or leaves a durable failure record that a
//! reconciliation pass can find. The worker retries store faults up to a
//! bounded budget and records the final outcome under
//! `settlement/<txId>` in the metadata tree.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::handler::Facilitator;
use super::payload::{PaymentPayload, PaymentRequirements};
use crate::config;
use crate::store::StoreError;

// ---------------------------------------------------------------------------
// Job & Outcome
// ---------------------------------------------------------------------------

/// A settlement deferred past the HTTP response.
#[derive(Debug, Clone)]
pub struct SettlementJob {
    pub payload: PaymentPayload,
    pub requirements: PaymentRequirements,
}

/// The durable record of how a deferred settlement ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub tx_id: String,
    pub success: bool,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    pub finished_at: DateTime<Utc>,
}

fn outcome_key(tx_id: &str) -> String {
    format!("settlement/{}", tx_id)
}

// ---------------------------------------------------------------------------
// Queue Handle
// ---------------------------------------------------------------------------

/// Producer handle for enqueueing deferred settlements.
#[derive(Clone)]
pub struct SettlementQueue {
    tx: mpsc::Sender<SettlementJob>,
}

impl SettlementQueue {
    /// Enqueues a job, waiting when the queue is full. `Err` means the
    /// worker has shut down.
    pub async fn enqueue(&self, job: SettlementJob) -> Result<(), SettlementJob> {
        self.tx.send(job).await.map_err(|e| e.0)
    }

    /// Current free capacity, exported as a gauge by the server.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Background task draining the settlement queue.
pub struct SettlementWorker {
    handle: JoinHandle<()>,
}

impl SettlementWorker {
    /// Spawns the worker. Dropping every [`SettlementQueue`] clone drains
    /// the channel and lets the worker finish.
    pub fn spawn(facilitator: Arc<Facilitator>) -> (SettlementQueue, Self) {
        let (tx, mut rx) = mpsc::channel::<SettlementJob>(config::SETTLE_QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                run_job(&facilitator, job).await;
            }
            info!("settlement worker drained; shutting down");
        });

        (SettlementQueue { tx }, Self { handle })
    }

    /// Waits for the worker to finish draining.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn run_job(facilitator: &Facilitator, job: SettlementJob) {
    let tx_id = job.payload.tx_id.clone();
    let mut attempts = 0;
    let outcome = loop {
        attempts += 1;
        match facilitator.settle(&job.payload, &job.requirements) {
            Ok(settled) if settled.success => {
                break SettlementOutcome {
                    tx_id: tx_id.clone(),
                    success: true,
                    attempts,
                    error_reason: None,
                    finished_at: Utc::now(),
                };
            }
            Ok(rejected) => {
                // Business rejection: retrying the same payment cannot
                // change the verdict.
                break SettlementOutcome {
                    tx_id: tx_id.clone(),
                    success: false,
                    attempts,
                    error_reason: rejected.error_reason,
                    finished_at: Utc::now(),
                };
            }
            Err(e) if attempts < config::SETTLE_MAX_ATTEMPTS => {
                warn!(tx = %tx_id, attempt = attempts, error = %e, "deferred settlement failed; retrying");
                tokio::time::sleep(config::SETTLE_RETRY_DELAY).await;
            }
            Err(e) => {
                break SettlementOutcome {
                    tx_id: tx_id.clone(),
                    success: false,
                    attempts,
                    error_reason: Some(e.to_string()),
                    finished_at: Utc::now(),
                };
            }
        }
    };

    if outcome.success {
        info!(tx = %tx_id, attempts = outcome.attempts, "deferred settlement posted");
    } else {
        error!(
            tx = %tx_id,
            attempts = outcome.attempts,
            reason = outcome.error_reason.as_deref().unwrap_or("unknown"),
            "deferred settlement failed permanently"
        );
    }

    if let Err(e) = record_outcome(facilitator, &outcome) {
        error!(tx = %tx_id, error = %e, "failed to record settlement outcome");
    }
}

fn record_outcome(facilitator: &Facilitator, outcome: &SettlementOutcome) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(outcome)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    facilitator
        .engine()
        .store()
        .put_metadata(&outcome_key(&outcome.tx_id), &bytes)
}

/// Reads the recorded outcome for a tx id, if the worker has finished it.
pub fn load_outcome(
    facilitator: &Facilitator,
    tx_id: &str,
) -> Result<Option<SettlementOutcome>, StoreError> {
    match facilitator.engine().store().get_metadata(&outcome_key(tx_id))? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
