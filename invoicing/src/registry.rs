//! # Invoice Registry
//!
//! Persistence and orchestration for invoices. The registry owns the
//! `invoices` tree in the shared points database and wires the state
//! machine to the ledger engine: `pay` validates against the invoice's
//! terms, drives the transfer through [`LedgerEngine::apply`], and records
//! the resulting transaction against the invoice.
//!
//! Invoice mutations serialize on per-invoice locks; the ledger engine
//! applies its own per-wallet ordering underneath.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use sled::Tree;
use tracing::info;

use nanda_points::config;
use nanda_points::ledger::{LedgerEngine, Operation};
use nanda_points::store::StoreError;

use crate::invoice::{Invoice, InvoiceAmount, InvoiceError, PaymentTerms};

/// Persistent invoice store bound to a ledger engine.
pub struct InvoiceRegistry {
    engine: Arc<LedgerEngine>,
    tree: Tree,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InvoiceRegistry {
    /// Opens the `invoices` tree in the engine's database.
    pub fn open(engine: Arc<LedgerEngine>) -> Result<Self, InvoiceError> {
        let tree = engine.store().open_tree("invoices")?;
        Ok(Self {
            engine,
            tree,
            locks: DashMap::new(),
        })
    }

    // -- CRUD ----------------------------------------------------------------

    /// Creates and persists a draft invoice.
    pub fn create(
        &self,
        issuer_did: &str,
        issuer_wallet: &str,
        recipient_did: &str,
        amount: InvoiceAmount,
        terms: PaymentTerms,
    ) -> Result<Invoice, InvoiceError> {
        let invoice = Invoice::draft(issuer_did, issuer_wallet, recipient_did, amount, terms);
        self.put(&invoice)?;
        info!(invoice = %invoice.id, number = %invoice.number, "invoice drafted");
        Ok(invoice)
    }

    /// Loads an invoice, applying lazy expiry: an issued invoice past its
    /// due date is transitioned and persisted before being returned.
    pub fn get(&self, id: &str) -> Result<Invoice, InvoiceError> {
        let mut invoice = self.load(id)?;
        if invoice.check_expiry(Utc::now()) {
            self.put(&invoice)?;
        }
        Ok(invoice)
    }

    // -- Transitions ---------------------------------------------------------

    /// Issues a draft invoice.
    pub fn issue(&self, id: &str) -> Result<Invoice, InvoiceError> {
        self.with_invoice(id, |invoice| invoice.issue(Utc::now()))
    }

    /// Cancels a draft or issued invoice.
    pub fn cancel(&self, id: &str) -> Result<Invoice, InvoiceError> {
        self.with_invoice(id, |invoice| invoice.cancel(Utc::now()))
    }

    /// Pays an invoice, fully or as one installment, from `wallet_id`.
    ///
    /// The caller's idempotency key flows straight into the ledger, so a
    /// retried `pay` replays the original transfer instead of charging
    /// again, and the replayed transaction id is not double-counted on
    /// the invoice.
    pub fn pay(
        &self,
        id: &str,
        wallet_id: &str,
        amount: u64,
        idempotency_key: &str,
    ) -> Result<Invoice, InvoiceError> {
        self.with_invoice(id, |invoice| {
            let now = Utc::now();
            if invoice.check_expiry(now) {
                return Err(InvoiceError::Expired {
                    due: invoice.terms.due_date.unwrap_or(now),
                });
            }
            invoice.validate_payment(amount, now)?;

            let op = Operation::transfer(
                wallet_id,
                &invoice.issuer_wallet,
                amount,
                config::REASON_INVOICE_PAYMENT,
                idempotency_key,
            )
            .with_actor(wallet_id)
            .with_invoice(&invoice.id);
            let applied = self.engine.apply(&op)?;

            invoice.record_payment(&applied.transaction.id, amount, wallet_id, now)?;
            if invoice.recipient_wallet.is_none() {
                invoice.recipient_wallet = Some(wallet_id.to_string());
            }
            info!(
                invoice = %invoice.id,
                tx = %applied.transaction.id,
                amount,
                status = %invoice.status,
                "invoice payment applied"
            );
            Ok(())
        })
    }

    // -- Internals -----------------------------------------------------------

    fn with_invoice(
        &self,
        id: &str,
        f: impl FnOnce(&mut Invoice) -> Result<(), InvoiceError>,
    ) -> Result<Invoice, InvoiceError> {
        let lock = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        let mut invoice = self.load(id)?;
        f(&mut invoice)?;
        self.put(&invoice)?;
        Ok(invoice)
    }

    fn load(&self, id: &str) -> Result<Invoice, InvoiceError> {
        let raw = self
            .tree
            .get(id.as_bytes())
            .map_err(StoreError::from)?
            .ok_or_else(|| InvoiceError::NotFound(id.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| StoreError::Serialization(e.to_string()).into())
    }

    fn put(&self, invoice: &Invoice) -> Result<(), InvoiceError> {
        let bytes = serde_json::to_vec(invoice)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.tree
            .insert(invoice.id.as_bytes(), bytes)
            .map_err(StoreError::from)?;
        Ok(())
    }
}
