//! # Facilitator REST API
//!
//! Builds the axum router that exposes the facilitator's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                        |
//! |--------|-----------------------------|------------------------------------|
//! | GET    | `/health`                   | Liveness probe                     |
//! | GET    | `/status`                   | Service status summary             |
//! | GET    | `/supported`                | x402 capability descriptor         |
//! | POST   | `/verify`                   | Validate a payment (read-only)     |
//! | POST   | `/settle`                   | Execute a payment                  |
//! | POST   | `/settle/deferred`          | Queue a payment for settlement     |
//! | GET    | `/settlements/:tx_id`       | Deferred settlement outcome        |
//! | POST   | `/wallets`                  | Register a wallet                  |
//! | GET    | `/wallets/:id`              | Wallet by id                       |
//! | POST   | `/wallets/:id/suspend`      | Suspend a wallet                   |
//! | POST   | `/wallets/:id/reactivate`   | Reactivate a suspended wallet      |
//! | POST   | `/wallets/:id/close`        | Close a wallet permanently         |
//! | POST   | `/transactions`             | Apply a ledger operation           |
//! | GET    | `/transactions/:id`         | Transaction by ledger id           |
//! | GET    | `/receipts/:id`             | Receipt by transaction id          |
//! | POST   | `/invoices`                 | Draft an invoice                   |
//! | GET    | `/invoices/:id`             | Invoice by id                      |
//! | POST   | `/invoices/:id/issue`       | Issue a draft invoice              |
//! | POST   | `/invoices/:id/pay`         | Pay an invoice                     |
//! | POST   | `/invoices/:id/cancel`      | Cancel an invoice                  |
//!
//! ## HTTP Status Contract
//!
//! 200 on success; 402 when verification or settlement rejects the
//! payment (the response body carries the reason); 400 for malformed
//! requests; 404 for missing records; 409 for idempotency-key and state
//! conflicts; 500 only for internal store faults.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nanda_invoicing::{InvoiceAmount, InvoiceError, InvoiceRegistry, PaymentTerms};
use nanda_points::facilitator::worker::load_outcome;
use nanda_points::facilitator::{
    Facilitator, PaymentPayload, PaymentRequirements, SettlementJob, SettlementQueue,
};
use nanda_points::ledger::{LedgerError, Operation, OperationKind};
use nanda_points::wallet::WalletLimits;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc` or channel handles.
#[derive(Clone)]
pub struct AppState {
    /// The service's reported version string.
    pub version: String,
    /// Network identifier advertised in status responses.
    pub network: String,
    /// The x402 protocol handler (owns the ledger engine).
    pub facilitator: Arc<Facilitator>,
    /// Invoice persistence and workflow.
    pub invoices: Arc<InvoiceRegistry>,
    /// Producer handle for deferred settlements.
    pub settle_queue: SettlementQueue,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/supported", get(supported_handler))
        .route("/verify", post(verify_handler))
        .route("/settle", post(settle_handler))
        .route("/settle/deferred", post(settle_deferred_handler))
        .route("/settlements/:tx_id", get(settlement_outcome_handler))
        .route("/wallets", post(create_wallet_handler))
        .route("/wallets/:id", get(wallet_handler))
        .route("/wallets/:id/suspend", post(suspend_wallet_handler))
        .route("/wallets/:id/reactivate", post(reactivate_wallet_handler))
        .route("/wallets/:id/close", post(close_wallet_handler))
        .route("/transactions", post(apply_transaction_handler))
        .route("/transactions/:id", get(transaction_handler))
        .route("/receipts/:id", get(receipt_handler))
        .route("/invoices", post(create_invoice_handler))
        .route("/invoices/:id", get(invoice_handler))
        .route("/invoices/:id/issue", post(issue_invoice_handler))
        .route("/invoices/:id/pay", post(pay_invoice_handler))
        .route("/invoices/:id/cancel", post(cancel_invoice_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Generic error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of `/status`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub network: String,
    pub wallet_count: usize,
}

/// Body of `/verify` and `/settle`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

/// Body of `POST /wallets`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    pub id: String,
    pub owner_did: String,
    #[serde(default)]
    pub daily_spend_cap: Option<u64>,
    #[serde(default)]
    pub allow_overdraft: bool,
}

/// Optional body of wallet suspension.
#[derive(Debug, Default, Deserialize)]
pub struct SuspendRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of `POST /transactions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub kind: OperationKind,
    pub amount: u64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    pub reason: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
}

/// Body of `POST /invoices`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub issuer_did: String,
    pub issuer_wallet: String,
    pub recipient_did: String,
    /// Invoiced amount in minor units.
    pub amount: u64,
    #[serde(default)]
    pub terms: Option<TermsBody>,
}

/// Payment terms as accepted on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TermsBody {
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    pub accept_partial: bool,
    pub min_amount: Option<u64>,
    pub max_amount: Option<u64>,
    pub allow_overpayment: bool,
}

impl From<TermsBody> for PaymentTerms {
    fn from(body: TermsBody) -> Self {
        PaymentTerms {
            due_date: body.due_date,
            accept_partial: body.accept_partial,
            min_amount: body.min_amount,
            max_amount: body.max_amount,
            allow_overpayment: body.allow_overpayment,
        }
    }
}

/// Body of `POST /invoices/:id/pay`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayInvoiceRequest {
    pub wallet_id: String,
    pub amount: u64,
    pub idempotency_key: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::InvalidAmount(_) | LedgerError::InvalidOperation(_) => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::WalletNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::WalletExists(_) | LedgerError::DuplicateKeyConflict { .. } => {
            StatusCode::CONFLICT
        }
        LedgerError::InsufficientFunds { .. }
        | LedgerError::WalletSuspended(_)
        | LedgerError::WalletClosed(_)
        | LedgerError::DailyCapExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        LedgerError::Inconsistent(_) | LedgerError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn ledger_error(e: LedgerError) -> (StatusCode, Json<ErrorResponse>) {
    let status = ledger_status(&e);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("internal ledger error: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn invoice_error(e: InvoiceError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        InvoiceError::InvalidState { .. } => StatusCode::CONFLICT,
        InvoiceError::Expired { .. } | InvoiceError::AmountOutOfRange { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        InvoiceError::NotFound(_) => StatusCode::NOT_FOUND,
        InvoiceError::Ledger(inner) => ledger_status(inner),
        InvoiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("internal invoice error: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Protocol Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let wallet_count = state.facilitator.engine().store().wallet_count();
    state.metrics.wallets_total.set(wallet_count as i64);
    Json(StatusResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
        network: state.network.clone(),
        wallet_count,
    })
}

async fn supported_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.facilitator.supported())
}

async fn verify_handler(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> impl IntoResponse {
    state.metrics.verifications_total.inc();
    match state
        .facilitator
        .verify(&req.payment, &req.payment_requirements)
    {
        Ok(outcome) if outcome.is_valid => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(outcome) => {
            state.metrics.verifications_rejected_total.inc();
            (StatusCode::PAYMENT_REQUIRED, Json(outcome)).into_response()
        }
        Err(e) => ledger_error(e).into_response(),
    }
}

async fn settle_handler(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> impl IntoResponse {
    let timer = state.metrics.settle_latency_seconds.start_timer();
    let result = state
        .facilitator
        .settle(&req.payment, &req.payment_requirements);
    timer.observe_duration();

    match result {
        Ok(outcome) if outcome.success => {
            state.metrics.settlements_total.inc();
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Ok(outcome) => {
            state.metrics.settlements_failed_total.inc();
            (StatusCode::PAYMENT_REQUIRED, Json(outcome)).into_response()
        }
        Err(e) => {
            state.metrics.settlements_failed_total.inc();
            ledger_error(e).into_response()
        }
    }
}

async fn settle_deferred_handler(
    State(state): State<AppState>,
    Json(req): Json<PaymentRequest>,
) -> impl IntoResponse {
    let tx_id = req.payment.tx_id.clone();
    let job = SettlementJob {
        payload: req.payment,
        requirements: req.payment_requirements,
    };
    match state.settle_queue.enqueue(job).await {
        Ok(()) => {
            state
                .metrics
                .settlement_queue_free
                .set(state.settle_queue.capacity() as i64);
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "queued": true, "txId": tx_id })),
            )
                .into_response()
        }
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "settlement worker unavailable".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn settlement_outcome_handler(
    State(state): State<AppState>,
    Path(tx_id): Path<String>,
) -> impl IntoResponse {
    match load_outcome(&state.facilitator, &tx_id) {
        Ok(Some(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no settlement outcome recorded for {}", tx_id),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Wallet Handlers
// ---------------------------------------------------------------------------

async fn create_wallet_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateWalletRequest>,
) -> impl IntoResponse {
    let limits = WalletLimits {
        daily_spend_cap: req.daily_spend_cap,
        allow_overdraft: req.allow_overdraft,
    };
    match state
        .facilitator
        .engine()
        .register_wallet(&req.id, &req.owner_did, limits)
    {
        Ok(wallet) => {
            state
                .metrics
                .wallets_total
                .set(state.facilitator.engine().store().wallet_count() as i64);
            (StatusCode::CREATED, Json(wallet)).into_response()
        }
        Err(e) => ledger_error(e).into_response(),
    }
}

async fn wallet_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.facilitator.engine().get_wallet(&id) {
        Ok(Some(wallet)) => (StatusCode::OK, Json(wallet)).into_response(),
        Ok(None) => ledger_error(LedgerError::WalletNotFound(id)).into_response(),
        Err(e) => ledger_error(e).into_response(),
    }
}

async fn suspend_wallet_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<SuspendRequest>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "operator request".to_string());
    match state.facilitator.engine().suspend_wallet(&id, &reason) {
        Ok(wallet) => (StatusCode::OK, Json(wallet)).into_response(),
        Err(e) => ledger_error(e).into_response(),
    }
}

async fn reactivate_wallet_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.facilitator.engine().reactivate_wallet(&id) {
        Ok(wallet) => (StatusCode::OK, Json(wallet)).into_response(),
        Err(e) => ledger_error(e).into_response(),
    }
}

async fn close_wallet_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.facilitator.engine().close_wallet(&id) {
        Ok(wallet) => (StatusCode::OK, Json(wallet)).into_response(),
        Err(e) => ledger_error(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Transaction Handlers
// ---------------------------------------------------------------------------

async fn apply_transaction_handler(
    State(state): State<AppState>,
    Json(req): Json<TransactionRequest>,
) -> impl IntoResponse {
    let op = Operation {
        kind: req.kind,
        amount: req.amount,
        source: req.source,
        destination: req.destination,
        reason: req.reason,
        idempotency_key: req.idempotency_key,
        actor: req.actor.unwrap_or_else(|| "system".to_string()),
        invoice_id: req.invoice_id,
    };
    match state.facilitator.engine().apply(&op) {
        Ok(applied) => {
            if !applied.replayed {
                state.metrics.transactions_posted_total.inc();
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "transaction": applied.transaction,
                    "receipt": applied.receipt,
                    "replayed": applied.replayed,
                })),
            )
                .into_response()
        }
        Err(e) => ledger_error(e).into_response(),
    }
}

async fn transaction_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.facilitator.engine().store().get_transaction(&id) {
        Ok(Some(tx)) => (StatusCode::OK, Json(tx)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("transaction not found: {}", id),
            }),
        )
            .into_response(),
        Err(e) => ledger_error(LedgerError::Store(e)).into_response(),
    }
}

async fn receipt_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.facilitator.engine().store().get_receipt(&id) {
        Ok(Some(receipt)) => (StatusCode::OK, Json(receipt)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("receipt not found: {}", id),
            }),
        )
            .into_response(),
        Err(e) => ledger_error(LedgerError::Store(e)).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Invoice Handlers
// ---------------------------------------------------------------------------

async fn create_invoice_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateInvoiceRequest>,
) -> impl IntoResponse {
    let terms = req.terms.map(PaymentTerms::from).unwrap_or_default();
    match state.invoices.create(
        &req.issuer_did,
        &req.issuer_wallet,
        &req.recipient_did,
        InvoiceAmount::np(req.amount),
        terms,
    ) {
        Ok(invoice) => (StatusCode::CREATED, Json(invoice)).into_response(),
        Err(e) => invoice_error(e).into_response(),
    }
}

async fn invoice_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.invoices.get(&id) {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => invoice_error(e).into_response(),
    }
}

async fn issue_invoice_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.invoices.issue(&id) {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => invoice_error(e).into_response(),
    }
}

async fn pay_invoice_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PayInvoiceRequest>,
) -> impl IntoResponse {
    match state
        .invoices
        .pay(&id, &req.wallet_id, req.amount, &req.idempotency_key)
    {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => invoice_error(e).into_response(),
    }
}

async fn cancel_invoice_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.invoices.cancel(&id) {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => invoice_error(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use nanda_points::facilitator::SettlementWorker;
    use nanda_points::ledger::LedgerEngine;
    use nanda_points::store::PointsStore;

    use crate::metrics::FacilitatorMetrics;

    /// Creates an AppState over temporary storage with a live settlement
    /// worker.
    fn test_app_state() -> AppState {
        let engine = Arc::new(LedgerEngine::new(Arc::new(
            PointsStore::open_temporary().expect("temp db"),
        )));
        let facilitator = Arc::new(Facilitator::new(engine.clone()));
        let invoices = Arc::new(InvoiceRegistry::open(engine).expect("invoice tree"));
        let (settle_queue, _worker) = SettlementWorker::spawn(facilitator.clone());
        AppState {
            version: "0.1.0-test".to_string(),
            network: "nanda-network".to_string(),
            facilitator,
            invoices,
            settle_queue,
            metrics: Arc::new(FacilitatorMetrics::new()),
        }
    }

    /// Registers a wallet with a seeded balance through the engine.
    fn seed_wallet(state: &AppState, id: &str, balance: u64) {
        let engine = state.facilitator.engine();
        engine
            .register_wallet(id, &format!("{}-owner", id), WalletLimits::default())
            .unwrap();
        if balance > 0 {
            engine
                .apply(&Operation::mint(id, balance, "seed", &format!("seed-{}", id)))
                .unwrap();
        }
    }

    /// Sends a GET request and returns (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    fn payment_body(from: &str, to: &str, amount: u64, tx_id: &str) -> serde_json::Value {
        let mut payment = PaymentPayload::new(from, to, amount);
        payment.tx_id = tx_id.to_string();
        let requirements = PaymentRequirements::for_resource(to, amount, "/report", "a report");
        serde_json::json!({
            "payment": payment,
            "paymentRequirements": requirements,
        })
    }

    // -- Health & status -----------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_endpoint_reports_wallet_count() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:a", 0);
        seed_wallet(&state, "did:nanda:b", 0);
        let router = create_router(state);

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.wallet_count, 2);
        assert_eq!(resp.network, "nanda-network");
    }

    #[tokio::test]
    async fn supported_advertises_nanda_points() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/supported").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kinds"][0]["scheme"], "nanda-points");
        assert_eq!(json["kinds"][0]["asset"], "NP");
    }

    // -- Verify / settle -----------------------------------------------------

    #[tokio::test]
    async fn verify_accepts_valid_payment() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:payer", 1_000);
        seed_wallet(&state, "did:nanda:payee", 0);
        let router = create_router(state);

        let body = payment_body("did:nanda:payer", "did:nanda:payee", 100, "tx-1");
        let (status, resp) = post_json(&router, "/verify", body).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["isValid"], true);
        assert_eq!(json["payer"], "did:nanda:payer");
    }

    #[tokio::test]
    async fn verify_rejects_with_402_and_reason() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:payer", 10);
        seed_wallet(&state, "did:nanda:payee", 0);
        let router = create_router(state);

        let body = payment_body("did:nanda:payer", "did:nanda:payee", 100, "tx-1");
        let (status, resp) = post_json(&router, "/verify", body).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["invalidReason"], "insufficient balance");
    }

    #[tokio::test]
    async fn settle_moves_funds_and_is_idempotent() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:payer", 1_000);
        seed_wallet(&state, "did:nanda:payee", 0);
        let engine = state.facilitator.engine().clone();
        let router = create_router(state);

        let body = payment_body("did:nanda:payer", "did:nanda:payee", 100, "tx-1");
        let (status, resp) = post_json(&router, "/settle", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let first: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(first["success"], true);
        assert_eq!(first["receipt"]["source_balance_after"], 900);

        // Resubmit the identical settle: success, same receipt, no
        // second charge.
        let (status, resp) = post_json(&router, "/settle", body).await;
        assert_eq!(status, StatusCode::OK);
        let second: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(
            second["receipt"]["transaction_id"],
            first["receipt"]["transaction_id"]
        );
        assert_eq!(
            engine.get_wallet("did:nanda:payer").unwrap().unwrap().balance(),
            900
        );
    }

    #[tokio::test]
    async fn settle_rejection_returns_402() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:payer", 10);
        seed_wallet(&state, "did:nanda:payee", 0);
        let router = create_router(state);

        let body = payment_body("did:nanda:payer", "did:nanda:payee", 100, "tx-1");
        let (status, resp) = post_json(&router, "/settle", body).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errorReason"], "insufficient balance");
    }

    #[tokio::test]
    async fn deferred_settle_queues_and_records_outcome() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:payer", 1_000);
        seed_wallet(&state, "did:nanda:payee", 0);
        let router = create_router(state.clone());

        let body = payment_body("did:nanda:payer", "did:nanda:payee", 100, "tx-d1");
        let (status, resp) = post_json(&router, "/settle/deferred", body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["queued"], true);

        // Poll until the worker records the outcome.
        let mut outcome = None;
        for _ in 0..50 {
            let (status, resp) = get(&router, "/settlements/tx-d1").await;
            if status == StatusCode::OK {
                outcome = Some(serde_json::from_slice::<serde_json::Value>(&resp).unwrap());
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let outcome = outcome.expect("settlement outcome never recorded");
        assert_eq!(outcome["success"], true);
        assert_eq!(outcome["txId"], "tx-d1");
        assert_eq!(
            state
                .facilitator
                .engine()
                .get_wallet("did:nanda:payee")
                .unwrap()
                .unwrap()
                .balance(),
            100
        );
    }

    // -- Wallets -------------------------------------------------------------

    #[tokio::test]
    async fn wallet_lifecycle_over_http() {
        let router = create_router(test_app_state());

        let (status, body) = post_json(
            &router,
            "/wallets",
            serde_json::json!({ "id": "did:nanda:alice", "ownerDid": "did:nanda:alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let wallet: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(wallet["id"], "did:nanda:alice");
        assert_eq!(wallet["balance"], 0);

        // Duplicate registration conflicts.
        let (status, _) = post_json(
            &router,
            "/wallets",
            serde_json::json!({ "id": "did:nanda:alice", "ownerDid": "did:nanda:alice" }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post_json(
            &router,
            "/wallets/did:nanda:alice/suspend",
            serde_json::json!({ "reason": "review" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(&router, "/wallets/did:nanda:alice").await;
        assert_eq!(status, StatusCode::OK);
        let wallet: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(wallet["status"], "suspended");

        let (status, _) =
            post_json(&router, "/wallets/did:nanda:alice/reactivate", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_wallet_returns_404() {
        let router = create_router(test_app_state());
        let (status, _) = get(&router, "/wallets/did:nanda:nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // -- Transactions --------------------------------------------------------

    #[tokio::test]
    async fn transaction_endpoint_applies_and_replays() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:a", 1_000);
        seed_wallet(&state, "did:nanda:b", 0);
        let router = create_router(state);

        let body = serde_json::json!({
            "kind": "transfer",
            "amount": 250,
            "source": "did:nanda:a",
            "destination": "did:nanda:b",
            "reason": "pay",
            "idempotencyKey": "t1",
        });

        let (status, resp) = post_json(&router, "/transactions", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let first: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(first["replayed"], false);
        let tx_id = first["transaction"]["id"].as_str().unwrap().to_string();

        let (status, resp) = post_json(&router, "/transactions", body).await;
        assert_eq!(status, StatusCode::OK);
        let second: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(second["replayed"], true);
        assert_eq!(second["transaction"]["id"], tx_id.as_str());

        // The stored transaction and receipt are retrievable.
        let (status, _) = get(&router, &format!("/transactions/{}", tx_id)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = get(&router, &format!("/receipts/{}", tx_id)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn key_reuse_with_different_payload_returns_409() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:a", 1_000);
        seed_wallet(&state, "did:nanda:b", 0);
        let router = create_router(state);

        let body = serde_json::json!({
            "kind": "transfer",
            "amount": 250,
            "source": "did:nanda:a",
            "destination": "did:nanda:b",
            "reason": "pay",
            "idempotencyKey": "t1",
        });
        let (status, _) = post_json(&router, "/transactions", body).await;
        assert_eq!(status, StatusCode::OK);

        let conflicting = serde_json::json!({
            "kind": "transfer",
            "amount": 999,
            "source": "did:nanda:a",
            "destination": "did:nanda:b",
            "reason": "pay",
            "idempotencyKey": "t1",
        });
        let (status, _) = post_json(&router, "/transactions", conflicting).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn insufficient_funds_returns_402() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:a", 10);
        seed_wallet(&state, "did:nanda:b", 0);
        let router = create_router(state);

        let body = serde_json::json!({
            "kind": "transfer",
            "amount": 250,
            "source": "did:nanda:a",
            "destination": "did:nanda:b",
            "reason": "pay",
            "idempotencyKey": "t1",
        });
        let (status, resp) = post_json(&router, "/transactions", body).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        let err: ErrorResponse = serde_json::from_slice(&resp).unwrap();
        assert!(err.error.contains("insufficient funds"));
    }

    // -- Invoices ------------------------------------------------------------

    #[tokio::test]
    async fn invoice_flow_over_http() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:payer-wallet", 5_000);
        seed_wallet(&state, "did:nanda:issuer-wallet", 0);
        let router = create_router(state);

        let (status, body) = post_json(
            &router,
            "/invoices",
            serde_json::json!({
                "issuerDid": "did:nanda:issuer",
                "issuerWallet": "did:nanda:issuer-wallet",
                "recipientDid": "did:nanda:payer",
                "amount": 1000,
                "terms": { "acceptPartial": true },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let invoice: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = invoice["id"].as_str().unwrap().to_string();
        assert_eq!(invoice["status"], "draft");

        // Paying a draft invoice conflicts.
        let (status, _) = post_json(
            &router,
            &format!("/invoices/{}/pay", id),
            serde_json::json!({
                "walletId": "did:nanda:payer-wallet",
                "amount": 1000,
                "idempotencyKey": "inv-pay-0",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post_json(&router, &format!("/invoices/{}/issue", id), serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            &router,
            &format!("/invoices/{}/pay", id),
            serde_json::json!({
                "walletId": "did:nanda:payer-wallet",
                "amount": 400,
                "idempotencyKey": "inv-pay-1",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let invoice: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(invoice["status"], "issued");

        let (status, body) = post_json(
            &router,
            &format!("/invoices/{}/pay", id),
            serde_json::json!({
                "walletId": "did:nanda:payer-wallet",
                "amount": 600,
                "idempotencyKey": "inv-pay-2",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let invoice: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(invoice["status"], "paid");
    }

    #[tokio::test]
    async fn invoice_overpayment_returns_402() {
        let state = test_app_state();
        seed_wallet(&state, "did:nanda:payer-wallet", 5_000);
        seed_wallet(&state, "did:nanda:issuer-wallet", 0);
        let router = create_router(state);

        let (_, body) = post_json(
            &router,
            "/invoices",
            serde_json::json!({
                "issuerDid": "did:nanda:issuer",
                "issuerWallet": "did:nanda:issuer-wallet",
                "recipientDid": "did:nanda:payer",
                "amount": 1000,
            }),
        )
        .await;
        let invoice: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = invoice["id"].as_str().unwrap().to_string();
        post_json(&router, &format!("/invoices/{}/issue", id), serde_json::json!({})).await;

        let (status, _) = post_json(
            &router,
            &format!("/invoices/{}/pay", id),
            serde_json::json!({
                "walletId": "did:nanda:payer-wallet",
                "amount": 1500,
                "idempotencyKey": "inv-pay-1",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    }
}
