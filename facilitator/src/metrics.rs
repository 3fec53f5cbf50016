//! # Prometheus Metrics
//!
//! Operational metrics for the facilitator, scraped at the `/metrics`
//! endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the facilitator.
///
/// Clone-friendly (prometheus handles wrap `Arc` internally) so it can be
/// shared across request handlers and the settlement worker.
#[derive(Clone)]
pub struct FacilitatorMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total verify calls handled.
    pub verifications_total: IntCounter,
    /// Verify calls that rejected the payment.
    pub verifications_rejected_total: IntCounter,
    /// Total settle calls that posted (or replayed) a transaction.
    pub settlements_total: IntCounter,
    /// Settle calls that were refused or failed.
    pub settlements_failed_total: IntCounter,
    /// Ledger transactions posted through the direct transaction API.
    pub transactions_posted_total: IntCounter,
    /// Number of wallets in the store.
    pub wallets_total: IntGauge,
    /// Free slots in the deferred-settlement queue.
    pub settlement_queue_free: IntGauge,
    /// Histogram of settle latency in seconds.
    pub settle_latency_seconds: Histogram,
}

impl FacilitatorMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("np".into()), None)
            .expect("failed to create prometheus registry");

        let verifications_total = IntCounter::new(
            "verifications_total",
            "Total number of verify calls handled",
        )
        .expect("metric creation");
        registry
            .register(Box::new(verifications_total.clone()))
            .expect("metric registration");

        let verifications_rejected_total = IntCounter::new(
            "verifications_rejected_total",
            "Verify calls that rejected the payment",
        )
        .expect("metric creation");
        registry
            .register(Box::new(verifications_rejected_total.clone()))
            .expect("metric registration");

        let settlements_total = IntCounter::new(
            "settlements_total",
            "Settle calls that posted or replayed a transaction",
        )
        .expect("metric creation");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("metric registration");

        let settlements_failed_total = IntCounter::new(
            "settlements_failed_total",
            "Settle calls that were refused or failed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(settlements_failed_total.clone()))
            .expect("metric registration");

        let transactions_posted_total = IntCounter::new(
            "transactions_posted_total",
            "Ledger transactions posted through the direct transaction API",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_posted_total.clone()))
            .expect("metric registration");

        let wallets_total = IntGauge::new("wallets_total", "Number of wallets in the store")
            .expect("metric creation");
        registry
            .register(Box::new(wallets_total.clone()))
            .expect("metric registration");

        let settlement_queue_free = IntGauge::new(
            "settlement_queue_free",
            "Free slots in the deferred-settlement queue",
        )
        .expect("metric creation");
        registry
            .register(Box::new(settlement_queue_free.clone()))
            .expect("metric registration");

        let settle_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "settle_latency_seconds",
                "End-to-end settle call latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(settle_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            verifications_total,
            verifications_rejected_total,
            settlements_total,
            settlements_failed_total,
            transactions_posted_total,
            wallets_total,
            settlement_queue_free,
            settle_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for FacilitatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers via extension.
pub type SharedMetrics = Arc<FacilitatorMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
