//! # Protocol Configuration & Constants
//!
//! Every magic number in the NP facilitator lives here. If you're
//! hardcoding a constant somewhere else, you're doing it wrong and you owe
//! the team coffee.
//!
//! These values define the wire contract with every SDK in the field, so
//! renaming a scheme or changing the asset code is a breaking change for
//! all of them at once.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Payment Scheme Identifiers
// ---------------------------------------------------------------------------

/// The x402 payment scheme implemented by this facilitator. Payments with
/// any other scheme are rejected during verification.
pub const PAYMENT_SCHEME: &str = "nanda-points";

/// The network identifier carried in payment payloads and requirements.
pub const PAYMENT_NETWORK: &str = "nanda-network";

/// Asset code for NANDA Points.
pub const ASSET_CODE: &str = "NP";

/// x402 protocol version we speak. Bump only in lockstep with the SDKs.
pub const X402_VERSION: u32 = 1;

/// MIME type advertised in payment requirements.
pub const REQUIREMENTS_MIME_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// Currency Parameters
// ---------------------------------------------------------------------------

/// Default currency code for newly created wallets.
pub const DEFAULT_CURRENCY: &str = ASSET_CODE;

/// Decimal places for NP amounts. Points are indivisible, so the minor
/// unit IS the point. The scale exists for display and for forward
/// compatibility with fractional assets, never for arithmetic.
pub const DEFAULT_SCALE: u32 = 0;

// ---------------------------------------------------------------------------
// Timeouts & Retry Policy
// ---------------------------------------------------------------------------

/// Default `maxTimeoutSeconds` advertised in payment requirements.
pub const DEFAULT_PAYMENT_TIMEOUT_SECS: u64 = 60;

/// Maximum attempts the deferred-settlement worker makes before recording
/// a permanent failure. Matches the retry budget the reference SDK uses
/// on the client side.
pub const SETTLE_MAX_ATTEMPTS: u32 = 3;

/// Delay between deferred-settlement attempts.
pub const SETTLE_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Capacity of the deferred-settlement queue. Enqueueing beyond this
/// back-pressures the caller instead of dropping jobs.
pub const SETTLE_QUEUE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Reason Codes
// ---------------------------------------------------------------------------

/// Reason code stamped on transactions created by facilitator settlement.
pub const REASON_X402_SETTLEMENT: &str = "x402-settlement";

/// Reason code stamped on transactions created by invoice payment.
pub const REASON_INVOICE_PAYMENT: &str = "invoice-payment";
