//! # x402 Wire Types
//!
//! The payment payload and requirements structures exchanged with SDKs,
//! plus the `X-PAYMENT` header codec (base64 over canonical JSON). Field
//! names are camelCase on the wire; amounts travel as strings so that
//! JavaScript clients never lose precision to doubles.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors decoding or interpreting wire payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid base64 in payment header: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid payment JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unparseable amount: {0:?}")]
    Amount(String),
}

// ---------------------------------------------------------------------------
// Payment Payload
// ---------------------------------------------------------------------------

/// A payment intent as submitted by a paying agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    /// Recipient wallet id.
    pub pay_to: String,
    /// Amount in minor units, as a decimal string.
    pub amount: String,
    /// Payer wallet id.
    pub from: String,
    /// Client-generated unique id; doubles as the idempotency key.
    pub tx_id: String,
    /// Unix milliseconds at payload creation.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentPayload {
    /// Builds a payload for the protocol's own scheme with a fresh tx id.
    pub fn new(from: &str, pay_to: &str, amount: u64) -> Self {
        Self {
            x402_version: config::X402_VERSION,
            scheme: config::PAYMENT_SCHEME.to_string(),
            network: config::PAYMENT_NETWORK.to_string(),
            pay_to: pay_to.to_string(),
            amount: amount.to_string(),
            from: from.to_string(),
            tx_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            extra: None,
        }
    }

    /// Encodes the payload for the `X-PAYMENT` HTTP header.
    pub fn to_header(&self) -> Result<String, PayloadError> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }

    /// Decodes a payload from an `X-PAYMENT` header value.
    pub fn from_header(header: &str) -> Result<Self, PayloadError> {
        let bytes = BASE64.decode(header.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The payment amount in minor units.
    pub fn parsed_amount(&self) -> Result<u64, PayloadError> {
        parse_amount(&self.amount)
    }
}

// ---------------------------------------------------------------------------
// Payment Requirements
// ---------------------------------------------------------------------------

/// What a resource server demands before serving a paid request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Price in minor units, as a decimal string.
    pub max_amount_required: String,
    /// The gated resource (URL or logical name).
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    /// Wallet the payment must go to.
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    /// Builds requirements for a resource priced in NP, with the
    /// protocol's scheme, network, and timeout defaults.
    pub fn for_resource(pay_to: &str, amount: u64, resource: &str, description: &str) -> Self {
        Self {
            scheme: config::PAYMENT_SCHEME.to_string(),
            network: config::PAYMENT_NETWORK.to_string(),
            max_amount_required: amount.to_string(),
            resource: resource.to_string(),
            description: description.to_string(),
            mime_type: config::REQUIREMENTS_MIME_TYPE.to_string(),
            pay_to: pay_to.to_string(),
            max_timeout_seconds: config::DEFAULT_PAYMENT_TIMEOUT_SECS,
            asset: config::ASSET_CODE.to_string(),
            extra: None,
        }
    }

    /// The required amount in minor units.
    pub fn parsed_amount(&self) -> Result<u64, PayloadError> {
        parse_amount(&self.max_amount_required)
    }
}

/// Parses a wire amount string: base-10 digits only, no sign, no decimal
/// point, no grouping. Rejects the empty string.
pub fn parse_amount(raw: &str) -> Result<u64, PayloadError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PayloadError::Amount(raw.to_string()));
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| PayloadError::Amount(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let payload = PaymentPayload::new("did:nanda:alice", "did:nanda:bob", 150);
        let header = payload.to_header().unwrap();
        let decoded = PaymentPayload::from_header(&header).unwrap();
        assert_eq!(decoded.tx_id, payload.tx_id);
        assert_eq!(decoded.amount, "150");
        assert_eq!(decoded.scheme, "nanda-points");
    }

    #[test]
    fn wire_names_are_camel_case() {
        let payload = PaymentPayload::new("did:nanda:alice", "did:nanda:bob", 150);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("x402Version").is_some());
        assert!(json.get("payTo").is_some());
        assert!(json.get("txId").is_some());
        assert!(json.get("x402_version").is_none());

        let reqs = PaymentRequirements::for_resource("did:nanda:bob", 150, "/report", "report");
        let json = serde_json::to_value(&reqs).unwrap();
        assert!(json.get("maxAmountRequired").is_some());
        assert!(json.get("maxTimeoutSeconds").is_some());
        assert_eq!(json["mimeType"], "application/json");
        assert_eq!(json["asset"], "NP");
    }

    #[test]
    fn amount_parsing_is_strict() {
        assert_eq!(parse_amount("150").unwrap(), 150);
        assert_eq!(parse_amount("  42 ").unwrap(), 42);
        assert!(parse_amount("").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("1.5").is_err());
        assert!(parse_amount("1,000").is_err());
        assert!(parse_amount("0x10").is_err());
    }

    #[test]
    fn garbage_header_rejected() {
        assert!(matches!(
            PaymentPayload::from_header("not base64!!!"),
            Err(PayloadError::Base64(_))
        ));
        let valid_b64_bad_json = BASE64.encode(b"{\"nope\":true}");
        assert!(matches!(
            PaymentPayload::from_header(&valid_b64_bad_json),
            Err(PayloadError::Json(_))
        ));
    }
}
