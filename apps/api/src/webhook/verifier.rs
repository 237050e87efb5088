//! Event Verifier — Stripe webhook signature checking.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`.
//! The signed payload is `"<t>.<raw body>"`, HMAC-SHA256 keyed with the
//! endpoint secret. Any matching `v1` entry is accepted (Stripe sends
//! several while a secret is being rolled).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::errors::AppError;
use crate::webhook::event::{parse_event, PaymentEvent};

type HmacSha256 = Hmac<Sha256>;

/// Header Stripe puts the signature in.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,

    #[error("Missing signature header")]
    MissingHeader,

    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("Timestamp outside the tolerance zone")]
    Expired,

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),
}

impl From<SignatureError> for AppError {
    fn from(e: SignatureError) -> Self {
        AppError::Authentication(e.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            // Entries that are not valid hex can never match; skip them.
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(SignatureError::MalformedHeader),
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Hex signature for `payload` at `timestamp`, as Stripe computes it.
#[cfg(test)]
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    hex::encode(mac_for(secret, timestamp, payload).finalize().into_bytes())
}

/// Verifies inbound webhook deliveries against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Verifies the signature against the current clock and parses the event.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<PaymentEvent, AppError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
            .map_err(AppError::from)
    }

    /// Same as `verify`, with an explicit "now" in unix seconds.
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<PaymentEvent, SignatureError> {
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(SignatureError::MissingHeader)?;
        let parsed = parse_header(header)?;

        let matched = parsed.signatures.iter().any(|candidate| {
            mac_for(&self.secret, parsed.timestamp, payload)
                .verify_slice(candidate)
                .is_ok()
        });
        if !matched {
            return Err(SignatureError::Mismatch);
        }

        if self.tolerance_secs > 0 && (now - parsed.timestamp).abs() > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        parse_event(payload).map_err(|e| SignatureError::InvalidPayload(e.to_string()))
    }
}

/// Builds a valid `Stripe-Signature` header for `payload`.
#[cfg(test)]
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={timestamp},v1={}",
        compute_signature(secret, timestamp, payload)
    )
}
