//! Typed view of the Stripe event envelope.
//!
//! Only `checkout.session.completed` is modelled in detail; every other
//! event type is kept as its type string so it can be acknowledged.

use std::collections::HashMap;

use serde::Deserialize;

use crate::checkout::SUBMISSION_METADATA_KEY;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// The parts of a Checkout Session the pipeline needs.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum PaymentEvent {
    CheckoutCompleted {
        event_id: String,
        session: CheckoutSessionObject,
    },
    Other {
        event_id: String,
        event_type: String,
    },
}

impl PaymentEvent {
    pub fn event_id(&self) -> &str {
        match self {
            PaymentEvent::CheckoutCompleted { event_id, .. } | PaymentEvent::Other { event_id, .. } => {
                event_id
            }
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            PaymentEvent::CheckoutCompleted { .. } => CHECKOUT_COMPLETED,
            PaymentEvent::Other { event_type, .. } => event_type,
        }
    }

    /// Correlation identifier from the session metadata, if present and non-blank.
    pub fn submission_id(&self) -> Option<&str> {
        match self {
            PaymentEvent::CheckoutCompleted { session, .. } => session
                .metadata
                .get(SUBMISSION_METADATA_KEY)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty()),
            PaymentEvent::Other { .. } => None,
        }
    }
}

/// Parses a raw event body into a typed event.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, serde_json::Error> {
    let raw: RawEvent = serde_json::from_slice(payload)?;
    if raw.event_type == CHECKOUT_COMPLETED {
        let session: CheckoutSessionObject = serde_json::from_value(raw.data.object)?;
        Ok(PaymentEvent::CheckoutCompleted {
            event_id: raw.id,
            session,
        })
    } else {
        Ok(PaymentEvent::Other {
            event_id: raw.id,
            event_type: raw.event_type,
        })
    }
}
