// Payment webhook: signature verification, event model, HTTP handler.

pub mod event;
pub mod handlers;
pub mod verifier;

pub use event::PaymentEvent;
pub use verifier::WebhookVerifier;
