use std::sync::Arc;

use crate::checkout::CheckoutProvider;
use crate::pipeline::Pipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Payment-session creation. Stripe in production.
    pub checkout: Arc<dyn CheckoutProvider>,
    /// Webhook pipeline with its store, LLM, renderer and publisher wired in.
    pub pipeline: Arc<Pipeline>,
}
