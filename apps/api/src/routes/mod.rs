pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::checkout::handlers::handle_create_checkout;
use crate::state::AppState;
use crate::webhook::handlers::handle_webhook;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Checkout API
        .route("/create-checkout-session", post(handle_create_checkout))
        // Payment-provider callback
        .route("/webhook", post(handle_webhook))
        .with_state(state)
}
