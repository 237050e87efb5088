//! Axum route handler for the Checkout API.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub submission_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub url: String,
}

/// POST /create-checkout-session
///
/// Creates a payment session for a submission and returns the redirect URL.
/// Any body that does not carry a non-blank string `submissionId` is a 400,
/// including bodies that are not JSON at all.
pub async fn handle_create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CreateCheckoutRequest>, JsonRejection>,
) -> Result<Json<CreateCheckoutResponse>, AppError> {
    let missing = || AppError::Validation("Missing submissionId".to_string());

    let Json(request) = payload.map_err(|rejection| {
        debug!("Unreadable checkout request: {rejection}");
        missing()
    })?;

    let submission_id = request
        .submission_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(missing)?;

    let session = state.checkout.create_session(submission_id).await?;

    Ok(Json(CreateCheckoutResponse { url: session.url }))
}
