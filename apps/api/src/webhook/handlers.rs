//! Axum route handler for payment-provider webhooks.
//!
//! Responses are plain text: the provider only looks at the status code,
//! and the body shows up in its delivery log.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::{PipelineFailure, Stage};
use crate::state::AppState;
use crate::webhook::verifier::SIGNATURE_HEADER;

/// POST /webhook
///
/// The body must be the raw bytes as received; signature verification runs
/// over them before any JSON parsing.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    // One id per HTTP delivery; provider retries get a fresh one.
    let span = info_span!("webhook", delivery_id = %Uuid::new_v4());

    match state
        .pipeline
        .handle_delivery(&body, signature)
        .instrument(span)
        .await
    {
        Ok(outcome) => (StatusCode::OK, outcome.acknowledgement().to_string()),
        Err(failure) => failure_response(&failure),
    }
}

/// Maps a critical-stage failure to the status and body sent back.
pub fn failure_response(failure: &PipelineFailure) -> (StatusCode, String) {
    debug_assert!(failure.stage.is_critical());
    match (failure.stage, &failure.cause) {
        (Stage::Verifying, cause) => {
            warn!("Webhook rejected: {cause}");
            let detail = match cause {
                AppError::Authentication(msg) => msg.clone(),
                other => other.to_string(),
            };
            (StatusCode::BAD_REQUEST, format!("Webhook Error: {detail}"))
        }
        (Stage::Fetching, AppError::Validation(msg)) => {
            warn!("Webhook without correlation id: {msg}");
            (StatusCode::BAD_REQUEST, "Missing submission ID".to_string())
        }
        (Stage::Fetching, _) => {
            error!("{failure}");
            (StatusCode::BAD_REQUEST, "Submission not found".to_string())
        }
        (Stage::Generating, _) => {
            error!("{failure}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AI generation failed".to_string(),
            )
        }
        (Stage::PersistingText, _) => {
            error!("{failure}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error updating record".to_string(),
            )
        }
        _ => {
            error!("{failure}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}
