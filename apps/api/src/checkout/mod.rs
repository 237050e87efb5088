//! Checkout Initiator — creates a Stripe Checkout Session for a submission.
//!
//! Price and currency are fixed; the submission id rides along in the
//! session metadata so the completion webhook can find its way back.

pub mod handlers;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::StripeConfig;
use crate::errors::AppError;

pub const CURRENCY: &str = "eur";
/// €5.99 in cents.
pub const UNIT_AMOUNT: u32 = 599;
pub const PRODUCT_NAME: &str = "Resume & Cover Letter Generation";
pub const PRODUCT_DESCRIPTION: &str = "Automatically crafted resume & cover letter by JobJuicer AI";
/// Metadata key carrying the submission id through the payment provider.
pub const SUBMISSION_METADATA_KEY: &str = "submission_id";

/// A created payment session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted checkout page the browser is redirected to.
    pub url: String,
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(&self, submission_id: &str) -> Result<CheckoutSession, AppError>;
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// Stripe Checkout Sessions API client.
pub struct StripeCheckout {
    client: Client,
    config: StripeConfig,
}

impl StripeCheckout {
    pub fn new(config: StripeConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Form fields for `POST /v1/checkout/sessions`.
    pub fn session_params(&self, submission_id: &str) -> Vec<(String, String)> {
        session_params(&self.config, submission_id)
    }
}

pub fn session_params(config: &StripeConfig, submission_id: &str) -> Vec<(String, String)> {
    let pairs: [(&str, String); 10] = [
        ("payment_method_types[0]", "card".to_string()),
        ("mode", "payment".to_string()),
        ("line_items[0][price_data][currency]", CURRENCY.to_string()),
        ("line_items[0][price_data][unit_amount]", UNIT_AMOUNT.to_string()),
        ("line_items[0][price_data][product_data][name]", PRODUCT_NAME.to_string()),
        (
            "line_items[0][price_data][product_data][description]",
            PRODUCT_DESCRIPTION.to_string(),
        ),
        ("line_items[0][quantity]", "1".to_string()),
        ("metadata[submission_id]", submission_id.to_string()),
        ("success_url", config.success_url.clone()),
        ("cancel_url", config.cancel_url.clone()),
    ];
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[async_trait]
impl CheckoutProvider for StripeCheckout {
    async fn create_session(&self, submission_id: &str) -> Result<CheckoutSession, AppError> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.config.api_base))
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .form(&self.session_params(submission_id))
            .send()
            .await
            .map_err(|e| {
                error!("Stripe session request failed: {e}");
                AppError::Upstream(if e.is_timeout() {
                    "payment provider timed out".to_string()
                } else {
                    "payment provider unreachable".to_string()
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .map(|e| {
                    format!(
                        "{} ({})",
                        e.error.message.unwrap_or_default(),
                        e.error.code.unwrap_or_default()
                    )
                })
                .unwrap_or(body);
            error!("Stripe session error (status {status}): {detail}");
            return Err(AppError::Upstream(format!(
                "payment provider rejected the request (status {})",
                status.as_u16()
            )));
        }

        let session: CheckoutSession = response.json().await.map_err(|e| {
            error!("Stripe session response unreadable: {e}");
            AppError::Upstream("payment provider returned an invalid session".to_string())
        })?;

        info!(
            "Created checkout session {} for submission {submission_id}",
            session.id
        );
        Ok(session)
    }
}
