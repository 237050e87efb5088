mod checkout;
mod config;
mod db;
mod errors;
mod generation;
mod llm_client;
mod models;
mod pipeline;
mod publish;
mod render;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;
mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::checkout::StripeCheckout;
use crate::config::{Config, StorageConfig};
use crate::db::{create_pool, run_migrations};
use crate::llm_client::LlmClient;
use crate::pipeline::Pipeline;
use crate::publish::S3Publisher;
use crate::render::PdfRenderer;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgSubmissionStore;
use crate::webhook::WebhookVerifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobJuicer API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.store_timeout()).await?;
    if config.run_migrations {
        run_migrations(&db).await?;
    }
    let store = Arc::new(PgSubmissionStore::new(db, config.store_timeout()));

    // Initialize S3 / MinIO
    let storage = config.storage();
    let s3 = build_s3_client(&storage).await;
    let publisher = Arc::new(S3Publisher::new(s3, &storage));
    info!("S3 client initialized (bucket: {})", storage.bucket);

    // Initialize LLM client
    let llm = LlmClient::new(config.llm())?;
    info!("LLM client initialized (model: {})", llm.model());

    // Initialize payment provider
    let checkout = Arc::new(StripeCheckout::new(config.stripe())?);
    let verifier = WebhookVerifier::new(
        config.stripe_webhook_secret.clone(),
        config.webhook_tolerance_secs,
    );

    let pipeline = Pipeline::new(
        verifier,
        store,
        Arc::new(llm),
        Arc::new(PdfRenderer::default()),
        publisher,
    );

    // Build app state
    let state = AppState {
        checkout,
        pipeline: Arc::new(pipeline),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client for MinIO, Supabase storage, or AWS.
/// Path-style addressing keeps the bucket out of the hostname.
async fn build_s3_client(storage: &StorageConfig) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &storage.access_key_id,
        &storage.secret_access_key,
        None,
        None,
        "jobjuicer-static",
    );

    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(storage.region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&storage.endpoint)
        .timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(storage.timeout)
                .build(),
        )
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
