use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub store_timeout_secs: u64,
    pub run_migrations: bool,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub webhook_tolerance_secs: i64,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub upstream_timeout_secs: u64,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub storage_public_url: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            store_timeout_secs: parse_env("STORE_TIMEOUT_SECS", 10)?,
            run_migrations: parse_env("RUN_MIGRATIONS", false)?,
            stripe_secret_key: require_env("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: require_env("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: env_or("STRIPE_API_BASE", "https://api.stripe.com/v1"),
            checkout_success_url: env_or(
                "CHECKOUT_SUCCESS_URL",
                "http://localhost:5173?payment=success",
            ),
            checkout_cancel_url: env_or(
                "CHECKOUT_CANCEL_URL",
                "http://localhost:5173?payment=cancelled",
            ),
            webhook_tolerance_secs: parse_env("WEBHOOK_TOLERANCE_SECS", 300)?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            upstream_timeout_secs: parse_env("UPSTREAM_TIMEOUT_SECS", 120)?,
            s3_bucket: env_or("S3_BUCKET", "resumes"),
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_region: env_or("S3_REGION", "us-east-1"),
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            storage_public_url: require_env("STORAGE_PUBLIC_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    /// Connection settings for the chat-completions client.
    pub fn llm(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.trim_end_matches('/').to_string(),
            model: self.openai_model.clone(),
            timeout: Duration::from_secs(self.upstream_timeout_secs),
        }
    }

    /// Connection settings for the Stripe checkout client.
    pub fn stripe(&self) -> StripeConfig {
        StripeConfig {
            secret_key: self.stripe_secret_key.clone(),
            api_base: self.stripe_api_base.trim_end_matches('/').to_string(),
            success_url: self.checkout_success_url.clone(),
            cancel_url: self.checkout_cancel_url.clone(),
            timeout: Duration::from_secs(self.upstream_timeout_secs),
        }
    }

    /// Connection settings for the S3-compatible artifact store.
    pub fn storage(&self) -> StorageConfig {
        StorageConfig {
            bucket: self.s3_bucket.clone(),
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key_id: self.aws_access_key_id.clone(),
            secret_access_key: self.aws_secret_access_key.clone(),
            public_base_url: self.storage_public_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.upstream_timeout_secs),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub success_url: String,
    pub cancel_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Base of public object URLs; objects resolve to `{public_base_url}/{bucket}/{key}`.
    pub public_base_url: String,
    pub timeout: Duration,
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
