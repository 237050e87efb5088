//! Submission Store — read and partially update form submissions.
//!
//! `AppState` carries an `Arc<dyn SubmissionStore>`; production uses
//! `PgSubmissionStore`, tests use the in-memory fake in `test_support`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::errors::AppError;
use crate::models::submission::{Submission, SubmissionPatch};

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Returns the submission, `AppError::NotFound` if absent.
    async fn fetch(&self, id: &str) -> Result<Submission, AppError>;

    /// Applies a partial update. `AppError::NotFound` if no row matches.
    async fn update(&self, id: &str, patch: &SubmissionPatch) -> Result<(), AppError>;

    /// Saves the generated text and sets `is_paid`, but only while the row is
    /// still unpaid. Returns `false` if another delivery got there first.
    async fn commit_paid_text(
        &self,
        id: &str,
        resume_text: &str,
        cover_letter_text: &str,
    ) -> Result<bool, AppError>;
}

/// PostgreSQL-backed store. Every call is bounded by `timeout`.
pub struct PgSubmissionStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| AppError::Persistence(format!("{op} failed: {e}"))),
            Err(_) => Err(AppError::Upstream(format!(
                "{op} timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn fetch(&self, id: &str) -> Result<Submission, AppError> {
        let row = self
            .bounded(
                "submission fetch",
                sqlx::query_as::<_, Submission>("SELECT * FROM submissions WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.ok_or_else(|| AppError::NotFound(format!("Submission {id} not found")))
    }

    async fn update(&self, id: &str, patch: &SubmissionPatch) -> Result<(), AppError> {
        if patch.is_empty() {
            debug!("Empty patch for submission {id}; skipping update");
            return Ok(());
        }

        let result = self
            .bounded(
                "submission update",
                sqlx::query(
                    r#"
                    UPDATE submissions SET
                        is_paid           = COALESCE($2, is_paid),
                        resume_text       = COALESCE($3, resume_text),
                        cover_letter_text = COALESCE($4, cover_letter_text),
                        resume_url        = COALESCE($5, resume_url),
                        cover_letter_url  = COALESCE($6, cover_letter_url)
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(patch.is_paid)
                .bind(patch.resume_text.as_deref())
                .bind(patch.cover_letter_text.as_deref())
                .bind(patch.resume_url.as_deref())
                .bind(patch.cover_letter_url.as_deref())
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Submission {id} not found")));
        }
        Ok(())
    }

    async fn commit_paid_text(
        &self,
        id: &str,
        resume_text: &str,
        cover_letter_text: &str,
    ) -> Result<bool, AppError> {
        let result = self
            .bounded(
                "submission text commit",
                sqlx::query(
                    r#"
                    UPDATE submissions SET
                        is_paid           = TRUE,
                        resume_text       = $2,
                        cover_letter_text = $3
                    WHERE id = $1 AND is_paid = FALSE
                    "#,
                )
                .bind(id)
                .bind(resume_text)
                .bind(cover_letter_text)
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = self
            .bounded(
                "submission existence check",
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM submissions WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.pool),
            )
            .await?;

        if exists {
            debug!("Submission {id} already paid; text commit skipped");
            Ok(false)
        } else {
            Err(AppError::NotFound(format!("Submission {id} not found")))
        }
    }
}
