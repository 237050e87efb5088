//! Artifact Publisher — uploads rendered documents and resolves public URLs.
//!
//! Object keys are deterministic per submission and document kind, so a
//! republish overwrites the previous object in place.

use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use serde::Serialize;
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::AppError;
use crate::render::{PdfDocument, PDF_CONTENT_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::CoverLetter => "cover_letter",
        }
    }

    /// Human-readable label used in document titles.
    pub fn title(self) -> &'static str {
        match self {
            DocumentKind::Resume => "Resume",
            DocumentKind::CoverLetter => "Cover Letter",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage key for a submission's document: `<kind>_<submission_id>.pdf`.
pub fn object_key(kind: DocumentKind, submission_id: &str) -> String {
    format!("{}_{}.pdf", kind.as_str(), submission_id)
}

#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Uploads `document` (overwriting) and returns its public address.
    async fn publish(
        &self,
        document: &PdfDocument,
        kind: DocumentKind,
        submission_id: &str,
    ) -> Result<String, AppError>;
}

/// S3-compatible publisher (AWS, MinIO, or any S3 gateway).
pub struct S3Publisher {
    s3: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3Publisher {
    pub fn new(s3: S3Client, config: &StorageConfig) -> Self {
        Self {
            s3,
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }

    /// Public address of `key` in this publisher's bucket.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.public_base_url, &self.bucket, key)
    }
}

pub fn public_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
}

#[async_trait]
impl ArtifactPublisher for S3Publisher {
    async fn publish(
        &self,
        document: &PdfDocument,
        kind: DocumentKind,
        submission_id: &str,
    ) -> Result<String, AppError> {
        let key = object_key(kind, submission_id);

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(document.bytes.clone()))
            .content_type(PDF_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| AppError::Publish(format!("S3 upload of {key} failed: {e}")))?;

        info!("Uploaded {kind} to s3://{}/{}", self.bucket, key);
        Ok(self.public_url(&key))
    }
}
