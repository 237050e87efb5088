//! In-memory fakes for the injected collaborators, plus builders for
//! signed webhook deliveries. Compiled only for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::checkout::{CheckoutProvider, CheckoutSession};
use crate::errors::AppError;
use crate::llm_client::{CompletionProvider, LlmError};
use crate::models::submission::{Submission, SubmissionPatch};
use crate::pipeline::Pipeline;
use crate::publish::{object_key, public_url, ArtifactPublisher, DocumentKind};
use crate::render::{DocumentRenderer, PdfDocument, PdfRenderer};
use crate::store::SubmissionStore;
use crate::webhook::verifier::signature_header;
use crate::webhook::WebhookVerifier;

pub const TEST_SECRET: &str = "whsec_test_secret";
pub const PUBLIC_BASE: &str = "https://storage.test";
const BUCKET: &str = "resumes";

// ────────────────────────────────────────────────────────────────────────────
// Builders
// ────────────────────────────────────────────────────────────────────────────

pub fn submission(id: &str, job_text: &str) -> Submission {
    Submission {
        id: id.to_string(),
        full_name: Some("Jordan Reyes".to_string()),
        email: Some("jordan@example.com".to_string()),
        job_text: Some(job_text.to_string()),
        education: Some("BSc Economics".to_string()),
        strengths: Some("Modelling, SQL".to_string()),
        wins: Some("Cut reporting time in half".to_string()),
        goals: Some("Lead an analytics team".to_string()),
        experience_json: Some(json!([{"entry": "Analyst, Globex, 2020-2024"}])),
        ..Default::default()
    }
}

/// Raw `checkout.session.completed` body carrying `submission_id` in metadata.
pub fn completed_event(submission_id: &str) -> Vec<u8> {
    json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_1",
                "metadata": { "submission_id": submission_id }
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Valid signature header for `payload`, stamped with the current time.
pub fn sign(payload: &[u8]) -> String {
    signature_header(TEST_SECRET, chrono::Utc::now().timestamp(), payload)
}

pub fn pipeline_with(
    store: Arc<dyn SubmissionStore>,
    llm: Arc<dyn CompletionProvider>,
    renderer: Arc<dyn DocumentRenderer>,
    publisher: Arc<dyn ArtifactPublisher>,
) -> Pipeline {
    Pipeline::new(
        WebhookVerifier::new(TEST_SECRET, 300),
        store,
        llm,
        renderer,
        publisher,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Submission store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<String, Submission>>,
    updates: Mutex<Vec<(String, SubmissionPatch)>>,
    attempts: AtomicUsize,
    fail_update_at: Option<usize>,
    fail_fetch: bool,
}

impl InMemoryStore {
    pub fn with(rows: Vec<Submission>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(|s| (s.id.clone(), s)).collect()),
            ..Default::default()
        }
    }

    /// Fails the `n`-th update attempt (zero-based); later attempts succeed.
    pub fn failing_update(mut self, n: usize) -> Self {
        self.fail_update_at = Some(n);
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn get(&self, id: &str) -> Option<Submission> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    /// Updates that were applied, in order.
    pub fn updates(&self) -> Vec<(String, SubmissionPatch)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn fetch(&self, id: &str) -> Result<Submission, AppError> {
        if self.fail_fetch {
            return Err(AppError::Persistence("connection reset".to_string()));
        }
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("Submission {id} not found")))
    }

    async fn update(&self, id: &str, patch: &SubmissionPatch) -> Result<(), AppError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_update_at == Some(attempt) {
            return Err(AppError::Persistence("write rejected".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Submission {id} not found")))?;
        patch.apply_to(row);
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), patch.clone()));
        Ok(())
    }

    async fn commit_paid_text(
        &self,
        id: &str,
        resume_text: &str,
        cover_letter_text: &str,
    ) -> Result<bool, AppError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_update_at == Some(attempt) {
            return Err(AppError::Persistence("write rejected".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Submission {id} not found")))?;
        if row.is_paid {
            return Ok(false);
        }
        let patch = SubmissionPatch {
            is_paid: Some(true),
            resume_text: Some(resume_text.to_string()),
            cover_letter_text: Some(cover_letter_text.to_string()),
            ..Default::default()
        };
        patch.apply_to(row);
        self.updates.lock().unwrap().push((id.to_string(), patch));
        Ok(true)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Completion provider
// ────────────────────────────────────────────────────────────────────────────

pub struct ScriptedCompletion {
    reply: Result<String, u16>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, f32)>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with an API error carrying `status`.
    pub fn failing(status: u16) -> Self {
        Self {
            reply: Err(status),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleeps before replying, so overlapping callers interleave.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(prompt, temperature)` for each call made so far.
    pub fn calls(&self) -> Vec<(String, f32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), temperature));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(LlmError::Api {
                status: *status,
                message: "scripted failure".to_string(),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Renderer
// ────────────────────────────────────────────────────────────────────────────

/// Wraps the real renderer, counting calls; can be switched to always fail.
pub struct RecordingRenderer {
    inner: PdfRenderer,
    fail: bool,
    calls: AtomicUsize,
}

impl RecordingRenderer {
    pub fn working() -> Self {
        Self {
            inner: PdfRenderer::default(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::working()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for RecordingRenderer {
    async fn render(&self, title: &str, markdown: &str) -> Result<PdfDocument, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Render("scripted render failure".to_string()));
        }
        self.inner.render(title, markdown).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Publisher
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryPublisher {
    objects: Mutex<BTreeMap<String, PdfDocument>>,
    fail: bool,
}

impl InMemoryPublisher {
    pub fn working() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Stored object keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ArtifactPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        document: &PdfDocument,
        kind: DocumentKind,
        submission_id: &str,
    ) -> Result<String, AppError> {
        if self.fail {
            return Err(AppError::Publish("bucket unavailable".to_string()));
        }
        let key = object_key(kind, submission_id);
        self.objects
            .lock()
            .unwrap()
            .insert(key.clone(), document.clone());
        Ok(public_url(PUBLIC_BASE, BUCKET, &key))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Checkout
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCheckout {
    fail: bool,
    requested: Mutex<Vec<String>>,
}

impl FakeCheckout {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutProvider for FakeCheckout {
    async fn create_session(&self, submission_id: &str) -> Result<CheckoutSession, AppError> {
        self.requested
            .lock()
            .unwrap()
            .push(submission_id.to_string());
        if self.fail {
            return Err(AppError::Upstream("card_declined".to_string()));
        }
        Ok(CheckoutSession {
            id: "cs_test_1".to_string(),
            url: format!("https://checkout.test/pay/{submission_id}"),
        })
    }
}
