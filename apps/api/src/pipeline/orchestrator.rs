//! Pipeline — runs one verified payment event through generation and
//! publishing.
//!
//! All collaborators are injected as trait objects. Text persistence is the
//! commit point: once `is_paid` and both texts are saved, the delivery is a
//! success no matter what happens to the PDFs.
//!
//! Overlapping deliveries for one submission are serialised twice: an
//! in-process claim keeps a second delivery from reaching the LLM, and the
//! text commit only applies to unpaid rows, which covers other instances.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;
use crate::generation::{generate_documents, GeneratedDocuments};
use crate::llm_client::CompletionProvider;
use crate::models::submission::{Submission, SubmissionPatch};
use crate::pipeline::stage::{PipelineFailure, Stage};
use crate::publish::{ArtifactPublisher, DocumentKind};
use crate::render::DocumentRenderer;
use crate::store::SubmissionStore;
use crate::webhook::{PaymentEvent, WebhookVerifier};

// ────────────────────────────────────────────────────────────────────────────
// Outcomes
// ────────────────────────────────────────────────────────────────────────────

/// Result of the best-effort render + publish chain for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ArtifactOutcome {
    Published { url: String },
    /// The generated section was empty, so there was nothing to render.
    Skipped,
    Failed { stage: Stage, reason: String },
}

impl ArtifactOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            ArtifactOutcome::Published { url } => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub submission_id: String,
    pub resume: ArtifactOutcome,
    pub cover_letter: ArtifactOutcome,
    pub urls_saved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub enum PipelineOutcome {
    /// Text persisted; the report says how far the documents got.
    Completed(PipelineReport),
    /// The submission was already paid; nothing was regenerated.
    AlreadyProcessed { submission_id: String },
    /// Event type this service does not act on.
    Ignored { event_type: String },
}

impl PipelineOutcome {
    /// Plain-text body returned to the payment provider.
    pub fn acknowledgement(&self) -> &'static str {
        match self {
            PipelineOutcome::Completed(_) => "Success",
            PipelineOutcome::AlreadyProcessed { .. } => "Already processed",
            PipelineOutcome::Ignored { .. } => "Ignored",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

pub struct Pipeline {
    verifier: WebhookVerifier,
    store: Arc<dyn SubmissionStore>,
    llm: Arc<dyn CompletionProvider>,
    renderer: Arc<dyn DocumentRenderer>,
    publisher: Arc<dyn ArtifactPublisher>,
    in_flight: Mutex<HashSet<String>>,
}

/// Held while a submission is being processed; releases the claim on drop.
struct InFlightClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    submission_id: String,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.submission_id);
    }
}

impl Pipeline {
    pub fn new(
        verifier: WebhookVerifier,
        store: Arc<dyn SubmissionStore>,
        llm: Arc<dyn CompletionProvider>,
        renderer: Arc<dyn DocumentRenderer>,
        publisher: Arc<dyn ArtifactPublisher>,
    ) -> Self {
        Self {
            verifier,
            store,
            llm,
            renderer,
            publisher,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, submission_id: &str) -> Option<InFlightClaim<'_>> {
        let fresh = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(submission_id.to_string());
        fresh.then(|| InFlightClaim {
            in_flight: &self.in_flight,
            submission_id: submission_id.to_string(),
        })
    }

    /// Handles one raw webhook delivery end to end.
    pub async fn handle_delivery(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let event = self
            .verifier
            .verify(payload, signature)
            .map_err(PipelineFailure::at(Stage::Verifying))?;

        info!(
            "Verified webhook event {} ({})",
            event.event_id(),
            event.event_type()
        );

        match &event {
            PaymentEvent::CheckoutCompleted { session, .. } => {
                let submission_id = event.submission_id().ok_or_else(|| {
                    PipelineFailure::new(
                        Stage::Fetching,
                        AppError::Validation(format!(
                            "Checkout session {} has no submission_id metadata",
                            session.id
                        )),
                    )
                })?;
                self.process_submission(submission_id).await
            }
            PaymentEvent::Other { event_type, .. } => {
                debug!("Ignoring webhook event type {event_type}");
                Ok(PipelineOutcome::Ignored {
                    event_type: event_type.clone(),
                })
            }
        }
    }

    /// Runs Fetching → … → Done for a submission whose payment is verified.
    pub async fn process_submission(
        &self,
        submission_id: &str,
    ) -> Result<PipelineOutcome, PipelineFailure> {
        let already_processed = || PipelineOutcome::AlreadyProcessed {
            submission_id: submission_id.to_string(),
        };

        let Some(_claim) = self.claim(submission_id) else {
            warn!("Submission {submission_id} is already being processed; skipping");
            return Ok(already_processed());
        };

        debug!("[{submission_id}] stage {}", Stage::Fetching);
        let submission = self
            .store
            .fetch(submission_id)
            .await
            .map_err(PipelineFailure::at(Stage::Fetching))?;

        if submission.is_paid {
            warn!("Submission {submission_id} is already paid; skipping regeneration");
            return Ok(already_processed());
        }

        debug!("[{submission_id}] stage {}", Stage::Generating);
        let documents = generate_documents(self.llm.as_ref(), &submission)
            .await
            .map_err(PipelineFailure::at(Stage::Generating))?;

        debug!("[{submission_id}] stage {}", Stage::PersistingText);
        let committed = self
            .store
            .commit_paid_text(submission_id, &documents.resume, &documents.cover_letter)
            .await
            .map_err(PipelineFailure::at(Stage::PersistingText))?;
        if !committed {
            warn!("Submission {submission_id} was paid by a concurrent delivery; discarding text");
            return Ok(already_processed());
        }
        info!("Resume + cover letter text saved for submission {submission_id}");

        let report = self.publish_documents(&submission, &documents).await;
        debug!("[{submission_id}] stage {}", Stage::Done);

        Ok(PipelineOutcome::Completed(report))
    }

    /// Best-effort: renders and uploads both documents, then saves whichever
    /// URLs were produced. Never fails.
    async fn publish_documents(
        &self,
        submission: &Submission,
        documents: &GeneratedDocuments,
    ) -> PipelineReport {
        let id = submission.id.as_str();
        let name = submission.display_name();

        let (resume, cover_letter) = tokio::join!(
            self.render_and_publish(id, name, DocumentKind::Resume, &documents.resume),
            self.render_and_publish(
                id,
                name,
                DocumentKind::CoverLetter,
                &documents.cover_letter
            ),
        );

        let url_patch = SubmissionPatch {
            resume_url: resume.url().map(str::to_string),
            cover_letter_url: cover_letter.url().map(str::to_string),
            ..Default::default()
        };

        let urls_saved = if url_patch.is_empty() {
            warn!("No documents published for submission {id}; URL fields left unset");
            false
        } else {
            match self.store.update(id, &url_patch).await {
                Ok(()) => {
                    info!("File URLs saved for submission {id}");
                    true
                }
                Err(cause) => {
                    error!("{}", PipelineFailure::new(Stage::PersistingUrls, cause));
                    false
                }
            }
        };

        PipelineReport {
            submission_id: id.to_string(),
            resume,
            cover_letter,
            urls_saved,
        }
    }

    async fn render_and_publish(
        &self,
        submission_id: &str,
        name: &str,
        kind: DocumentKind,
        markdown: &str,
    ) -> ArtifactOutcome {
        if markdown.trim().is_empty() {
            warn!("Empty {kind} for submission {submission_id}; nothing to render");
            return ArtifactOutcome::Skipped;
        }

        let title = format!("{name} - {}", kind.title());
        let document = match self.renderer.render(&title, markdown).await {
            Ok(document) => {
                debug!(
                    "Rendered {kind} for submission {submission_id}: {} page(s)",
                    document.page_count
                );
                document
            }
            Err(cause) => return failed(submission_id, kind, Stage::Rendering, cause),
        };

        match self.publisher.publish(&document, kind, submission_id).await {
            Ok(url) => ArtifactOutcome::Published { url },
            Err(cause) => failed(submission_id, kind, Stage::Publishing, cause),
        }
    }
}

fn failed(submission_id: &str, kind: DocumentKind, stage: Stage, cause: AppError) -> ArtifactOutcome {
    let failure = PipelineFailure::new(stage, cause);
    error!("{kind} for submission {submission_id}: {failure}");
    ArtifactOutcome::Failed {
        stage,
        reason: failure.cause.to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::{
        completed_event, pipeline_with, sign, submission, InMemoryPublisher, InMemoryStore,
        RecordingRenderer, ScriptedCompletion, PUBLIC_BASE,
    };

    const BOTH_MARKERS: &str = "=== RESUME ===\nResume body\n=== COVER LETTER ===\nCover body";

    struct Harness {
        store: Arc<InMemoryStore>,
        llm: Arc<ScriptedCompletion>,
        renderer: Arc<RecordingRenderer>,
        publisher: Arc<InMemoryPublisher>,
        pipeline: Pipeline,
    }

    fn harness(
        store: InMemoryStore,
        llm: ScriptedCompletion,
        renderer: RecordingRenderer,
        publisher: InMemoryPublisher,
    ) -> Harness {
        let store = Arc::new(store);
        let llm = Arc::new(llm);
        let renderer = Arc::new(renderer);
        let publisher = Arc::new(publisher);
        let pipeline = pipeline_with(
            store.clone(),
            llm.clone(),
            renderer.clone(),
            publisher.clone(),
        );
        Harness {
            store,
            llm,
            renderer,
            publisher,
            pipeline,
        }
    }

    fn default_harness(reply: &str) -> Harness {
        harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")]),
            ScriptedCompletion::replying(reply),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        )
    }

    async fn deliver(h: &Harness, payload: &[u8]) -> Result<PipelineOutcome, PipelineFailure> {
        let header = sign(payload);
        h.pipeline.handle_delivery(payload, Some(&header)).await
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let h = default_harness(BOTH_MARKERS);
        let outcome = deliver(&h, &completed_event("S1")).await.unwrap();

        let PipelineOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert!(report.urls_saved);

        let row = h.store.get("S1").unwrap();
        assert!(row.is_paid);
        assert_eq!(row.resume_text.as_deref(), Some("Resume body"));
        assert_eq!(row.cover_letter_text.as_deref(), Some("Cover body"));
        assert_eq!(
            row.resume_url.as_deref(),
            Some(format!("{PUBLIC_BASE}/resumes/resume_S1.pdf").as_str())
        );
        assert_eq!(
            row.cover_letter_url.as_deref(),
            Some(format!("{PUBLIC_BASE}/resumes/cover_letter_S1.pdf").as_str())
        );
        assert_eq!(
            h.publisher.keys(),
            vec!["cover_letter_S1.pdf".to_string(), "resume_S1.pdf".to_string()]
        );
        assert!(h.llm.calls()[0].0.contains("Senior Analyst at Acme"));
    }

    #[tokio::test]
    async fn test_bad_signature_fails_verifying_without_mutation() {
        let h = default_harness(BOTH_MARKERS);
        let payload = completed_event("S1");
        let err = h
            .pipeline
            .handle_delivery(&payload, Some("t=1,v1=deadbeef"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Verifying);
        assert!(h.store.updates().is_empty());
        assert!(h.llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_submission_fails_fetching_without_mutation() {
        let h = default_harness(BOTH_MARKERS);
        let err = deliver(&h, &completed_event("nope")).await.unwrap_err();
        assert_eq!(err.stage, Stage::Fetching);
        assert!(matches!(err.cause, AppError::NotFound(_)));
        assert!(h.store.updates().is_empty());
    }

    #[tokio::test]
    async fn test_missing_correlation_id_fails_fetching() {
        let h = default_harness(BOTH_MARKERS);
        let payload =
            br#"{"id":"evt_9","type":"checkout.session.completed","data":{"object":{"id":"cs_9","metadata":{}}}}"#;
        let err = deliver(&h, payload).await.unwrap_err();
        assert_eq!(err.stage, Stage::Fetching);
        assert!(matches!(err.cause, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_other_event_types_are_ignored() {
        let h = default_harness(BOTH_MARKERS);
        let payload =
            br#"{"id":"evt_7","type":"checkout.session.expired","data":{"object":{"id":"cs_7","metadata":{"submission_id":"S1"}}}}"#;
        let outcome = deliver(&h, payload).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Ignored { .. }));
        assert_eq!(outcome.acknowledgement(), "Ignored");
        assert!(h.store.updates().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_submission_untouched() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")]),
            ScriptedCompletion::failing(429),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let err = deliver(&h, &completed_event("S1")).await.unwrap_err();
        assert_eq!(err.stage, Stage::Generating);
        assert!(h.store.updates().is_empty());
        assert!(!h.store.get("S1").unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_missing_cover_marker_persists_empty_cover() {
        let h = default_harness("=== RESUME ===\nOnly a resume");
        let outcome = deliver(&h, &completed_event("S1")).await.unwrap();

        let PipelineOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(report.cover_letter, ArtifactOutcome::Skipped);
        let row = h.store.get("S1").unwrap();
        assert!(row.is_paid);
        assert_eq!(row.resume_text.as_deref(), Some("Only a resume"));
        assert_eq!(row.cover_letter_text.as_deref(), Some(""));
        assert!(row.resume_url.is_some());
        assert!(row.cover_letter_url.is_none());
    }

    #[tokio::test]
    async fn test_text_persistence_failure_skips_rendering() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")])
                .failing_update(0),
            ScriptedCompletion::replying(BOTH_MARKERS),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let err = deliver(&h, &completed_event("S1")).await.unwrap_err();
        assert_eq!(err.stage, Stage::PersistingText);
        assert_eq!(h.renderer.calls(), 0);
        assert!(h.publisher.keys().is_empty());
        assert!(!h.store.get("S1").unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_render_failure_still_succeeds_with_urls_unset() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")]),
            ScriptedCompletion::replying(BOTH_MARKERS),
            RecordingRenderer::failing(),
            InMemoryPublisher::working(),
        );
        let outcome = deliver(&h, &completed_event("S1")).await.unwrap();

        let PipelineOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert!(matches!(
            report.resume,
            ArtifactOutcome::Failed {
                stage: Stage::Rendering,
                ..
            }
        ));
        assert!(!report.urls_saved);
        let row = h.store.get("S1").unwrap();
        assert!(row.is_paid);
        assert_eq!(row.resume_text.as_deref(), Some("Resume body"));
        assert!(row.resume_url.is_none());
        assert!(row.cover_letter_url.is_none());
        assert_eq!(h.store.updates().len(), 1, "only the text update ran");
    }

    #[tokio::test]
    async fn test_publish_failure_is_suppressed() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")]),
            ScriptedCompletion::replying(BOTH_MARKERS),
            RecordingRenderer::working(),
            InMemoryPublisher::failing(),
        );
        let outcome = deliver(&h, &completed_event("S1")).await.unwrap();
        let PipelineOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert!(matches!(
            report.cover_letter,
            ArtifactOutcome::Failed {
                stage: Stage::Publishing,
                ..
            }
        ));
        assert_eq!(h.renderer.calls(), 2);
        assert!(h.store.get("S1").unwrap().resume_url.is_none());
    }

    #[tokio::test]
    async fn test_url_persistence_failure_is_suppressed() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")])
                .failing_update(1),
            ScriptedCompletion::replying(BOTH_MARKERS),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let outcome = deliver(&h, &completed_event("S1")).await.unwrap();
        let PipelineOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert!(!report.urls_saved);
        assert_eq!(report.resume.url(), Some(format!("{PUBLIC_BASE}/resumes/resume_S1.pdf").as_str()));
        let row = h.store.get("S1").unwrap();
        assert!(row.is_paid);
        assert!(row.resume_url.is_none());
    }

    #[tokio::test]
    async fn test_already_paid_submission_is_not_regenerated() {
        let mut paid = submission("S1", "Senior Analyst at Acme");
        paid.is_paid = true;
        paid.resume_text = Some("Original".to_string());
        let h = harness(
            InMemoryStore::with(vec![paid]),
            ScriptedCompletion::replying(BOTH_MARKERS),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let outcome = deliver(&h, &completed_event("S1")).await.unwrap();
        assert_eq!(outcome.acknowledgement(), "Already processed");
        assert!(h.llm.calls().is_empty());
        assert!(h.store.updates().is_empty());
        assert_eq!(h.store.get("S1").unwrap().resume_text.as_deref(), Some("Original"));
    }

    #[tokio::test]
    async fn test_redelivery_after_text_failure_recovers() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")])
                .failing_update(0),
            ScriptedCompletion::replying(BOTH_MARKERS),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let payload = completed_event("S1");
        assert!(deliver(&h, &payload).await.is_err());
        let outcome = deliver(&h, &payload).await.unwrap();
        assert_eq!(outcome.acknowledgement(), "Success");
        assert!(h.store.get("S1").unwrap().is_paid);
        assert_eq!(h.llm.calls().len(), 2);
    }

    fn text_commits(store: &InMemoryStore) -> usize {
        store
            .updates()
            .iter()
            .filter(|(_, patch)| patch.is_paid == Some(true))
            .count()
    }

    fn acks(
        a: Result<PipelineOutcome, PipelineFailure>,
        b: Result<PipelineOutcome, PipelineFailure>,
    ) -> Vec<&'static str> {
        let mut acks = vec![
            a.unwrap().acknowledgement(),
            b.unwrap().acknowledgement(),
        ];
        acks.sort();
        acks
    }

    #[tokio::test]
    async fn test_overlapping_deliveries_generate_once() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")]),
            ScriptedCompletion::replying(BOTH_MARKERS).slow(Duration::from_millis(30)),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let payload = completed_event("S1");

        let (a, b) = tokio::join!(deliver(&h, &payload), deliver(&h, &payload));

        assert_eq!(acks(a, b), vec!["Already processed", "Success"]);
        assert_eq!(h.llm.calls().len(), 1);
        assert_eq!(text_commits(&h.store), 1);
    }

    #[tokio::test]
    async fn test_concurrent_instances_commit_text_once() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")]),
            ScriptedCompletion::replying(BOTH_MARKERS).slow(Duration::from_millis(30)),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let other_instance = pipeline_with(
            h.store.clone(),
            h.llm.clone(),
            h.renderer.clone(),
            h.publisher.clone(),
        );
        let payload = completed_event("S1");
        let header = sign(&payload);

        let (a, b) = tokio::join!(
            h.pipeline.handle_delivery(&payload, Some(&header)),
            other_instance.handle_delivery(&payload, Some(&header)),
        );

        assert_eq!(acks(a, b), vec!["Already processed", "Success"]);
        assert_eq!(h.llm.calls().len(), 2, "separate instances cannot see each other's claim");
        assert_eq!(text_commits(&h.store), 1);
        assert!(h.store.get("S1").unwrap().is_paid);
    }

    #[tokio::test]
    async fn test_claim_is_released_after_failure() {
        let h = harness(
            InMemoryStore::with(vec![submission("S1", "Senior Analyst at Acme")]),
            ScriptedCompletion::failing(503),
            RecordingRenderer::working(),
            InMemoryPublisher::working(),
        );
        let payload = completed_event("S1");
        assert!(deliver(&h, &payload).await.is_err());
        assert!(deliver(&h, &payload).await.is_err());
        assert_eq!(h.llm.calls().len(), 2);
    }
}
