//! Document Generator — one provider call per paid submission.
//!
//! Flow: build prompt from the submission → complete at a fixed temperature →
//!       split the reply on the two section markers.
//!
//! A missing marker is not an error: the corresponding section comes back
//! empty and the pipeline carries on. Provider failures are fatal.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::generation::prompts::{COVER_LETTER_MARKER, GENERATION_PROMPT_TEMPLATE, RESUME_MARKER};
use crate::llm_client::CompletionProvider;
use crate::models::submission::Submission;

/// Sampling temperature for every generation call.
pub const GENERATION_TEMPERATURE: f32 = 0.7;

/// The labeled pair of markdown documents produced for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedDocuments {
    pub resume: String,
    pub cover_letter: String,
}

/// Generates the resume and cover letter for `submission`.
pub async fn generate_documents(
    llm: &dyn CompletionProvider,
    submission: &Submission,
) -> Result<GeneratedDocuments, AppError> {
    let prompt = build_generation_prompt(submission);

    info!("Requesting documents for submission {}", submission.id);
    let reply = llm
        .complete(&prompt, GENERATION_TEMPERATURE)
        .await
        .map_err(|e| AppError::Generation(format!("Generation call failed: {e}")))?;

    debug!("Raw generation reply for {}: {reply}", submission.id);

    let documents = split_documents(&reply);
    if documents.resume.is_empty() {
        warn!(
            "Reply for submission {} has no resume section (marker {:?} missing or empty)",
            submission.id, RESUME_MARKER
        );
    }
    if documents.cover_letter.is_empty() {
        warn!(
            "Reply for submission {} has no cover letter section (marker {:?} missing or empty)",
            submission.id, COVER_LETTER_MARKER
        );
    }

    Ok(documents)
}

/// Splits a model reply into its two sections.
///
/// Text before the first marker is dropped. Each section runs from the end of
/// its marker to the next marker of either kind (or the end of the reply),
/// trimmed. An absent marker yields an empty section.
pub fn split_documents(reply: &str) -> GeneratedDocuments {
    GeneratedDocuments {
        resume: section_after(reply, RESUME_MARKER),
        cover_letter: section_after(reply, COVER_LETTER_MARKER),
    }
}

fn section_after(reply: &str, marker: &str) -> String {
    let Some(start) = reply.find(marker) else {
        return String::new();
    };
    let rest = &reply[start + marker.len()..];
    let end = [RESUME_MARKER, COVER_LETTER_MARKER]
        .iter()
        .filter_map(|m| rest.find(m))
        .min()
        .unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

/// Fills the generation template with the submission's fields.
pub fn build_generation_prompt(submission: &Submission) -> String {
    let experience = submission
        .experience()
        .iter()
        .map(|e| format!("• {}", e.entry.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    fill_template(GENERATION_PROMPT_TEMPLATE, |name| match name {
        "resume_marker" => Some(RESUME_MARKER),
        "cover_letter_marker" => Some(COVER_LETTER_MARKER),
        "job_text" => Some(field(&submission.job_text)),
        "full_name" => Some(field(&submission.full_name)),
        "email" => Some(field(&submission.email)),
        "education" => Some(field(&submission.education)),
        "strengths" => Some(field(&submission.strengths)),
        "wins" => Some(field(&submission.wins)),
        "goals" => Some(field(&submission.goals)),
        "experience" => Some(experience.as_str()),
        _ => None,
    })
}

/// Substitutes `{name}` placeholders in a single left-to-right scan.
///
/// Values are copied into the output verbatim and never rescanned, so
/// braces inside user text survive. Unknown placeholders stay as written.
fn fill_template<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| Some((close, lookup(&after[..close])?))) {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
