use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// A form submission as stored in the `submissions` table.
///
/// Rows are created by the frontend. This service only reads them and
/// writes the payment flag, generated text, and document URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub job_text: Option<String>,
    pub education: Option<String>,
    pub strengths: Option<String>,
    pub wins: Option<String>,
    pub goals: Option<String>,
    /// `[{"entry": "..."}]` — one opaque text blob per employment.
    pub experience_json: Option<Value>,
    pub is_paid: bool,
    pub resume_text: Option<String>,
    pub cover_letter_text: Option<String>,
    pub resume_url: Option<String>,
    pub cover_letter_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single work-experience blob (role, company, timeframe, takeaway).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub entry: String,
}

impl Submission {
    /// Decodes `experience_json`, skipping entries that are not text.
    ///
    /// Accepts both `{"entry": "..."}` objects and bare strings.
    pub fn experience(&self) -> Vec<ExperienceEntry> {
        let Some(Value::Array(items)) = &self.experience_json else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("entry").and_then(|v| v.as_str()).map(String::from),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .map(|entry| ExperienceEntry { entry })
            .collect()
    }

    /// Applicant name for document titles; "Candidate" when blank.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Candidate")
    }
}

/// Partial update of a submission. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionPatch {
    pub is_paid: Option<bool>,
    pub resume_text: Option<String>,
    pub cover_letter_text: Option<String>,
    pub resume_url: Option<String>,
    pub cover_letter_url: Option<String>,
}

impl SubmissionPatch {
    pub fn is_empty(&self) -> bool {
        self == &SubmissionPatch::default()
    }

    /// Applies the patch to an in-memory row, mirroring the SQL `COALESCE` update.
    #[cfg(test)]
    pub fn apply_to(&self, submission: &mut Submission) {
        if let Some(paid) = self.is_paid {
            submission.is_paid = paid;
        }
        if let Some(text) = &self.resume_text {
            submission.resume_text = Some(text.clone());
        }
        if let Some(text) = &self.cover_letter_text {
            submission.cover_letter_text = Some(text.clone());
        }
        if let Some(url) = &self.resume_url {
            submission.resume_url = Some(url.clone());
        }
        if let Some(url) = &self.cover_letter_url {
            submission.cover_letter_url = Some(url.clone());
        }
    }
}
