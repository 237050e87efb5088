use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::errors::AppError;

/// Pipeline states for one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Verifying,
    Fetching,
    Generating,
    PersistingText,
    Rendering,
    Publishing,
    PersistingUrls,
    Done,
}

impl Stage {
    /// Failures in critical stages abort the delivery and are reported to
    /// the payment provider; the rest are best-effort.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Stage::Verifying | Stage::Fetching | Stage::Generating | Stage::PersistingText
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Verifying => "verifying",
            Stage::Fetching => "fetching",
            Stage::Generating => "generating",
            Stage::PersistingText => "persisting_text",
            Stage::Rendering => "rendering",
            Stage::Publishing => "publishing",
            Stage::PersistingUrls => "persisting_urls",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Terminal `Failed(stage, cause)` state.
#[derive(Debug, Error)]
#[error("stage {stage} failed: {cause}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub cause: AppError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, cause: AppError) -> Self {
        Self { stage, cause }
    }

    /// Adapter for `map_err`.
    pub fn at(stage: Stage) -> impl FnOnce(AppError) -> PipelineFailure {
        move |cause| PipelineFailure::new(stage, cause)
    }
}
