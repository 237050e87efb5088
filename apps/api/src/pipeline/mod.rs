// Workflow Orchestrator for completed-payment events.
//
// Verifying → Fetching → Generating → PersistingText → Rendering → Publishing
// → PersistingUrls → Done. Failures up to and including PersistingText abort
// the delivery; later failures are logged and suppressed.

pub mod orchestrator;
pub mod stage;

pub use orchestrator::Pipeline;
pub use stage::{PipelineFailure, Stage};
