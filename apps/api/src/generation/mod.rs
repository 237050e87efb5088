// Resume + cover letter generation.
// All provider calls go through llm_client — no direct HTTP calls here.

pub mod generator;
pub mod prompts;

pub use generator::{generate_documents, GeneratedDocuments};
