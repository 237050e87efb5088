// Markdown → PDF rendering.
// Layout is CPU-bound and must run inside tokio::task::spawn_blocking.

pub mod font_metrics;
pub mod markdown;
pub mod pdf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::errors::AppError;
use crate::render::font_metrics::{default_page_config, PageConfig};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A rendered binary document, ready for upload.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub bytes: Bytes,
    pub page_count: usize,
}

/// Converts markdown into a binary document. Carried in `AppState` as
/// `Arc<dyn DocumentRenderer>` so tests can inject failures.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, title: &str, markdown: &str) -> Result<PdfDocument, AppError>;
}

/// Pure-Rust renderer: pulldown-cmark blocks laid out with Helvetica metrics
/// and written with lopdf.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    page_config: PageConfig,
}

impl PdfRenderer {
    pub fn new(page_config: PageConfig) -> Self {
        Self { page_config }
    }

    /// Synchronous render; callers on the async runtime go through `render`.
    pub fn render_blocking(&self, title: &str, markdown: &str) -> Result<PdfDocument, AppError> {
        let blocks = markdown::parse_blocks(markdown);
        let layout = pdf::layout_blocks(&blocks, &self.page_config);
        let page_count = layout.pages.len();
        let bytes = pdf::write_pdf(&layout, &self.page_config, title).map_err(AppError::Render)?;
        debug!(
            "Rendered {} blocks into {} page(s), {} bytes",
            blocks.len(),
            page_count,
            bytes.len()
        );
        Ok(PdfDocument {
            bytes: Bytes::from(bytes),
            page_count,
        })
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new(default_page_config())
    }
}

#[async_trait]
impl DocumentRenderer for PdfRenderer {
    async fn render(&self, title: &str, markdown: &str) -> Result<PdfDocument, AppError> {
        let renderer = self.clone();
        let title = title.to_string();
        let markdown = markdown.to_string();
        tokio::task::spawn_blocking(move || renderer.render_blocking(&title, &markdown))
            .await
            .map_err(|e| AppError::Render(format!("renderer task failed: {e}")))?
    }
}
