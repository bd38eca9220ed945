use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF document backends.
///
/// Implementors provide document loading and low-level per-page text
/// extraction; page sampling, paragraph scoring, and argument synthesis
/// live in this crate and are backend-agnostic.
pub trait PdfBackend: Send + Sync {
    /// Open a PDF file and return a handle for per-page reads.
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, BackendError>;
}

/// An opened PDF document with lazily readable pages.
///
/// Implementations must be safe to share across extraction workers: page
/// reads take `&self` and may run concurrently.
pub trait PdfDocument: Send + Sync {
    /// Total number of pages in the document.
    fn page_count(&self) -> usize;

    /// Extract the text of a single page by 0-based index.
    fn page_text(&self, page_index: usize) -> Result<String, BackendError>;
}
