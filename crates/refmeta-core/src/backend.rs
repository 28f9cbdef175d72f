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

/// Text acquisition for PDF documents.
///
/// Implementors provide page-by-page plain text; header parsing and
/// reference segmentation happen downstream on these pages.
pub trait PdfBackend: Send + Sync {
    /// Plain text of every page, in page order. Pages without text yield
    /// empty strings so page indices stay aligned.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError>;

    /// Raw bytes of the file, for services that want the PDF itself.
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, BackendError> {
        Ok(std::fs::read(path)?)
    }
}
