use std::path::Path;

use thiserror::Error;

pub mod pipeline;

pub use pipeline::{ParsedCitation, Pipeline, ProgressEvent};
// Re-export domain types for convenience
pub use refmeta_core::{BibliographicRecord, Config, DocumentRecords, PdfBackend};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("PDF extraction error: {0}")]
    Pdf(#[from] refmeta_core::BackendError),
    #[error("parsing error: {0}")]
    Parsing(#[from] refmeta_parsing::ParsingError),
    #[cfg(not(feature = "pdf"))]
    #[error("PDF support not compiled in (enable the `pdf` feature of refmeta-ingest)")]
    NoPdfSupport,
}

/// Page texts and raw bytes of a PDF, read through `backend`.
pub fn read_pdf(path: &Path, backend: &dyn PdfBackend) -> Result<(Vec<String>, Vec<u8>), IngestError> {
    let pages = backend.extract_pages(path)?;
    let bytes = backend.read_bytes(path)?;
    tracing::debug!(path = %path.display(), pages = pages.len(), bytes = bytes.len(), "PDF read");
    Ok((pages, bytes))
}

/// The default text backend (MuPDF).
#[cfg(feature = "pdf")]
pub fn default_backend() -> Result<Box<dyn PdfBackend>, IngestError> {
    Ok(Box::new(refmeta_pdf_mupdf::MupdfBackend::default()))
}

#[cfg(not(feature = "pdf"))]
pub fn default_backend() -> Result<Box<dyn PdfBackend>, IngestError> {
    Err(IngestError::NoPdfSupport)
}

impl Pipeline {
    /// Read a PDF through `backend` and parse it as a document.
    pub async fn parse_pdf(
        &self,
        path: &Path,
        backend: &dyn PdfBackend,
    ) -> Result<DocumentRecords, IngestError> {
        let (pages, bytes) = read_pdf(path, backend)?;
        Ok(self.parse_document(&pages, &bytes).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refmeta_core::BackendError;

    struct Missing;

    impl PdfBackend for Missing {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<String>, BackendError> {
            Err(BackendError::OpenError("no such file".into()))
        }
    }

    #[test]
    fn test_read_pdf_propagates_backend_error() {
        let err = read_pdf(Path::new("missing.pdf"), &Missing).unwrap_err();
        assert!(matches!(err, IngestError::Pdf(BackendError::OpenError(_))));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn test_default_backend_available() {
        assert!(default_backend().is_ok());
    }
}
