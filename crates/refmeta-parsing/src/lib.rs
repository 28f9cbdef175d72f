use std::path::Path;

use thiserror::Error;

pub mod authors;
pub mod citation;
pub mod classify;
pub mod config;
pub mod extractor;
pub mod header;
pub mod section;
pub mod text_processing;

pub use citation::parse_citation;
pub use classify::classify;
pub use config::{ListOverride, ParsingConfig, ParsingConfigBuilder};
pub use extractor::{ParsedReferences, ReferenceExtractor};
pub use header::parse_header;
pub use section::{
    ReferenceSection, SectionLocation, Segmentation, find_references_section, segment_references,
};
// Re-export domain types from core (canonical definitions live there)
pub use refmeta_core::{BackendError, DocumentTypeHint, PartialRecord, PdfBackend, RawCitation};

#[derive(Error, Debug)]
pub enum ParsingError {
    #[error("no references section found")]
    NoReferencesSection,
    #[error("backend error: {0}")]
    Backend(#[from] refmeta_core::BackendError),
}

/// Extract and parse the reference list of a PDF file using the given
/// backend for text extraction.
///
/// Pipeline:
/// 1. Extract page texts via `backend`
/// 2. Expand ligatures and repair hyphenation
/// 3. Locate the reference section (last heading, else the last pages)
/// 4. Segment citations, recording every discarded span with its reason
/// 5. Parse each citation with the regex parser
pub fn extract_references(
    pdf_path: &Path,
    backend: &dyn PdfBackend,
) -> Result<ParsedReferences, ParsingError> {
    ReferenceExtractor::new().extract_references(pdf_path, backend)
}
