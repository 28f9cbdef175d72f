use std::path::Path;

use refmeta_core::{DocumentTypeHint, PartialRecord, PdfBackend};

use crate::config::ParsingConfig;
use crate::section::{ReferenceSection, SectionLocation, Segmentation};
use crate::{ParsingError, citation, classify, header, section, text_processing};

/// A configurable regex extraction pipeline.
///
/// Holds a [`ParsingConfig`] and exposes each step as a method. The default
/// constructor uses built-in defaults; use [`ReferenceExtractor::with_config`]
/// to supply custom markers, patterns and thresholds.
pub struct ReferenceExtractor {
    config: ParsingConfig,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference list of one document, split and parsed.
#[derive(Debug, Clone)]
pub struct ParsedReferences {
    pub location: SectionLocation,
    pub segmentation: Segmentation,
    /// One record per entry of `segmentation.citations`, same order.
    pub records: Vec<PartialRecord>,
}

impl ReferenceExtractor {
    pub fn new() -> Self {
        Self {
            config: ParsingConfig::default(),
        }
    }

    pub fn with_config(config: ParsingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParsingConfig {
        &self.config
    }

    /// Expand ligatures and repair hyphenation on every page.
    pub fn clean_pages(&self, pages: &[String]) -> Vec<String> {
        pages
            .iter()
            .map(|p| text_processing::clean_page_text(p, &self.config))
            .collect()
    }

    /// Document-type hint from the first page.
    pub fn classify(&self, pages: &[String]) -> DocumentTypeHint {
        pages
            .first()
            .map(|p| classify::classify(&text_processing::expand_ligatures(p)))
            .unwrap_or_default()
    }

    /// The document's own metadata from its first pages.
    pub fn parse_header(&self, pages: &[String]) -> PartialRecord {
        header::parse_header_with_config(pages, &self.config)
    }

    /// Locate the reference section in already-cleaned pages.
    pub fn find_section(&self, pages: &[String]) -> Option<ReferenceSection> {
        section::find_references_section_with_config(pages, &self.config)
    }

    /// Split reference-section text into citations and discarded spans.
    pub fn segment(&self, text: &str) -> Segmentation {
        section::segment_references_with_config(text, &self.config)
    }

    /// Clean, locate and segment in one step. Empty when the document has no
    /// text to segment.
    pub fn segment_pages(&self, pages: &[String]) -> (Option<SectionLocation>, Segmentation) {
        let cleaned = self.clean_pages(pages);
        match self.find_section(&cleaned) {
            Some(section) => (Some(section.location), self.segment(&section.text)),
            None => (None, Segmentation::default()),
        }
    }

    /// Parse one citation string.
    pub fn parse_citation(&self, text: &str) -> PartialRecord {
        citation::parse_citation(text)
    }

    /// Run the reference pipeline on page texts.
    pub fn extract_references_from_pages(
        &self,
        pages: &[String],
    ) -> Result<ParsedReferences, ParsingError> {
        let (location, segmentation) = self.segment_pages(pages);
        let location = location.ok_or(ParsingError::NoReferencesSection)?;

        tracing::debug!(
            ?location,
            citations = segmentation.citations.len(),
            discarded = segmentation.discarded.len(),
            "reference section segmented"
        );

        let records = segmentation
            .citations
            .iter()
            .map(|c| self.parse_citation(&c.text))
            .collect();

        Ok(ParsedReferences {
            location,
            segmentation,
            records,
        })
    }

    /// Run the reference pipeline on a PDF file.
    pub fn extract_references(
        &self,
        pdf_path: &Path,
        backend: &dyn PdfBackend,
    ) -> Result<ParsedReferences, ParsingError> {
        let pages = backend.extract_pages(pdf_path)?;
        self.extract_references_from_pages(&pages)
    }
}
