use std::path::Path;

use mupdf::{Document, Rect, TextPageFlags};

use refmeta_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate isolates the mupdf dependency (AGPL-3.0) so that code paths
/// that never open a PDF do not depend on it.
///
/// Text in the bottom 5% (footers) and top 4% (running headers) of each
/// page is dropped, except on the first page: its top margin usually holds
/// the journal header line (`Invest. Mar., Valparaíso, 28: 39-52, 2000`)
/// that header parsing reads.
pub struct MupdfBackend {
    /// Fraction of page height from bottom to exclude as footer (0.0–1.0).
    footer_exclusion_ratio: Option<f32>,
    /// Fraction of page height from top to exclude as header (0.0–1.0).
    header_exclusion_ratio: Option<f32>,
    /// Apply exclusions to the first page too.
    trim_first_page: bool,
    max_pages: Option<usize>,
}

impl Default for MupdfBackend {
    fn default() -> Self {
        Self {
            footer_exclusion_ratio: Some(0.05),
            header_exclusion_ratio: Some(0.04),
            trim_first_page: false,
            max_pages: None,
        }
    }
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = (ratio > 0.0).then_some(ratio);
        self
    }

    pub fn with_first_page_trimmed(mut self, trim: bool) -> Self {
        self.trim_first_page = trim;
        self
    }

    /// Stop after this many pages. Later pages are not returned at all.
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Vertical band of a page whose text is kept, as (top, bottom).
    fn kept_band(&self, bounds: &Rect, page_index: usize) -> (Option<f32>, Option<f32>) {
        if page_index == 0 && !self.trim_first_page {
            return (None, None);
        }
        let height = bounds.y1 - bounds.y0;
        (
            self.header_exclusion_ratio.map(|r| bounds.y0 + height * r),
            self.footer_exclusion_ratio.map(|r| bounds.y1 - height * r),
        )
    }
}

fn extraction_error(e: mupdf::Error) -> BackendError {
    BackendError::ExtractionError(e.to_string())
}

impl PdfBackend for MupdfBackend {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
        if !path.exists() {
            return Err(BackendError::OpenError(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut pages = Vec::new();
        for (index, page) in document.pages().map_err(extraction_error)?.enumerate() {
            if self.max_pages.is_some_and(|max| index >= max) {
                break;
            }
            let page = page.map_err(extraction_error)?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(extraction_error)?;
            let bounds = page.bounds().map_err(extraction_error)?;
            let (top, bottom) = self.kept_band(&bounds, index);

            // Block/line iteration keeps one output line per text line.
            let mut text = String::new();
            for block in text_page.blocks() {
                let block_bounds = block.bounds();
                if top.is_some_and(|t| block_bounds.y1 <= t) {
                    continue;
                }
                if bottom.is_some_and(|b| block_bounds.y0 >= b) {
                    continue;
                }
                for line in block.lines() {
                    text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                    text.push('\n');
                }
            }
            // Image-only pages stay as empty strings so indices line up.
            pages.push(text);
        }

        tracing::debug!(path = %path.display(), pages = pages.len(), "extracted PDF text");
        Ok(pages)
    }
}
