use regex::Regex;

use refmeta_core::config_file::ParsingSection;
use refmeta_core::patterns::{EXCLUSION_PHRASES, SECTION_END_MARKERS};

pub const DEFAULT_MIN_CITATION_CHARS: usize = 50;
pub const DEFAULT_MAX_CITATION_CHARS: usize = 2000;
pub const DEFAULT_MAX_CONCATENATION_ARTIFACTS: usize = 5;
pub const DEFAULT_FALLBACK_PAGES: usize = 3;
pub const DEFAULT_HEADER_PAGES: usize = 2;

/// Controls how a list of patterns/values is overridden from its defaults.
#[derive(Debug, Clone, Default)]
pub enum ListOverride<T> {
    /// Use the built-in defaults.
    #[default]
    Default,
    /// Completely replace the defaults with these values.
    Replace(Vec<T>),
    /// Append these values to the defaults.
    Extend(Vec<T>),
}

impl<T: Clone> ListOverride<T> {
    /// Resolve this override against the given defaults.
    pub fn resolve(&self, defaults: &[T]) -> Vec<T> {
        match self {
            ListOverride::Default => defaults.to_vec(),
            ListOverride::Replace(v) => v.clone(),
            ListOverride::Extend(v) => {
                let mut result = defaults.to_vec();
                result.extend(v.iter().cloned());
                result
            }
        }
    }
}

/// Thresholds and vocabularies for segmentation and field extraction.
///
/// Use [`ParsingConfigBuilder`] to construct with string patterns.
#[derive(Debug, Clone)]
pub struct ParsingConfig {
    // ── section.rs ──
    /// Replaces the built-in reference heading test when set.
    pub(crate) section_heading_re: Option<Regex>,
    /// Pages searched from the end when no heading is found.
    pub(crate) fallback_pages: usize,
    pub(crate) section_end_markers: Vec<String>,
    pub(crate) exclusion_phrases: Vec<String>,
    /// Extra running-header line patterns, on top of the built-in ones.
    pub(crate) extra_running_headers: Vec<Regex>,
    pub(crate) min_citation_chars: usize,
    pub(crate) max_citation_chars: usize,
    pub(crate) max_concatenation_artifacts: usize,

    // ── header.rs ──
    /// Pages read for a document's own metadata.
    pub(crate) header_pages: usize,
    /// Join a title with the following line when it looks cut.
    pub(crate) title_continuation: bool,

    // ── text_processing.rs ──
    /// Compound-word suffixes that should preserve the hyphen.
    pub(crate) compound_suffixes: ListOverride<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            section_heading_re: None,
            fallback_pages: DEFAULT_FALLBACK_PAGES,
            section_end_markers: owned(SECTION_END_MARKERS),
            exclusion_phrases: owned(EXCLUSION_PHRASES),
            extra_running_headers: Vec::new(),
            min_citation_chars: DEFAULT_MIN_CITATION_CHARS,
            max_citation_chars: DEFAULT_MAX_CITATION_CHARS,
            max_concatenation_artifacts: DEFAULT_MAX_CONCATENATION_ARTIFACTS,
            header_pages: DEFAULT_HEADER_PAGES,
            title_continuation: false,
            compound_suffixes: ListOverride::Default,
        }
    }
}

impl ParsingConfig {
    pub fn min_citation_chars(&self) -> usize {
        self.min_citation_chars
    }

    pub fn title_continuation(&self) -> bool {
        self.title_continuation
    }

    /// The `[parsing]` section equivalent of this config, for writing back
    /// to disk. List overrides are written as additions only.
    pub fn to_section(&self) -> ParsingSection {
        ParsingSection {
            min_citation_chars: Some(self.min_citation_chars),
            max_citation_chars: Some(self.max_citation_chars),
            max_concatenation_artifacts: Some(self.max_concatenation_artifacts),
            fallback_pages: Some(self.fallback_pages),
            title_continuation: Some(self.title_continuation),
            section_end_markers: None,
            exclusion_phrases: None,
        }
    }
}

/// Builder for [`ParsingConfig`].
///
/// Accepts string patterns that are compiled to `Regex` in [`build()`](Self::build).
/// Fails fast with `regex::Error` if any pattern is invalid.
#[derive(Debug, Clone, Default)]
pub struct ParsingConfigBuilder {
    section_heading_re: Option<String>,
    fallback_pages: Option<usize>,
    section_end_markers: ListOverride<String>,
    exclusion_phrases: ListOverride<String>,
    extra_running_headers: Vec<String>,
    min_citation_chars: Option<usize>,
    max_citation_chars: Option<usize>,
    max_concatenation_artifacts: Option<usize>,
    header_pages: Option<usize>,
    title_continuation: Option<bool>,
    compound_suffixes: ListOverride<String>,
}

fn push_extend(list: &mut ListOverride<String>, value: String) {
    match list {
        ListOverride::Extend(v) | ListOverride::Replace(v) => v.push(value),
        ListOverride::Default => *list = ListOverride::Extend(vec![value]),
    }
}

impl ParsingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the `[parsing]` section of a config file.
    pub fn from_section(section: &ParsingSection) -> Self {
        let mut builder = Self {
            min_citation_chars: section.min_citation_chars,
            max_citation_chars: section.max_citation_chars,
            max_concatenation_artifacts: section.max_concatenation_artifacts,
            fallback_pages: section.fallback_pages,
            title_continuation: section.title_continuation,
            ..Self::default()
        };
        for marker in section.section_end_markers.iter().flatten() {
            builder = builder.add_section_end_marker(marker.clone());
        }
        for phrase in section.exclusion_phrases.iter().flatten() {
            builder = builder.add_exclusion_phrase(phrase.clone());
        }
        builder
    }

    // ── Section location ──

    pub fn section_heading_regex(mut self, pattern: &str) -> Self {
        self.section_heading_re = Some(pattern.to_string());
        self
    }

    pub fn fallback_pages(mut self, pages: usize) -> Self {
        self.fallback_pages = Some(pages);
        self
    }

    pub fn set_section_end_markers(mut self, markers: Vec<String>) -> Self {
        self.section_end_markers = ListOverride::Replace(markers);
        self
    }

    pub fn add_section_end_marker(mut self, marker: String) -> Self {
        push_extend(&mut self.section_end_markers, marker);
        self
    }

    pub fn set_exclusion_phrases(mut self, phrases: Vec<String>) -> Self {
        self.exclusion_phrases = ListOverride::Replace(phrases);
        self
    }

    pub fn add_exclusion_phrase(mut self, phrase: String) -> Self {
        push_extend(&mut self.exclusion_phrases, phrase);
        self
    }

    pub fn add_running_header_regex(mut self, pattern: &str) -> Self {
        self.extra_running_headers.push(pattern.to_string());
        self
    }

    // ── Thresholds ──

    pub fn min_citation_chars(mut self, n: usize) -> Self {
        self.min_citation_chars = Some(n);
        self
    }

    pub fn max_citation_chars(mut self, n: usize) -> Self {
        self.max_citation_chars = Some(n);
        self
    }

    pub fn max_concatenation_artifacts(mut self, n: usize) -> Self {
        self.max_concatenation_artifacts = Some(n);
        self
    }

    pub fn header_pages(mut self, n: usize) -> Self {
        self.header_pages = Some(n);
        self
    }

    pub fn title_continuation(mut self, enabled: bool) -> Self {
        self.title_continuation = Some(enabled);
        self
    }

    // ── Compound suffixes ──

    pub fn set_compound_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.compound_suffixes = ListOverride::Replace(suffixes);
        self
    }

    pub fn add_compound_suffix(mut self, suffix: String) -> Self {
        push_extend(&mut self.compound_suffixes, suffix);
        self
    }

    /// Compile all string patterns into regexes and produce a [`ParsingConfig`].
    pub fn build(self) -> Result<ParsingConfig, regex::Error> {
        let section_heading_re = self
            .section_heading_re
            .map(|p| Regex::new(&p))
            .transpose()?;
        let extra_running_headers = self
            .extra_running_headers
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParsingConfig {
            section_heading_re,
            fallback_pages: self.fallback_pages.unwrap_or(DEFAULT_FALLBACK_PAGES),
            section_end_markers: self
                .section_end_markers
                .resolve(&owned(SECTION_END_MARKERS)),
            exclusion_phrases: self.exclusion_phrases.resolve(&owned(EXCLUSION_PHRASES)),
            extra_running_headers,
            min_citation_chars: self
                .min_citation_chars
                .unwrap_or(DEFAULT_MIN_CITATION_CHARS),
            max_citation_chars: self
                .max_citation_chars
                .unwrap_or(DEFAULT_MAX_CITATION_CHARS),
            max_concatenation_artifacts: self
                .max_concatenation_artifacts
                .unwrap_or(DEFAULT_MAX_CONCATENATION_ARTIFACTS),
            header_pages: self.header_pages.unwrap_or(DEFAULT_HEADER_PAGES).max(1),
            title_continuation: self.title_continuation.unwrap_or(false),
            compound_suffixes: self.compound_suffixes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParsingConfig::default();
        assert_eq!(config.min_citation_chars, 50);
        assert_eq!(config.max_citation_chars, 2000);
        assert_eq!(config.fallback_pages, 3);
        assert!(!config.title_continuation);
        assert!(config.section_end_markers.iter().any(|m| m == "FUNDING"));
    }

    #[test]
    fn test_builder_basic() {
        let config = ParsingConfigBuilder::new()
            .min_citation_chars(30)
            .fallback_pages(2)
            .title_continuation(true)
            .build()
            .unwrap();
        assert_eq!(config.min_citation_chars, 30);
        assert_eq!(config.fallback_pages, 2);
        assert!(config.title_continuation);
    }

    #[test]
    fn test_builder_custom_regex() {
        let config = ParsingConfigBuilder::new()
            .section_heading_regex(r"(?i)^\s*Literatura\s*$")
            .add_running_header_regex(r"^Rev\. Biol\. Mar\.")
            .build()
            .unwrap();
        assert!(config.section_heading_re.is_some());
        assert_eq!(config.extra_running_headers.len(), 1);
    }

    #[test]
    fn test_builder_invalid_regex() {
        let result = ParsingConfigBuilder::new()
            .section_heading_regex(r"[invalid")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_marker_lists_extend_and_replace() {
        let config = ParsingConfigBuilder::new()
            .add_section_end_marker("ANEXO".into())
            .set_exclusion_phrases(vec!["PROYECTO".into()])
            .build()
            .unwrap();
        assert!(config.section_end_markers.iter().any(|m| m == "ANEXO"));
        assert!(config.section_end_markers.iter().any(|m| m == "FUNDING"));
        assert_eq!(config.exclusion_phrases, vec!["PROYECTO".to_string()]);
    }

    #[test]
    fn test_from_section() {
        let section = ParsingSection {
            min_citation_chars: Some(40),
            title_continuation: Some(true),
            exclusion_phrases: Some(vec!["PROYECTO".into()]),
            ..Default::default()
        };
        let config = ParsingConfigBuilder::from_section(&section).build().unwrap();
        assert_eq!(config.min_citation_chars, 40);
        assert!(config.title_continuation);
        assert!(config.exclusion_phrases.iter().any(|p| p == "PROYECTO"));
        assert!(config.exclusion_phrases.iter().any(|p| p == "FONDECYT"));
    }

    #[test]
    fn test_list_override_resolve() {
        let defaults = vec!["a".to_string(), "b".to_string()];

        let d: ListOverride<String> = ListOverride::Default;
        assert_eq!(d.resolve(&defaults), defaults);

        let r: ListOverride<String> = ListOverride::Replace(vec!["x".to_string()]);
        assert_eq!(r.resolve(&defaults), vec!["x".to_string()]);

        let e: ListOverride<String> = ListOverride::Extend(vec!["c".to_string()]);
        assert_eq!(
            e.resolve(&defaults),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}
