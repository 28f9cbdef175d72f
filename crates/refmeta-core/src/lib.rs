use thiserror::Error;

pub mod authors;
pub mod backend;
pub mod config_file;
pub mod fusion;
pub mod matching;
pub mod normalize;
pub mod orchestrator;
pub mod patterns;
pub mod rate_limit;
pub mod record;
pub mod sources;
pub mod validate;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use fusion::fuse;
pub use normalize::normalize;
pub use orchestrator::{
    SourceKind, SourceOutcome, SourceQuery, SourceReport, SourceStatus, Sources, query_sources,
};
pub use record::{
    BibliographicRecord, DiscardReason, DiscardedSpan, DocumentRecords, DocumentType,
    DocumentTypeHint, Flag, PartialRecord, RawCitation, Source,
};
pub use sources::SourceError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("config error: {0}")]
    Config(#[from] config_file::ConfigError),
}

/// Runtime configuration of the extraction engine.
#[derive(Clone)]
pub struct Config {
    /// Contact address for the CrossRef polite pool.
    pub crossref_mailto: Option<String>,
    pub crossref_base_url: Option<String>,
    /// Base URL of a GROBID-compatible service, e.g. "http://localhost:8070".
    pub grobid_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_base_url: Option<String>,
    /// Source kinds or adapter names that must not be queried.
    pub disabled_sources: Vec<String>,
    /// Never build network adapters.
    pub offline: bool,
    pub registry_timeout_secs: u64,
    pub grobid_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    /// How many reference citations of one document are processed at once.
    pub max_concurrent_citations: usize,
    pub llm_excerpt_pages: usize,
    pub llm_excerpt_min_chars: usize,
    pub llm_excerpt_max_chars: usize,
}

impl Config {
    /// Whether a source may be queried, by kind key ("registry") or by the
    /// adapter's own name ("CrossRef"). Case-insensitive.
    pub fn source_enabled(&self, kind: orchestrator::SourceKind, name: &str) -> bool {
        !self.offline
            && !self
                .disabled_sources
                .iter()
                .any(|d| d.eq_ignore_ascii_case(kind.key()) || d.eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field("crossref_base_url", &self.crossref_base_url)
            .field("grobid_url", &self.grobid_url)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "***"))
            .field("llm_model", &self.llm_model)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("llm_base_url", &self.llm_base_url)
            .field("disabled_sources", &self.disabled_sources)
            .field("offline", &self.offline)
            .field("registry_timeout_secs", &self.registry_timeout_secs)
            .field("grobid_timeout_secs", &self.grobid_timeout_secs)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("max_concurrent_citations", &self.max_concurrent_citations)
            .field("llm_excerpt_pages", &self.llm_excerpt_pages)
            .field("llm_excerpt_min_chars", &self.llm_excerpt_min_chars)
            .field("llm_excerpt_max_chars", &self.llm_excerpt_max_chars)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crossref_mailto: None,
            crossref_base_url: None,
            grobid_url: None,
            llm_api_key: None,
            llm_model: sources::llm::DEFAULT_MODEL.to_string(),
            llm_max_tokens: sources::llm::DEFAULT_MAX_TOKENS,
            llm_base_url: None,
            disabled_sources: vec![],
            offline: false,
            registry_timeout_secs: 10,
            grobid_timeout_secs: 60,
            llm_timeout_secs: 20,
            max_concurrent_citations: 4,
            llm_excerpt_pages: 5,
            llm_excerpt_min_chars: 100,
            llm_excerpt_max_chars: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator::SourceKind;

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            crossref_mailto: Some("me@example.org".into()),
            llm_api_key: Some("sk-123".into()),
            ..Default::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("me@example.org"));
        assert!(!shown.contains("sk-123"));
        assert!(shown.contains("registry_timeout_secs: 10"));
    }

    #[test]
    fn test_source_enabled() {
        let config = Config {
            disabled_sources: vec!["crossref".into(), "LANGUAGE-MODEL".into()],
            ..Default::default()
        };
        assert!(!config.source_enabled(SourceKind::Registry, "CrossRef"));
        assert!(!config.source_enabled(SourceKind::LanguageModel, "anything"));
        assert!(config.source_enabled(SourceKind::StructuredMetadata, "GROBID"));

        let offline = Config {
            offline: true,
            ..Default::default()
        };
        assert!(!offline.source_enabled(SourceKind::StructuredMetadata, "GROBID"));
    }
}
