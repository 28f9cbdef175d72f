//! The two entry points, wired over injected sources.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use refmeta_core::matching::titles_match;
use refmeta_core::sources::crossref::CrossRef;
use refmeta_core::sources::grobid::Grobid;
use refmeta_core::sources::llm::{MessagesModel, build_excerpt};
use refmeta_core::sources::{LanguageModelSource, RegistrySource, StructuredMetadataSource};
use refmeta_core::{
    BibliographicRecord, Config, DocumentRecords, PartialRecord, SourceKind, SourceQuery,
    SourceReport, Sources, fuse, query_sources,
};
use refmeta_parsing::{ParsingConfig, RawCitation, ReferenceExtractor};

/// Progress of one [`Pipeline::parse_document_with_progress`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The document's own record is fused.
    HeaderDone,
    /// The reference list was segmented into `total` citations.
    ReferencesFound { total: usize },
    /// Citation `index` (0-based) is fused.
    ReferenceDone { index: usize, total: usize },
}

/// Everything learned about one free-text citation.
#[derive(Debug, Clone)]
pub struct ParsedCitation {
    pub regex: PartialRecord,
    pub report: SourceReport,
    pub record: BibliographicRecord,
}

/// Extraction engine: the regex extractor plus whichever external sources
/// were injected. Holds no per-request state, so one pipeline serves any
/// number of concurrent calls.
pub struct Pipeline {
    config: Config,
    extractor: ReferenceExtractor,
    sources: Sources,
}

impl Pipeline {
    /// A pipeline with no external sources: regex extraction only.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            extractor: ReferenceExtractor::new(),
            sources: Sources::default(),
        }
    }

    /// Build the HTTP adapters the config enables and inject them.
    ///
    /// CrossRef is always built unless offline; GROBID needs a URL and the
    /// language model an API key.
    pub fn from_config(config: &Config) -> Self {
        let mut pipeline = Self::new(config.clone());
        if config.offline {
            return pipeline;
        }

        let mut crossref = CrossRef::new(config.crossref_mailto.clone());
        if let Some(url) = &config.crossref_base_url {
            crossref = crossref.with_base_url(url);
        }
        pipeline = pipeline.with_registry(Arc::new(crossref));

        if let Some(url) = &config.grobid_url {
            pipeline = pipeline.with_structured_metadata(Arc::new(Grobid::new(url)));
        }

        if let Some(key) = &config.llm_api_key {
            let mut model = MessagesModel::new(key)
                .with_model(&config.llm_model)
                .with_max_tokens(config.llm_max_tokens);
            if let Some(url) = &config.llm_base_url {
                model = model.with_base_url(url);
            }
            pipeline = pipeline.with_language_model(Arc::new(model));
        }

        tracing::debug!(sources = ?pipeline.sources, "pipeline built");
        pipeline
    }

    pub fn with_registry(mut self, registry: Arc<dyn RegistrySource>) -> Self {
        self.sources.registry = Some(registry);
        self
    }

    pub fn with_structured_metadata(mut self, source: Arc<dyn StructuredMetadataSource>) -> Self {
        self.sources.structured_metadata = Some(source);
        self
    }

    pub fn with_language_model(mut self, model: Arc<dyn LanguageModelSource>) -> Self {
        self.sources.language_model = Some(model);
        self
    }

    pub fn with_parsing_config(mut self, parsing: ParsingConfig) -> Self {
        self.extractor = ReferenceExtractor::with_config(parsing);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub fn extractor(&self) -> &ReferenceExtractor {
        &self.extractor
    }

    /// Parse one free-text citation into a final record.
    pub async fn parse_citation(&self, text: &str) -> BibliographicRecord {
        self.parse_citation_detailed(text).await.record
    }

    /// [`Pipeline::parse_citation`], also returning the regex record and
    /// what each source did.
    pub async fn parse_citation_detailed(&self, text: &str) -> ParsedCitation {
        let regex = self.extractor.parse_citation(text);
        self.enrich_citation(regex, None).await
    }

    /// Registry lookup for one regex record plus an optional aligned
    /// structured-metadata record, then fusion.
    async fn enrich_citation(
        &self,
        regex: PartialRecord,
        structured: Option<PartialRecord>,
    ) -> ParsedCitation {
        let query = SourceQuery {
            doi: regex.record.doi.clone(),
            title: regex.record.title.clone(),
            authors: regex.record.authors.clone(),
            ..Default::default()
        };
        let report = query_sources(&self.sources, &query, &self.config).await;

        let mut partials = Vec::with_capacity(report.records.len() + 2);
        partials.push(regex.clone());
        partials.extend(structured);
        partials.extend(report.records.iter().cloned());

        ParsedCitation {
            record: fuse(&partials),
            regex,
            report,
        }
    }

    /// Parse a whole document: its own metadata and every reference.
    pub async fn parse_document(&self, pages: &[String], pdf: &[u8]) -> DocumentRecords {
        self.parse_document_with_progress(pages, pdf, |_| {}, CancellationToken::new())
            .await
    }

    /// [`Pipeline::parse_document`] with progress events and cancellation.
    ///
    /// References are processed `max_concurrent_citations` at a time and
    /// come back in reference-list order. Once `cancel` fires, citations not
    /// yet started are left out of the result.
    pub async fn parse_document_with_progress(
        &self,
        pages: &[String],
        pdf: &[u8],
        progress: impl Fn(ProgressEvent) + Send + Sync,
        cancel: CancellationToken,
    ) -> DocumentRecords {
        let pdf: Option<Arc<[u8]>> = (!pdf.is_empty()).then(|| Arc::from(pdf));

        let (header_record, structured_refs) = tokio::join!(
            self.parse_header(pages, pdf.clone()),
            self.structured_references(pdf.as_deref())
        );
        progress(ProgressEvent::HeaderDone);

        let (location, segmentation) = self.extractor.segment_pages(pages);
        let citations = segmentation.citations;
        let total = citations.len();
        tracing::info!(
            ?location,
            citations = total,
            discarded = segmentation.discarded.len(),
            structured = structured_refs.len(),
            "reference list segmented"
        );
        progress(ProgressEvent::ReferencesFound { total });

        let work = self.align(&citations, structured_refs);
        let progress = &progress;
        let cancel = &cancel;
        let reference_records: Vec<BibliographicRecord> = stream::iter(work.into_iter().enumerate())
            .map(|(index, (regex, structured))| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let parsed = self.enrich_citation(regex, structured).await;
                progress(ProgressEvent::ReferenceDone { index, total });
                Some(parsed.record)
            })
            .buffered(self.config.max_concurrent_citations.max(1))
            .filter_map(|r| async move { r })
            .collect()
            .await;

        if cancel.is_cancelled() {
            tracing::info!(
                done = reference_records.len(),
                total,
                "document parsing cancelled"
            );
        }

        DocumentRecords {
            header_record,
            reference_records,
        }
    }

    async fn parse_header(&self, pages: &[String], pdf: Option<Arc<[u8]>>) -> BibliographicRecord {
        let hint = self.extractor.classify(pages);
        let mut regex = self.extractor.parse_header(pages);
        if regex.record.document_type.is_none() {
            regex.record.document_type = hint.document_type();
        }
        tracing::debug!(hint = hint.name(), "document classified");

        let excerpt = build_excerpt(
            pages,
            self.config.llm_excerpt_pages,
            self.config.llm_excerpt_min_chars,
            self.config.llm_excerpt_max_chars,
        );
        let query = SourceQuery {
            doi: regex.record.doi.clone(),
            title: regex.record.title.clone(),
            authors: regex.record.authors.clone(),
            pdf,
            excerpt,
            hint: Some(hint),
        };
        let report = query_sources(&self.sources, &query, &self.config).await;
        for outcome in &report.outcomes {
            tracing::debug!(source = %outcome.name, status = ?outcome.status, "header source");
        }

        let mut partials = vec![regex];
        partials.extend(report.records);
        fuse(&partials)
    }

    /// The structured-metadata service's reference list, or nothing when
    /// the service is absent, disabled or fails.
    async fn structured_references(&self, pdf: Option<&[u8]>) -> Vec<PartialRecord> {
        let (Some(source), Some(pdf)) = (&self.sources.structured_metadata, pdf) else {
            return Vec::new();
        };
        if !self
            .config
            .source_enabled(SourceKind::StructuredMetadata, source.name())
        {
            return Vec::new();
        }
        let timeout = Duration::from_secs(self.config.grobid_timeout_secs);
        match tokio::time::timeout(timeout, source.references(pdf, timeout)).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                tracing::warn!(source = source.name(), error = %e, "reference list unavailable");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(source = source.name(), "reference list timed out");
                Vec::new()
            }
        }
    }

    /// Pair each citation's regex record with the structured reference that
    /// has the same DOI or a matching title. Each structured reference is
    /// used at most once.
    fn align(
        &self,
        citations: &[RawCitation],
        structured: Vec<PartialRecord>,
    ) -> Vec<(PartialRecord, Option<PartialRecord>)> {
        let mut pool: Vec<Option<PartialRecord>> = structured.into_iter().map(Some).collect();
        citations
            .iter()
            .map(|citation| {
                let regex = self.extractor.parse_citation(&citation.text);
                let matched = pool
                    .iter()
                    .position(|candidate| {
                        candidate
                            .as_ref()
                            .is_some_and(|c| same_work(&regex.record, &c.record))
                    })
                    .and_then(|i| pool[i].take());
                (regex, matched)
            })
            .collect()
    }
}

fn same_work(a: &BibliographicRecord, b: &BibliographicRecord) -> bool {
    if let (Some(x), Some(y)) = (&a.doi, &b.doi) {
        return x.eq_ignore_ascii_case(y);
    }
    match (&a.title, &b.title) {
        (Some(x), Some(y)) => titles_match(x, y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(doi: Option<&str>, title: Option<&str>) -> BibliographicRecord {
        BibliographicRecord {
            doi: doi.map(str::to_string),
            title: title.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_same_work_by_doi() {
        assert!(same_work(
            &record(Some("10.1/ABC"), None),
            &record(Some("10.1/abc"), Some("Other"))
        ));
        assert!(!same_work(
            &record(Some("10.1/abc"), Some("Kelp forests of Chile")),
            &record(Some("10.1/xyz"), Some("Kelp forests of Chile"))
        ));
    }

    #[test]
    fn test_same_work_by_title() {
        assert!(same_work(
            &record(None, Some("Kelp forests of the Southeast Pacific")),
            &record(Some("10.1/abc"), Some("Kelp Forests of the Southeast Pacific."))
        ));
        assert!(!same_work(&record(None, None), &record(None, Some("Kelp"))));
    }

    #[test]
    fn test_offline_pipeline_has_no_sources() {
        let config = Config {
            offline: true,
            grobid_url: Some("http://localhost:8070".into()),
            ..Default::default()
        };
        let pipeline = Pipeline::from_config(&config);
        assert!(pipeline.sources().registry.is_none());
        assert!(pipeline.sources().structured_metadata.is_none());
    }

    #[test]
    fn test_from_config_builds_configured_sources() {
        let config = Config {
            grobid_url: Some("http://localhost:8070".into()),
            ..Default::default()
        };
        let pipeline = Pipeline::from_config(&config);
        assert!(pipeline.sources().registry.is_some());
        assert!(pipeline.sources().structured_metadata.is_some());
        assert!(pipeline.sources().language_model.is_none());
    }
}
