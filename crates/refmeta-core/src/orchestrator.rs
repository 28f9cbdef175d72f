use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::Config;
use crate::record::{DocumentTypeHint, PartialRecord};
use crate::sources::{
    LanguageModelSource, RegistrySource, SourceError, StructuredMetadataSource,
};

/// The external sources available to one pipeline. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Sources {
    pub registry: Option<Arc<dyn RegistrySource>>,
    pub structured_metadata: Option<Arc<dyn StructuredMetadataSource>>,
    pub language_model: Option<Arc<dyn LanguageModelSource>>,
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources")
            .field("registry", &self.registry.as_ref().map(|s| s.name()))
            .field("structured_metadata", &self.structured_metadata.as_ref().map(|s| s.name()))
            .field("language_model", &self.language_model.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// Which kind of source an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Registry,
    StructuredMetadata,
    LanguageModel,
}

impl SourceKind {
    /// Key accepted in `disabled_sources`, besides the adapter's own name.
    pub fn key(&self) -> &'static str {
        match self {
            SourceKind::Registry => "registry",
            SourceKind::StructuredMetadata => "structured-metadata",
            SourceKind::LanguageModel => "language-model",
        }
    }
}

/// What happened to one source during a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Found,
    NoData,
    Timeout,
    /// Server returned 429.
    RateLimited,
    Error,
    /// Not queried: disabled, not configured, not useful for this document
    /// type, or nothing to query with.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub name: String,
    pub kind: SourceKind,
    pub status: SourceStatus,
    pub elapsed: Option<Duration>,
    pub error_message: Option<String>,
}

impl SourceOutcome {
    fn skipped(name: &str, kind: SourceKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            status: SourceStatus::Skipped,
            elapsed: None,
            error_message: None,
        }
    }
}

/// Everything the sources may be queried with for one citation or document.
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    pub doi: Option<String>,
    pub title: Option<String>,
    pub authors: Option<String>,
    /// Raw PDF bytes, for the structured-metadata header call.
    pub pdf: Option<Arc<[u8]>>,
    /// Page-text excerpt, for the language model.
    pub excerpt: Option<String>,
    /// `None` for free-text citations, which only go to the registry.
    pub hint: Option<DocumentTypeHint>,
}

/// Partial records gathered from the sources plus one outcome per source.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub records: Vec<PartialRecord>,
    pub outcomes: Vec<SourceOutcome>,
}

impl SourceReport {
    pub fn outcome(&self, kind: SourceKind) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}

fn status_for(err: &SourceError) -> SourceStatus {
    match err {
        SourceError::Timeout(_) => SourceStatus::Timeout,
        SourceError::RateLimited { .. } => SourceStatus::RateLimited,
        _ => SourceStatus::Error,
    }
}

async fn with_timeout<F>(timeout: Duration, fut: F) -> Result<Option<PartialRecord>, SourceError>
where
    F: std::future::Future<Output = Result<Option<PartialRecord>, SourceError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or(Err(SourceError::Timeout(timeout)))
}

/// Registry lookup by DOI first, falling back to title and authors.
async fn registry_lookup(
    registry: &dyn RegistrySource,
    query: &SourceQuery,
    timeout: Duration,
) -> Result<Option<PartialRecord>, SourceError> {
    if let Some(doi) = &query.doi {
        if let Some(found) = with_timeout(timeout, registry.by_doi(doi, timeout)).await? {
            return Ok(Some(found));
        }
    }
    let Some(title) = &query.title else {
        return Ok(None);
    };
    let authors = query.authors.as_deref();
    with_timeout(timeout, registry.by_title_authors(title, authors, timeout)).await
}

type TaskOutput = (
    String,
    SourceKind,
    Result<Option<PartialRecord>, SourceError>,
    Duration,
);

fn spawn_timed<F>(set: &mut JoinSet<TaskOutput>, name: String, kind: SourceKind, fut: F)
where
    F: std::future::Future<Output = Result<Option<PartialRecord>, SourceError>> + Send + 'static,
{
    set.spawn(async move {
        let start = Instant::now();
        let result = fut.await;
        (name, kind, result, start.elapsed())
    });
}

/// Query every applicable source concurrently, each under its own timeout.
///
/// Failures never escape: they show up as the source's [`SourceStatus`] and
/// the source contributes no record. When the registry found nothing but
/// another source produced a DOI, the registry is asked once more by that DOI.
pub async fn query_sources(sources: &Sources, query: &SourceQuery, config: &Config) -> SourceReport {
    let mut report = SourceReport::default();
    let mut join_set: JoinSet<TaskOutput> = JoinSet::new();

    let registry_timeout = Duration::from_secs(config.registry_timeout_secs);
    let structured_timeout = Duration::from_secs(config.grobid_timeout_secs);
    let llm_timeout = Duration::from_secs(config.llm_timeout_secs);
    let wants = |pred: fn(&DocumentTypeHint) -> bool| query.hint.as_ref().is_some_and(pred);

    if let Some(registry) = &sources.registry {
        let name = registry.name().to_string();
        let kind = SourceKind::Registry;
        let has_key = query.doi.is_some() || query.title.is_some();
        if has_key && config.source_enabled(kind, &name) {
            let (registry, query) = (Arc::clone(registry), query.clone());
            spawn_timed(&mut join_set, name, kind, async move {
                registry_lookup(registry.as_ref(), &query, registry_timeout).await
            });
        } else {
            report.outcomes.push(SourceOutcome::skipped(&name, kind));
        }
    }

    if let Some(structured) = &sources.structured_metadata {
        let name = structured.name().to_string();
        let kind = SourceKind::StructuredMetadata;
        match &query.pdf {
            Some(pdf)
                if wants(DocumentTypeHint::prefers_structured_metadata)
                    && config.source_enabled(kind, &name) =>
            {
                let (structured, pdf) = (Arc::clone(structured), Arc::clone(pdf));
                spawn_timed(&mut join_set, name, kind, async move {
                    with_timeout(structured_timeout, structured.header(&pdf, structured_timeout)).await
                });
            }
            _ => report.outcomes.push(SourceOutcome::skipped(&name, kind)),
        }
    }

    if let Some(model) = &sources.language_model {
        let name = model.name().to_string();
        let kind = SourceKind::LanguageModel;
        match &query.excerpt {
            Some(excerpt)
                if wants(DocumentTypeHint::prefers_language_model)
                    && config.source_enabled(kind, &name) =>
            {
                let (model, excerpt) = (Arc::clone(model), excerpt.clone());
                let hint = query.hint.unwrap_or_default();
                spawn_timed(&mut join_set, name, kind, async move {
                    with_timeout(llm_timeout, model.extract(&excerpt, hint, llm_timeout)).await
                });
            }
            _ => report.outcomes.push(SourceOutcome::skipped(&name, kind)),
        }
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((name, kind, result, elapsed)) => {
                let outcome = record_outcome(&mut report.records, name, kind, result, elapsed);
                report.outcomes.push(outcome);
            }
            Err(e) => tracing::warn!(error = %e, "source task failed to complete"),
        }
    }

    if let Some(registry) = &sources.registry {
        if config.source_enabled(SourceKind::Registry, registry.name()) {
            follow_up_by_doi(registry.as_ref(), query, &mut report, registry_timeout).await;
        }
    }

    report
}

fn record_outcome(
    records: &mut Vec<PartialRecord>,
    name: String,
    kind: SourceKind,
    result: Result<Option<PartialRecord>, SourceError>,
    elapsed: Duration,
) -> SourceOutcome {
    let elapsed_ms = elapsed.as_millis() as u64;
    let (status, error_message) = match result {
        Ok(Some(record)) => {
            tracing::debug!(source = %name, elapsed_ms, fields = record.record.filled_fields(), "source found data");
            records.push(record);
            (SourceStatus::Found, None)
        }
        Ok(None) => {
            tracing::debug!(source = %name, elapsed_ms, "source had no data");
            (SourceStatus::NoData, None)
        }
        Err(e) => {
            tracing::warn!(source = %name, elapsed_ms, error = %e, "source unavailable");
            (status_for(&e), Some(e.to_string()))
        }
    };
    SourceOutcome {
        name,
        kind,
        status,
        elapsed: Some(elapsed),
        error_message,
    }
}

/// A DOI learned from the structured-metadata service or the language model
/// is worth one more registry lookup.
async fn follow_up_by_doi(
    registry: &dyn RegistrySource,
    query: &SourceQuery,
    report: &mut SourceReport,
    timeout: Duration,
) {
    let Some(idx) = report.outcomes.iter().position(|o| o.kind == SourceKind::Registry) else {
        return;
    };
    if matches!(report.outcomes[idx].status, SourceStatus::Found | SourceStatus::RateLimited) {
        return;
    }
    let learned = report
        .records
        .iter()
        .filter_map(|r| r.record.doi.as_deref())
        .find(|doi| query.doi.as_deref().is_none_or(|q| !q.eq_ignore_ascii_case(doi)))
        .map(str::to_string);
    let Some(doi) = learned else {
        return;
    };
    tracing::debug!(doi = %doi, "registry: follow-up lookup by learned DOI");
    let start = Instant::now();
    let result = with_timeout(timeout, registry.by_doi(&doi, timeout)).await;
    let name = report.outcomes[idx].name.clone();
    let elapsed = start.elapsed();
    report.outcomes[idx] =
        record_outcome(&mut report.records, name, SourceKind::Registry, result, elapsed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BibliographicRecord, Source};
    use crate::sources::mock::{MockLanguageModel, MockRegistry, MockResponse, MockStructuredMetadata};

    fn titled(title: &str) -> BibliographicRecord {
        BibliographicRecord {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_citation_queries_registry_only() {
        let registry = Arc::new(MockRegistry::new(MockResponse::Found(titled("Found title here"))));
        let model = Arc::new(MockLanguageModel::new(MockResponse::NotFound));
        let sources = Sources {
            registry: Some(registry.clone()),
            structured_metadata: None,
            language_model: Some(model.clone()),
        };
        let query = SourceQuery {
            title: Some("Found title here".into()),
            ..Default::default()
        };
        let report = query_sources(&sources, &query, &Config::default()).await;
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].source, Source::RegistryByTitle);
        assert_eq!(model.call_count(), 0);
        assert_eq!(
            report.outcome(SourceKind::LanguageModel).map(|o| o.status),
            Some(SourceStatus::Skipped)
        );
    }

    #[tokio::test]
    async fn test_disabled_source_is_skipped() {
        let registry = Arc::new(MockRegistry::new(MockResponse::NotFound));
        let sources = Sources {
            registry: Some(registry.clone()),
            ..Default::default()
        };
        let config = Config {
            disabled_sources: vec!["Registry".into()],
            ..Default::default()
        };
        let query = SourceQuery {
            doi: Some("10.1000/xyz123".into()),
            ..Default::default()
        };
        let report = query_sources(&sources, &query, &config).await;
        assert_eq!(registry.call_count(), 0);
        assert_eq!(report.outcomes[0].status, SourceStatus::Skipped);
    }

    #[tokio::test]
    async fn test_errors_become_statuses() {
        let sources = Sources {
            registry: Some(Arc::new(MockRegistry::new(MockResponse::RateLimited {
                retry_after: None,
            }))),
            structured_metadata: Some(Arc::new(MockStructuredMetadata::new(MockResponse::Error(
                "connection refused".into(),
            )))),
            language_model: Some(Arc::new(MockLanguageModel::new(MockResponse::NotFound))),
        };
        let query = SourceQuery {
            title: Some("Anything".into()),
            pdf: Some(Arc::from(&b"%PDF-1.7"[..])),
            excerpt: Some("excerpt".into()),
            hint: Some(DocumentTypeHint::Unknown),
            ..Default::default()
        };
        let report = query_sources(&sources, &query, &Config::default()).await;
        assert!(report.records.is_empty());
        let status = |k| report.outcome(k).map(|o| o.status);
        assert_eq!(status(SourceKind::Registry), Some(SourceStatus::RateLimited));
        assert_eq!(status(SourceKind::StructuredMetadata), Some(SourceStatus::Error));
        assert_eq!(status(SourceKind::LanguageModel), Some(SourceStatus::NoData));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_times_out() {
        let sources = Sources {
            language_model: Some(Arc::new(MockLanguageModel::new(MockResponse::Hang))),
            ..Default::default()
        };
        let query = SourceQuery {
            excerpt: Some("excerpt".into()),
            hint: Some(DocumentTypeHint::Thesis),
            ..Default::default()
        };
        let report = query_sources(&sources, &query, &Config::default()).await;
        let outcome = report.outcome(SourceKind::LanguageModel).unwrap();
        assert_eq!(outcome.status, SourceStatus::Timeout);
    }

    #[tokio::test]
    async fn test_hint_steers_sources() {
        let structured = Arc::new(MockStructuredMetadata::new(MockResponse::NotFound));
        let model = Arc::new(MockLanguageModel::new(MockResponse::NotFound));
        let sources = Sources {
            registry: None,
            structured_metadata: Some(structured.clone()),
            language_model: Some(model.clone()),
        };
        let mut query = SourceQuery {
            pdf: Some(Arc::from(&b"%PDF"[..])),
            excerpt: Some("excerpt".into()),
            hint: Some(DocumentTypeHint::JournalArticle),
            ..Default::default()
        };
        query_sources(&sources, &query, &Config::default()).await;
        assert_eq!((structured.call_count(), model.call_count()), (1, 0));

        query.hint = Some(DocumentTypeHint::Thesis);
        query_sources(&sources, &query, &Config::default()).await;
        assert_eq!((structured.call_count(), model.call_count()), (1, 1));
    }

    #[tokio::test]
    async fn test_registry_follow_up_with_learned_doi() {
        let registry = Arc::new(MockRegistry::with_sequence(vec![
            MockResponse::NotFound,
            MockResponse::Found(titled("Registry title for the work")),
        ]));
        let learned = BibliographicRecord {
            doi: Some("10.3354/meps123456".into()),
            ..Default::default()
        };
        let sources = Sources {
            registry: Some(registry.clone()),
            structured_metadata: Some(Arc::new(MockStructuredMetadata::new(MockResponse::Found(
                learned,
            )))),
            language_model: None,
        };
        let query = SourceQuery {
            title: Some("Registry title".into()),
            pdf: Some(Arc::from(&b"%PDF"[..])),
            hint: Some(DocumentTypeHint::JournalArticle),
            ..Default::default()
        };
        let report = query_sources(&sources, &query, &Config::default()).await;
        assert_eq!(registry.call_count(), 2);
        assert_eq!(registry.queries()[1], "10.3354/meps123456");
        assert_eq!(
            report.outcome(SourceKind::Registry).map(|o| o.status),
            Some(SourceStatus::Found)
        );
        assert!(report.records.iter().any(|r| r.source == Source::RegistryByDoi));
    }
}
