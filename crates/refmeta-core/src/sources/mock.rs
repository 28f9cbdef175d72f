//! Scripted sources for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    LanguageModelSource, RegistrySource, SourceError, SourceFuture, StructuredMetadataSource,
};
use crate::record::{BibliographicRecord, DocumentTypeHint, PartialRecord, Source};

/// A configurable mock response.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Answer with this record.
    Found(BibliographicRecord),
    /// Answer "no data".
    NotFound,
    /// Simulate a 429 rate-limit response.
    RateLimited { retry_after: Option<Duration> },
    /// Simulate a generic error.
    Error(String),
    /// Never answer, so the caller's timeout fires.
    Hang,
}

/// Response script shared by the mocks: either one fixed response or a
/// sequence (one per call, repeating the last once exhausted), with optional
/// latency and call counting.
#[derive(Debug)]
struct Script {
    responses: Mutex<Vec<MockResponse>>,
    fallback: MockResponse,
    delay: Option<Duration>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl Script {
    fn fixed(response: MockResponse) -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            fallback: response,
            delay: None,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn sequence(mut responses: Vec<MockResponse>) -> Self {
        // Reversed so pop() yields the first response.
        responses.reverse();
        let fallback = responses.first().cloned().unwrap_or(MockResponse::NotFound);
        Self {
            responses: Mutex::new(responses),
            ..Self::fixed(fallback)
        }
    }

    fn next(&self, query: &str) -> MockResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(query.to_string());
        self.responses
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    async fn answer(
        &self,
        response: MockResponse,
        source: Source,
    ) -> Result<Option<PartialRecord>, SourceError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match response {
            MockResponse::Found(record) => Ok(Some(PartialRecord::new(source, record))),
            MockResponse::NotFound => Ok(None),
            MockResponse::RateLimited { retry_after } => {
                Err(SourceError::RateLimited { retry_after })
            }
            MockResponse::Error(msg) => Err(SourceError::Unavailable(msg)),
            MockResponse::Hang => std::future::pending().await,
        }
    }
}

/// A mock [`RegistrySource`]. Lookups by DOI and by title share one script.
#[derive(Debug)]
pub struct MockRegistry {
    script: Script,
}

impl MockRegistry {
    pub fn new(response: MockResponse) -> Self {
        Self {
            script: Script::fixed(response),
        }
    }

    pub fn with_sequence(responses: Vec<MockResponse>) -> Self {
        Self {
            script: Script::sequence(responses),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    /// The DOI or title of every lookup, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.script.queries()
    }
}

impl RegistrySource for MockRegistry {
    fn name(&self) -> &str {
        "mock-registry"
    }

    fn by_doi<'a>(
        &'a self,
        doi: &'a str,
        _timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        let response = self.script.next(doi);
        Box::pin(self.script.answer(response, Source::RegistryByDoi))
    }

    fn by_title_authors<'a>(
        &'a self,
        title: &'a str,
        _authors: Option<&'a str>,
        _timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        let response = self.script.next(title);
        Box::pin(self.script.answer(response, Source::RegistryByTitle))
    }
}

/// A mock [`StructuredMetadataSource`] with a scripted header answer and a
/// fixed reference list.
#[derive(Debug)]
pub struct MockStructuredMetadata {
    script: Script,
    references: Vec<BibliographicRecord>,
}

impl MockStructuredMetadata {
    pub fn new(response: MockResponse) -> Self {
        Self {
            script: Script::fixed(response),
            references: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<BibliographicRecord>) -> Self {
        self.references = references;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }
}

impl StructuredMetadataSource for MockStructuredMetadata {
    fn name(&self) -> &str {
        "mock-structured-metadata"
    }

    fn header<'a>(
        &'a self,
        _pdf: &'a [u8],
        _timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        let response = self.script.next("header");
        Box::pin(self.script.answer(response, Source::StructuredMetadata))
    }

    fn references<'a>(
        &'a self,
        _pdf: &'a [u8],
        _timeout: Duration,
    ) -> SourceFuture<'a, Vec<PartialRecord>> {
        let response = self.script.next("references");
        Box::pin(async move {
            // Failures script the same way as for the header; any
            // non-error response yields the fixed list.
            self.script.answer(response, Source::StructuredMetadata).await?;
            Ok(self
                .references
                .iter()
                .cloned()
                .map(|r| PartialRecord::new(Source::StructuredMetadata, r))
                .collect())
        })
    }
}

/// A mock [`LanguageModelSource`].
#[derive(Debug)]
pub struct MockLanguageModel {
    script: Script,
}

impl MockLanguageModel {
    pub fn new(response: MockResponse) -> Self {
        Self {
            script: Script::fixed(response),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }
}

impl LanguageModelSource for MockLanguageModel {
    fn name(&self) -> &str {
        "mock-language-model"
    }

    fn extract<'a>(
        &'a self,
        excerpt: &'a str,
        _hint: DocumentTypeHint,
        _timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        let response = self.script.next(excerpt);
        Box::pin(self.script.answer(response, Source::LanguageModel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> BibliographicRecord {
        BibliographicRecord {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sequence_repeats_last() {
        let mock = MockRegistry::with_sequence(vec![
            MockResponse::Error("boom".into()),
            MockResponse::Found(titled("Coastal upwelling dynamics")),
        ]);
        let t = Duration::from_secs(1);
        assert!(mock.by_doi("10.1/a", t).await.is_err());
        let hit = mock.by_doi("10.1/b", t).await.unwrap().unwrap();
        assert_eq!(hit.source, Source::RegistryByDoi);
        assert!(mock.by_title_authors("x", None, t).await.unwrap().is_some());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.queries(), vec!["10.1/a", "10.1/b", "x"]);
    }

    #[tokio::test]
    async fn test_title_lookup_tags_source() {
        let mock = MockRegistry::new(MockResponse::Found(titled("A title of some length")));
        let hit = mock
            .by_title_authors("A title", Some("Smith"), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.source, Source::RegistryByTitle);
    }

    #[tokio::test]
    async fn test_structured_references() {
        let mock = MockStructuredMetadata::new(MockResponse::NotFound)
            .with_references(vec![titled("First"), titled("Second")]);
        let refs = mock.references(b"%PDF", Duration::from_secs(1)).await.unwrap();
        assert_eq!(refs.len(), 2);
        assert!(mock.header(b"%PDF", Duration::from_secs(1)).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_never_resolves() {
        let mock = MockLanguageModel::new(MockResponse::Hang);
        let res = tokio::time::timeout(
            Duration::from_secs(5),
            mock.extract("text", DocumentTypeHint::Unknown, Duration::from_secs(5)),
        )
        .await;
        assert!(res.is_err());
    }
}
