//! External metadata sources and the adapter contracts the engine uses.
//!
//! Every source is an injectable, stateless collaborator. A call either
//! yields a [`PartialRecord`] or fails with a [`SourceError`]; the
//! orchestrator turns failures into "no data from this source".

pub mod crossref;
pub mod grobid;
pub mod llm;
pub mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::record::{DocumentTypeHint, PartialRecord};

/// Boxed future returned by every adapter method.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Why a source produced nothing.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited (429)")]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// A bibliographic registry queried by DOI or by title and authors.
pub trait RegistrySource: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a work by DOI. `Ok(None)` when the registry does not know it.
    fn by_doi<'a>(
        &'a self,
        doi: &'a str,
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>>;

    /// Best match for a title, optionally narrowed by authors. Implementations
    /// must reject hits whose title does not match the query.
    fn by_title_authors<'a>(
        &'a self,
        title: &'a str,
        authors: Option<&'a str>,
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>>;
}

/// A service that parses raw PDF bytes into structured header and reference
/// metadata.
pub trait StructuredMetadataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Metadata of the document itself.
    fn header<'a>(
        &'a self,
        pdf: &'a [u8],
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>>;

    /// One partial record per entry of the document's reference list.
    fn references<'a>(
        &'a self,
        pdf: &'a [u8],
        timeout: Duration,
    ) -> SourceFuture<'a, Vec<PartialRecord>>;
}

/// A language model prompted to copy fields that appear in a text excerpt.
pub trait LanguageModelSource: Send + Sync {
    fn name(&self) -> &str;

    fn extract<'a>(
        &'a self,
        excerpt: &'a str,
        hint: DocumentTypeHint,
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>>;
}

/// Map a non-success HTTP response to a [`SourceError`].
pub(crate) fn check_status(resp: &reqwest::Response) -> Result<(), SourceError> {
    crate::rate_limit::check_rate_limit_response(resp)?;
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(SourceError::Status(status.as_u16()))
    }
}

/// Treat a reqwest timeout as [`SourceError::Timeout`].
pub(crate) fn map_request_error(err: reqwest::Error, timeout: Duration) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(timeout)
    } else {
        SourceError::Http(err)
    }
}
