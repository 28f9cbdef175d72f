//! CrossRef REST API registry.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{RegistrySource, SourceError, SourceFuture, check_status, map_request_error};
use crate::authors::{format_author, join_authors};
use crate::matching::titles_match;
use crate::normalize::collapse_whitespace;
use crate::rate_limit::RequestLimiter;
use crate::record::{BibliographicRecord, DocumentType, Flag, PartialRecord, Source};

pub const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

/// Title and author queries are cut to this many characters.
const MAX_QUERY_CHARS: usize = 200;

pub struct CrossRef {
    client: reqwest::Client,
    base_url: String,
    mailto: Option<String>,
    limiter: RequestLimiter,
}

impl CrossRef {
    pub fn new(mailto: Option<String>) -> Self {
        let limiter = RequestLimiter::for_crossref(mailto.is_some());
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            mailto,
            limiter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn user_agent(&self) -> String {
        match &self.mailto {
            Some(email) => format!("refmeta/{} (mailto:{})", env!("CARGO_PKG_VERSION"), email),
            None => format!("refmeta/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// GET a CrossRef endpoint and return its `message` object. `Ok(None)` on 404.
    async fn get_message(
        &self,
        url: String,
        timeout: Duration,
    ) -> Result<Option<Value>, SourceError> {
        let url = match &self.mailto {
            Some(email) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                format!("{url}{sep}mailto={}", urlencoding::encode(email))
            }
            None => url,
        };

        self.limiter.acquire().await;
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", self.user_agent())
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if let Err(err) = check_status(&resp) {
            if matches!(err, SourceError::RateLimited { .. }) {
                self.limiter.on_rate_limited();
            }
            return Err(err);
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        if data["status"].as_str().is_some_and(|s| s != "ok") {
            return Err(SourceError::Malformed(format!(
                "status {}",
                data["status"]
            )));
        }
        Ok(Some(data["message"].clone()))
    }
}

impl RegistrySource for CrossRef {
    fn name(&self) -> &str {
        "CrossRef"
    }

    fn by_doi<'a>(
        &'a self,
        doi: &'a str,
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        Box::pin(async move {
            let url = format!("{}/works/{}", self.base_url, urlencoding::encode(doi));
            let Some(work) = self.get_message(url, timeout).await? else {
                return Ok(None);
            };
            if !work.is_object() {
                return Err(SourceError::Malformed("missing message object".into()));
            }
            tracing::debug!(doi, "crossref: work found by DOI");
            Ok(Some(PartialRecord::new(
                Source::RegistryByDoi,
                record_from_work(&work),
            )))
        })
    }

    fn by_title_authors<'a>(
        &'a self,
        title: &'a str,
        authors: Option<&'a str>,
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        Box::pin(async move {
            let query_title: String = title.chars().take(MAX_QUERY_CHARS).collect();
            let mut url = format!(
                "{}/works?query.title={}&rows=1",
                self.base_url,
                urlencoding::encode(&query_title)
            );
            if let Some(authors) = authors.filter(|a| !a.trim().is_empty()) {
                let query_authors: String = authors.chars().take(MAX_QUERY_CHARS).collect();
                url.push_str(&format!(
                    "&query.author={}",
                    urlencoding::encode(&query_authors)
                ));
            }

            let Some(message) = self.get_message(url, timeout).await? else {
                return Ok(None);
            };
            let Some(item) = message["items"].as_array().and_then(|items| items.first()) else {
                return Ok(None);
            };

            let found_title = first_string(&item["title"]).unwrap_or_default();
            if !titles_match(title, &found_title) {
                tracing::debug!(
                    query = title,
                    found = %found_title,
                    "crossref: top hit rejected, title mismatch"
                );
                return Ok(None);
            }
            Ok(Some(PartialRecord::new(
                Source::RegistryByTitle,
                record_from_work(item),
            )))
        })
    }
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    }
    .map(|s| collapse_whitespace(&s))
    .filter(|s| !s.is_empty())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn date_year(work: &Value, key: &str) -> Option<i32> {
    work[key]["date-parts"][0][0]
        .as_i64()
        .and_then(|y| i32::try_from(y).ok())
}

/// Strip JATS/HTML markup from a CrossRef abstract. A leading
/// `<jats:title>Abstract</jats:title>` heading is dropped.
pub fn strip_jats(abstract_xml: &str) -> String {
    static TITLE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)<(?:jats:)?title>.*?</(?:jats:)?title>").unwrap());
    static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
    let text = TITLE.replace_all(abstract_xml, " ");
    let text = TAG.replace_all(&text, " ");
    collapse_whitespace(
        &text
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">"),
    )
}

fn document_type(kind: &str) -> DocumentType {
    match kind {
        "journal-article" => DocumentType::JournalArticle,
        "book-chapter" | "book-section" | "book-part" => DocumentType::BookChapter,
        "book" | "monograph" | "edited-book" | "reference-book" => DocumentType::Book,
        "report" | "report-component" => DocumentType::TechnicalReport,
        "dissertation" => DocumentType::Thesis,
        "proceedings-article" => DocumentType::ConferencePaper,
        "posted-content" => DocumentType::Preprint,
        "dataset" => DocumentType::Dataset,
        _ => DocumentType::Other,
    }
}

fn language_label(code: &str) -> String {
    match code.to_lowercase().as_str() {
        "es" | "spa" => "Español".to_string(),
        "en" | "eng" => "Inglés".to_string(),
        "pt" | "por" => "Portugués".to_string(),
        "fr" | "fre" | "fra" => "Francés".to_string(),
        _ => code.to_string(),
    }
}

/// Map one CrossRef work object onto the record model.
pub fn record_from_work(work: &Value) -> BibliographicRecord {
    let mut rec = BibliographicRecord::default();

    if let Some(authors) = work["author"].as_array() {
        rec.authors = join_authors(authors.iter().filter_map(|a| {
            let family = a["family"].as_str().or_else(|| a["name"].as_str())?;
            format_author(family, a["given"].as_str())
        }));
    }

    rec.year = date_year(work, "published-print")
        .or_else(|| date_year(work, "published-online"))
        .or_else(|| date_year(work, "issued"));

    rec.title = first_string(&work["title"]);
    rec.doi = scalar_string(&work["DOI"]);
    rec.link = scalar_string(&work["URL"])
        .or_else(|| rec.doi.as_ref().map(|d| format!("https://doi.org/{d}")));
    rec.venue = first_string(&work["container-title"]);
    rec.publisher = scalar_string(&work["publisher"]);
    rec.volume = scalar_string(&work["volume"]);
    rec.issue = scalar_string(&work["issue"]).or_else(|| scalar_string(&work["article-number"]));
    rec.pages = scalar_string(&work["page"]).map(|p| crate::patterns::normalize_page_range(&p));
    rec.isbn_issn = first_string(&work["ISBN"]).or_else(|| first_string(&work["ISSN"]));
    rec.language = scalar_string(&work["language"]).map(|l| language_label(&l));

    if let Some(kind) = work["type"].as_str() {
        let doc_type = document_type(kind);
        rec.document_type = Some(doc_type);
        if doc_type == DocumentType::Other {
            rec.document_type_other = Some(kind.to_string());
        }
        if doc_type == DocumentType::JournalArticle {
            rec.peer_reviewed = Some(Flag::Yes);
        }
    }

    if work["license"].as_array().is_some_and(|l| !l.is_empty()) {
        rec.open_access = Some(Flag::Yes);
    }

    rec.abstract_text = work["abstract"]
        .as_str()
        .map(strip_jats)
        .filter(|a| !a.is_empty());

    if let Some(subjects) = work["subject"].as_array() {
        let keywords: Vec<&str> = subjects.iter().filter_map(|s| s.as_str()).collect();
        if !keywords.is_empty() {
            rec.keywords = Some(keywords.join(", "));
        }
    }

    rec
}
