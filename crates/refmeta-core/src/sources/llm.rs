//! Constrained-prompt extraction through an HTTP messages API.
//!
//! The model is asked to copy fields that appear verbatim in an excerpt of
//! the document's first pages and to answer with one JSON object. Replies
//! are parsed strictly; anything that is not a single JSON object is treated
//! as "no data".

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::{LanguageModelSource, SourceError, SourceFuture, check_status, map_request_error};
use crate::normalize::collapse_whitespace;
use crate::patterns::is_plausible_year;
use crate::record::{
    BibliographicRecord, DocumentType, DocumentTypeHint, Flag, PartialRecord, Source, TextField,
};
use crate::validate::{clean_abstract, is_valid_title};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
const API_VERSION: &str = "2023-06-01";

/// Marker appended to an excerpt that was cut.
const EXCERPT_TRUNCATED: &str = "\n[... text truncated ...]";

/// Join the text of the first `max_pages` pages into a prompt excerpt.
///
/// `None` when the text is shorter than `min_chars`; longer text is cut to
/// `max_chars` characters.
pub fn build_excerpt(
    pages: &[String],
    max_pages: usize,
    min_chars: usize,
    max_chars: usize,
) -> Option<String> {
    let text = pages
        .iter()
        .take(max_pages)
        .enumerate()
        .filter(|(_, p)| !p.trim().is_empty())
        .map(|(i, p)| format!("--- PAGE {} ---\n{}\n", i + 1, p.trim()))
        .collect::<Vec<_>>()
        .join("\n");
    let len = text.chars().count();
    if len < min_chars {
        return None;
    }
    if len > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        return Some(cut + EXCERPT_TRUNCATED);
    }
    Some(text)
}

/// Prompt asking for a single JSON object with the record's field names.
pub fn build_prompt(excerpt: &str, hint: DocumentTypeHint) -> String {
    let types = DocumentType::ALL
        .iter()
        .map(|t| format!("   - \"{}\"", t.label()))
        .collect::<Vec<_>>()
        .join("\n");
    let hint_line = match hint {
        DocumentTypeHint::Unknown => String::new(),
        other => format!("Detected document type: {}\n\n", other.name()),
    };
    format!(
        r#"You extract bibliographic metadata from the first pages of a document.

{hint_line}DOCUMENT TEXT:
{excerpt}

RULES:
1. Only copy information that is explicitly written in the text above.
2. Never infer, complete or invent values, and never use outside knowledge.
3. Use null for every field that does not appear in the text.
4. Authors: every author found, formatted "Surname, I., Surname, I.".
5. Journal articles often carry a header line "Journal, Place, Volume: Pages, Year",
   for example "Invest. Mar., Valparaíso, 28: 39-52, 2000": venue "Invest. Mar., Valparaíso",
   volume "28", pages "39-52", year 2000. A year from that line is more reliable than
   years mentioned in the abstract or body.
6. documentType must be one of these exact values, or null:
{types}
7. abstract: the document's own abstract only, never footer text, URLs or copyright notices.
8. peerReviewed and openAccess: "Sí" or "No" only when the text states it, else null.

Reply with ONLY this JSON object and no other text:
{{
  "title": null, "authors": null, "year": null, "documentType": null, "documentTypeOther": null,
  "venue": null, "publisher": null, "volume": null, "issueOrArticleNumber": null, "pages": null,
  "doi": null, "isbnIssn": null, "link": null, "language": null, "abstract": null,
  "keywords": null, "peerReviewed": null, "openAccess": null
}}"#
    )
}

fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => collapse_whitespace(s),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(collapse_whitespace)
            .collect::<Vec<_>>()
            .join(", "),
        _ => return None,
    };
    let lowered = text.to_lowercase();
    if text.is_empty() || lowered == "null" || lowered == "none" || lowered == "n/a" {
        None
    } else {
        Some(text)
    }
}

fn year_value(value: &Value) -> Option<i32> {
    let year = match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }?;
    is_plausible_year(year).then_some(year)
}

/// Parse a model reply into a record.
///
/// The outermost `{…}` span must be one JSON object. `"null"` and empty
/// strings are absent, years must be plausible, titles must be 10–500
/// characters and abstracts must pass validation.
pub fn parse_reply(reply: &str) -> Result<BibliographicRecord, SourceError> {
    let start = reply
        .find('{')
        .ok_or_else(|| SourceError::Malformed("no JSON object in reply".into()))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| SourceError::Malformed("unterminated JSON object".into()))?;
    let value: Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| SourceError::Malformed(format!("invalid JSON: {e}")))?;
    let Value::Object(obj) = value else {
        return Err(SourceError::Malformed("reply is not a JSON object".into()));
    };

    let mut rec = BibliographicRecord::default();
    let fields = [
        ("authors", TextField::Authors),
        ("title", TextField::Title),
        ("venue", TextField::Venue),
        ("publisher", TextField::Publisher),
        ("volume", TextField::Volume),
        ("issueOrArticleNumber", TextField::Issue),
        ("pages", TextField::Pages),
        ("doi", TextField::Doi),
        ("isbnIssn", TextField::IsbnIssn),
        ("link", TextField::Link),
        ("language", TextField::Language),
        ("documentTypeOther", TextField::DocumentTypeOther),
        ("abstract", TextField::Abstract),
        ("keywords", TextField::Keywords),
    ];
    for (key, field) in fields {
        rec.set_text(field, obj.get(key).and_then(text_value));
    }

    rec.year = obj.get("year").and_then(year_value);
    rec.title = rec.title.filter(|t| is_valid_title(t));
    rec.abstract_text = rec.abstract_text.as_deref().and_then(clean_abstract);
    rec.document_type = obj
        .get("documentType")
        .and_then(text_value)
        .and_then(|t| DocumentType::from_label(&t));
    rec.peer_reviewed = obj
        .get("peerReviewed")
        .and_then(text_value)
        .and_then(|f| Flag::from_label(&f));
    rec.open_access = obj
        .get("openAccess")
        .and_then(text_value)
        .and_then(|f| Flag::from_label(&f));
    Ok(rec)
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// A model reached through an Anthropic-style `/v1/messages` endpoint.
pub struct MessagesModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl MessagesModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, SourceError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;
        check_status(&resp)?;
        let data: Value = resp
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        data["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
            .map(str::to_string)
            .ok_or_else(|| SourceError::Malformed("reply has no text content".into()))
    }
}

impl std::fmt::Debug for MessagesModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagesModel")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LanguageModelSource for MessagesModel {
    fn name(&self) -> &str {
        "language-model"
    }

    fn extract<'a>(
        &'a self,
        excerpt: &'a str,
        hint: DocumentTypeHint,
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        Box::pin(async move {
            let prompt = build_prompt(excerpt, hint);
            let reply = self.complete(&prompt, timeout).await?;
            let record = parse_reply(&reply)?;
            tracing::debug!(fields = record.filled_fields(), "language model: reply parsed");
            Ok((!record.is_empty()).then(|| PartialRecord::new(Source::LanguageModel, record)))
        })
    }
}
