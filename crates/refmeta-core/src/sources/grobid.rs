//! GROBID structured-metadata service.
//!
//! Sends the PDF to `processHeaderDocument` / `processReferences` and reads
//! the TEI reply with a streaming XML reader.

use std::time::Duration;

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use super::{
    SourceError, SourceFuture, StructuredMetadataSource, check_status, map_request_error,
};
use crate::authors::{format_author, join_authors};
use crate::normalize::collapse_whitespace;
use crate::patterns::normalize_page_range;
use crate::record::{BibliographicRecord, PartialRecord, Source};

/// Liveness check timeout.
const ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Grobid {
    client: reqwest::Client,
    base_url: String,
}

impl Grobid {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// `GET /api/isalive` answered with 200 within five seconds.
    pub async fn is_alive(&self) -> bool {
        let url = format!("{}/api/isalive", self.base_url);
        match self.client.get(&url).timeout(ALIVE_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "grobid: liveness check failed");
                false
            }
        }
    }

    async fn process(
        &self,
        endpoint: &str,
        pdf: &[u8],
        timeout: Duration,
    ) -> Result<String, SourceError> {
        if !self.is_alive().await {
            return Err(SourceError::Unavailable(format!(
                "GROBID at {} is not responding",
                self.base_url
            )));
        }
        let part = reqwest::multipart::Part::bytes(pdf.to_vec())
            .file_name("document.pdf")
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new().part("input", part);
        let url = format!("{}/api/{}", self.base_url, endpoint);
        let resp = self
            .client
            .post(&url)
            .header("Accept", "application/xml")
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error(e, timeout))?;
        check_status(&resp)?;
        resp.text()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))
    }
}

impl StructuredMetadataSource for Grobid {
    fn name(&self) -> &str {
        "GROBID"
    }

    fn header<'a>(
        &'a self,
        pdf: &'a [u8],
        timeout: Duration,
    ) -> SourceFuture<'a, Option<PartialRecord>> {
        Box::pin(async move {
            let tei = self.process("processHeaderDocument", pdf, timeout).await?;
            let record = parse_tei_header(&tei)?;
            Ok((!record.is_empty()).then(|| PartialRecord::new(Source::StructuredMetadata, record)))
        })
    }

    fn references<'a>(
        &'a self,
        pdf: &'a [u8],
        timeout: Duration,
    ) -> SourceFuture<'a, Vec<PartialRecord>> {
        Box::pin(async move {
            let tei = self.process("processReferences", pdf, timeout).await?;
            let records = parse_tei_references(&tei)?;
            tracing::debug!(count = records.len(), "grobid: references parsed");
            Ok(records
                .into_iter()
                .map(|r| PartialRecord::new(Source::StructuredMetadata, r))
                .collect())
        })
    }
}

// ── TEI parsing ──

/// Which text node is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Title { level: u8, main: bool },
    Surname,
    Forename,
    Date,
    Doi,
    Volume,
    Issue,
    Page,
    Publisher,
    Keyword,
}

/// Accumulates one `<biblStruct>`.
#[derive(Debug, Default)]
struct BiblBuilder {
    analytic_title: Option<String>,
    main_title: Option<String>,
    journal_title: Option<String>,
    monogr_title: Option<String>,
    any_title: Option<String>,
    authors: Vec<String>,
    year: Option<i32>,
    doi: Option<String>,
    volume: Option<String>,
    issue: Option<String>,
    page_from: Option<String>,
    page_to: Option<String>,
    page_texts: Vec<String>,
    publisher: Option<String>,
}

impl BiblBuilder {
    fn finish(self) -> BibliographicRecord {
        let pages = match (self.page_from, self.page_to) {
            (Some(from), Some(to)) => Some(format!("{from}-{to}")),
            (Some(from), None) => Some(from),
            _ if !self.page_texts.is_empty() => {
                Some(normalize_page_range(&self.page_texts.join("-")))
            }
            _ => None,
        };
        // Without an analytic part the monograph title is the work itself.
        let container = if self.analytic_title.is_some() {
            self.journal_title.or(self.monogr_title)
        } else {
            self.journal_title
        };
        BibliographicRecord {
            title: self.main_title.or(self.analytic_title).or(self.any_title),
            authors: join_authors(&self.authors),
            year: self.year,
            doi: self.doi,
            venue: container,
            volume: self.volume,
            issue: self.issue,
            pages,
            publisher: self.publisher,
            ..Default::default()
        }
    }
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| {
            let raw = String::from_utf8_lossy(&a.value);
            unescape(&raw).ok().map(|v| v.into_owned())
        })
}

fn year_of(value: &str) -> Option<i32> {
    value.get(..4).and_then(|y| y.parse().ok())
}

fn keep(slot: &mut Option<String>, value: String) {
    slot.get_or_insert(value);
}

/// Streaming walk over a TEI document.
#[derive(Default)]
struct TeiWalker {
    bibls: Vec<BibliographicRecord>,
    current: Option<BiblBuilder>,
    capture: Option<(Capture, String)>,
    surname: Option<String>,
    forenames: Vec<String>,
    in_author: bool,
    in_monogr: bool,
    abstract_depth: usize,
    abstract_text: String,
    header_title: Option<String>,
    keywords: Vec<String>,
}

impl TeiWalker {
    fn open(&mut self, e: &BytesStart<'_>, empty: bool) {
        let local = e.local_name();
        match local.as_ref() {
            b"biblStruct" if !empty => self.current = Some(BiblBuilder::default()),
            b"monogr" => self.in_monogr = !empty,
            b"author" => self.in_author = !empty,
            b"persName" if self.in_author => {
                self.surname = None;
                self.forenames.clear();
            }
            b"abstract" if !empty => self.abstract_depth = 1,
            _ if self.abstract_depth > 0 && !empty => self.abstract_depth += 1,
            _ => {}
        }

        let capture = match local.as_ref() {
            b"title" => Some(Capture::Title {
                level: attr(e, b"level").and_then(|l| l.bytes().next()).unwrap_or(0),
                main: attr(e, b"type").as_deref() == Some("main"),
            }),
            b"surname" if self.in_author => Some(Capture::Surname),
            b"forename" if self.in_author => Some(Capture::Forename),
            b"date" => {
                if let Some(year) = attr(e, b"when").as_deref().and_then(year_of) {
                    self.set_year(year);
                    None
                } else {
                    Some(Capture::Date)
                }
            }
            b"idno" if attr(e, b"type").is_some_and(|t| t.eq_ignore_ascii_case("doi")) => {
                Some(Capture::Doi)
            }
            b"biblScope" => self.open_scope(e),
            b"publisher" => Some(Capture::Publisher),
            b"term" => Some(Capture::Keyword),
            _ => None,
        };
        if let Some(c) = capture.filter(|_| !empty) {
            self.capture = Some((c, String::new()));
        }
    }

    fn open_scope(&mut self, e: &BytesStart<'_>) -> Option<Capture> {
        let unit = attr(e, b"unit");
        let current = self.current.as_mut()?;
        match unit.as_deref() {
            Some("volume") => Some(Capture::Volume),
            Some("issue") => Some(Capture::Issue),
            Some("page") => {
                let from = attr(e, b"from");
                let to = attr(e, b"to");
                if from.is_some() {
                    current.page_from = from;
                    current.page_to = to;
                    None
                } else {
                    Some(Capture::Page)
                }
            }
            _ => None,
        }
    }

    fn set_year(&mut self, year: i32) {
        if let Some(current) = self.current.as_mut() {
            current.year.get_or_insert(year);
        }
    }

    fn text(&mut self, text: &str) {
        if self.abstract_depth > 0 {
            self.abstract_text.push_str(text);
            self.abstract_text.push(' ');
        }
        if let Some((_, buf)) = self.capture.as_mut() {
            buf.push_str(text);
        }
    }

    fn close(&mut self, local: &[u8]) {
        if let Some((capture, buf)) = self.capture.take() {
            let ends_capture = matches!(
                (capture, local),
                (Capture::Title { .. }, b"title")
                    | (Capture::Surname, b"surname")
                    | (Capture::Forename, b"forename")
                    | (Capture::Date, b"date")
                    | (Capture::Doi, b"idno")
                    | (Capture::Volume | Capture::Issue | Capture::Page, b"biblScope")
                    | (Capture::Publisher, b"publisher")
                    | (Capture::Keyword, b"term")
            );
            if ends_capture {
                self.store(capture, collapse_whitespace(&buf));
            } else {
                self.capture = Some((capture, buf));
            }
        }

        match local {
            b"persName" if self.in_author => {
                if let Some(surname) = self.surname.take() {
                    let given = self.forenames.join(" ");
                    let given = (!given.is_empty()).then_some(given.as_str());
                    if let (Some(author), Some(current)) =
                        (format_author(&surname, given), self.current.as_mut())
                    {
                        current.authors.push(author);
                    }
                }
                self.forenames.clear();
            }
            b"author" => self.in_author = false,
            b"monogr" => self.in_monogr = false,
            b"biblStruct" => {
                if let Some(builder) = self.current.take() {
                    let record = builder.finish();
                    if !record.is_empty() {
                        self.bibls.push(record);
                    }
                }
            }
            _ => {}
        }
        if self.abstract_depth > 0 {
            self.abstract_depth -= 1;
        }
    }

    fn store(&mut self, capture: Capture, value: String) {
        if value.is_empty() {
            return;
        }
        match capture {
            Capture::Surname => self.surname = Some(value),
            Capture::Forename => self.forenames.push(value),
            Capture::Keyword => self.keywords.push(value),
            Capture::Title { main: true, .. } if self.current.is_none() => {
                self.header_title.get_or_insert(value);
            }
            _ => {
                let in_monogr = self.in_monogr;
                let Some(current) = self.current.as_mut() else {
                    return;
                };
                match capture {
                    Capture::Title { level, main } => {
                        if main {
                            keep(&mut current.main_title, value.clone());
                        }
                        match level {
                            b'a' => keep(&mut current.analytic_title, value.clone()),
                            b'j' => keep(&mut current.journal_title, value.clone()),
                            _ if in_monogr => keep(&mut current.monogr_title, value.clone()),
                            _ => {}
                        }
                        keep(&mut current.any_title, value);
                    }
                    Capture::Date => {
                        if let Some(year) = year_of(&value) {
                            current.year.get_or_insert(year);
                        }
                    }
                    Capture::Doi => keep(&mut current.doi, value),
                    Capture::Volume => keep(&mut current.volume, value),
                    Capture::Issue => keep(&mut current.issue, value),
                    Capture::Page => current.page_texts.push(value),
                    Capture::Publisher => keep(&mut current.publisher, value),
                    Capture::Surname | Capture::Forename | Capture::Keyword => {}
                }
            }
        }
    }
}

fn walk(xml: &str) -> Result<TeiWalker, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut walker = TeiWalker::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => walker.open(e, false),
            Ok(Event::Empty(ref e)) => walker.open(e, true),
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                walker.text(&text);
            }
            Ok(Event::End(ref e)) => walker.close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Malformed(format!("TEI parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(walker)
}

/// Document metadata from a `processHeaderDocument` TEI reply.
pub fn parse_tei_header(xml: &str) -> Result<BibliographicRecord, SourceError> {
    let walker = walk(xml)?;
    let mut record = walker.bibls.into_iter().next().unwrap_or_default();
    if walker.header_title.is_some() {
        record.title = walker.header_title;
    }
    let abstract_text = collapse_whitespace(&walker.abstract_text);
    if !abstract_text.is_empty() {
        record.abstract_text = Some(abstract_text);
    }
    if !walker.keywords.is_empty() {
        record.keywords = Some(walker.keywords.join(", "));
    }
    Ok(record)
}

/// One record per `<biblStruct>` of a `processReferences` TEI reply.
pub fn parse_tei_references(xml: &str) -> Result<Vec<BibliographicRecord>, SourceError> {
    Ok(walk(xml)?.bibls)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_TEI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader>
    <fileDesc>
      <titleStmt><title level="a" type="main">Seasonal upwelling off central Chile</title></titleStmt>
      <sourceDesc>
        <biblStruct>
          <analytic>
            <author><persName><forename type="first">Rubén</forename><surname>Escribano</surname></persName></author>
            <author><persName><forename type="first">Pamela</forename><forename type="middle">A</forename><surname>Hidalgo</surname></persName></author>
            <idno type="DOI">10.3354/meps11458</idno>
          </analytic>
          <monogr>
            <imprint><date type="published" when="2015-10-01">October 2015</date></imprint>
          </monogr>
        </biblStruct>
      </sourceDesc>
    </fileDesc>
    <profileDesc>
      <textClass><keywords><term>upwelling</term><term>zooplankton</term></keywords></textClass>
      <abstract><div><p>We describe the seasonal cycle of upwelling.</p><p>Data span ten years.</p></div></abstract>
    </profileDesc>
  </teiHeader>
</TEI>"#;

    const REFERENCES_TEI: &str = r#"<TEI xmlns="http://www.tei-c.org/ns/1.0"><text><back><div><listBibl>
<biblStruct xml:id="b0">
  <analytic>
    <title level="a" type="main">A study of coastal upwelling</title>
    <author><persName><forename type="first">J</forename><surname>Smith</surname></persName></author>
    <author><persName><forename type="first">A</forename><surname>Doe</surname></persName></author>
  </analytic>
  <monogr>
    <title level="j">J. Mar. Syst.</title>
    <imprint>
      <biblScope unit="volume">78</biblScope>
      <biblScope unit="page" from="123" to="145" />
      <date type="published" when="2009" />
    </imprint>
  </monogr>
</biblStruct>
<biblStruct xml:id="b1">
  <monogr>
    <title level="m">Oceanografía de Chile</title>
    <author><persName><surname>Pizarro</surname></persName></author>
    <imprint><publisher>Editorial Universitaria</publisher><biblScope unit="page">10</biblScope><biblScope unit="page">20</biblScope><date>1999</date></imprint>
  </monogr>
</biblStruct>
</listBibl></div></back></text></TEI>"#;

    #[test]
    fn test_parse_tei_header() {
        let rec = parse_tei_header(HEADER_TEI).unwrap();
        assert_eq!(rec.title.as_deref(), Some("Seasonal upwelling off central Chile"));
        assert_eq!(rec.authors.as_deref(), Some("Escribano, R., Hidalgo, P. A."));
        assert_eq!(rec.year, Some(2015));
        assert_eq!(rec.doi.as_deref(), Some("10.3354/meps11458"));
        assert_eq!(
            rec.abstract_text.as_deref(),
            Some("We describe the seasonal cycle of upwelling. Data span ten years.")
        );
        assert_eq!(rec.keywords.as_deref(), Some("upwelling, zooplankton"));
    }

    #[test]
    fn test_parse_tei_references() {
        let refs = parse_tei_references(REFERENCES_TEI).unwrap();
        assert_eq!(refs.len(), 2);

        let first = &refs[0];
        assert_eq!(first.title.as_deref(), Some("A study of coastal upwelling"));
        assert_eq!(first.authors.as_deref(), Some("Smith, J., Doe, A."));
        assert_eq!(first.venue.as_deref(), Some("J. Mar. Syst."));
        assert_eq!(first.volume.as_deref(), Some("78"));
        assert_eq!(first.pages.as_deref(), Some("123-145"));
        assert_eq!(first.year, Some(2009));

        let second = &refs[1];
        assert_eq!(second.title.as_deref(), Some("Oceanografía de Chile"));
        assert_eq!(second.venue, None);
        assert_eq!(second.authors.as_deref(), Some("Pizarro"));
        assert_eq!(second.pages.as_deref(), Some("10-20"));
        assert_eq!(second.publisher.as_deref(), Some("Editorial Universitaria"));
        assert_eq!(second.year, Some(1999));
    }

    #[test]
    fn test_malformed_tei_is_an_error() {
        assert!(parse_tei_references("<TEI><biblStruct></TEI>").is_err());
    }

    #[test]
    fn test_empty_tei_gives_no_records() {
        assert!(parse_tei_references("<TEI/>").unwrap().is_empty());
        assert!(parse_tei_header("<TEI/>").unwrap().is_empty());
    }

    #[test]
    fn test_attribute_values_are_unescaped() {
        let e = BytesStart::from_content(r#"idno type="D&#79;I" subtype="a&amp;b""#, 4);
        assert_eq!(attr(&e, b"type").as_deref(), Some("DOI"));
        assert_eq!(attr(&e, b"subtype").as_deref(), Some("a&b"));
        assert_eq!(attr(&e, b"missing"), None);
    }
}
