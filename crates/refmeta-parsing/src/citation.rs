//! Heuristic field extraction for one free-text citation.
//!
//! Identifiers are read from the raw text first and then blanked out, so the
//! normalizer cannot split them and their digits are not taken for years,
//! volumes or pages. Everything else is located relative to two anchors: the
//! end of the author list and the year delimiter.

use once_cell::sync::Lazy;
use regex::Regex;

use refmeta_core::normalize::normalize_inline;
use refmeta_core::patterns::{
    YearForm, YearMatch, doi_candidates, extract_doi, extract_isbn_issn, extract_url, find_year,
    has_author_shape, is_plausible_year, normalize_page_range, starts_with_author, years_of_form,
};
use refmeta_core::validate::is_valid_title;
use refmeta_core::{BibliographicRecord, DocumentType, PartialRecord, Source};

use crate::authors::normalize_author_list;

/// Parse one citation string into a regex-sourced partial record.
///
/// Never fails: fields that cannot be located stay empty.
pub fn parse_citation(text: &str) -> PartialRecord {
    let raw = text.trim();
    let mut record = BibliographicRecord {
        doi: extract_doi(raw),
        isbn_issn: extract_isbn_issn(raw),
        link: extract_url(raw),
        ..Default::default()
    };

    let work = strip_numbering(&normalize_inline(&blank_identifiers(raw))).to_string();
    if work.is_empty() {
        return PartialRecord::new(Source::Regex, record);
    }

    let authors = find_authors(&work);
    let author_end = authors.as_ref().map(|a| a.end);
    let year = author_end
        .and_then(|end| year_after(&work, end))
        .or_else(|| find_year(&work));

    record.authors = authors.and_then(|a| a.names);
    record.year = year.map(|y| y.year);

    // Author-year styles put the title after the year; Vancouver-style
    // citations put it straight after the author list.
    let title_start = match (author_end, year) {
        (Some(end), Some(y)) if y.start >= end && is_gap(&work[end..y.start]) => y.end,
        (Some(end), _) => end,
        (None, Some(y)) => y.end,
        (None, None) => 0,
    };

    let title = find_title(&work, title_start);
    record.title = title.title;
    let tail = &work[title.end.min(work.len())..];

    let (volume, issue, pages) = find_volume_pages(tail);
    record.volume = volume;
    record.issue = issue;
    record.pages = pages;

    if title.chapter {
        record.venue = find_book_title(tail);
        record.document_type = Some(DocumentType::BookChapter);
    } else if let Some(venue) = find_venue(tail) {
        if venue.total_pages {
            record.publisher = Some(venue.name);
        } else {
            record.venue = Some(venue.name);
        }
    }

    if record.document_type.is_none() {
        record.document_type = infer_document_type(&work, &record);
    }

    PartialRecord::new(Source::Regex, record)
}

/// Replace DOIs, URLs and labeled ISBN/ISSN values with a space.
fn blank_identifiers(raw: &str) -> String {
    static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://\S+|\bwww\.\S+").unwrap());
    static ISBN_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:ISBN|e-?ISSN|ISSN)(?:[-\s]?1[03])?\s*:?\s*[\dX][\dX\-\s]{6,16}[\dX]")
            .unwrap()
    });

    let mut spans: Vec<(usize, usize)> = doi_candidates(raw)
        .into_iter()
        .map(|c| (c.start, c.end))
        .collect();
    spans.extend(URL_RE.find_iter(raw).map(|m| (m.start(), m.end())));
    spans.extend(ISBN_RE.find_iter(raw).map(|m| (m.start(), m.end())));
    if spans.is_empty() {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut blanking = false;
    for (i, c) in raw.char_indices() {
        if spans.iter().any(|(s, e)| i >= *s && i < *e) {
            if !blanking {
                out.push(' ');
                blanking = true;
            }
        } else {
            out.push(c);
            blanking = false;
        }
    }
    out
}

/// Drop a leading `12.` / `[12]` / `12)` list marker.
fn strip_numbering(text: &str) -> &str {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[?\d{1,3}[.\])]\s+").unwrap());
    match RE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Only punctuation and whitespace.
fn is_gap(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || matches!(c, ',' | '.' | ';' | ':' | '-'))
}

struct AuthorSpan {
    names: Option<String>,
    end: usize,
}

fn author_list_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        let surname = r"(?:(?:van|von|de|del|der|da|dos|du|la|le)\s+){0,2}(?:\p{Lu}[\p{Ll}'’]+(?:[\s-]\p{Lu}[\p{Ll}'’]+)?|\p{Lu}{2,}(?:[\s-]\p{Lu}{2,})?)";
        let init = r"\p{Lu}\b\.?";
        let initials = format!(r"(?:\p{{Lu}}{{2,3}}\b|{init}(?:\s*-?\s*{init}){{0,2}})");
        let author = format!(r"{surname}(?:,\s*|\s+){initials}");
        let sep = r"(?:\s*[,;]\s*(?:(?:&|and|y)\s+)?|\s+(?:&|and|y)\s+)";
        Regex::new(&format!(
            r"^{author}(?:{sep}{author})*(?:,?\s*et\s+al\.?)?"
        ))
        .unwrap()
    });
    &RE
}

/// The author list at the start of the citation, or failing that, the
/// author-shaped text before the year cut at its first sentence end.
fn find_authors(work: &str) -> Option<AuthorSpan> {
    static SENTENCE_END: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:\p{Ll}{2,}|\))\.\s").unwrap());

    let (segment, end) = match author_list_re().find(work) {
        Some(m) => (m.as_str(), m.end()),
        None => {
            let year = find_year(work)?;
            let before = &work[..year.start];
            let end = SENTENCE_END
                .find(before)
                .map(|m| m.start() + 1)
                .unwrap_or(before.len());
            let segment = &work[..end];
            if !segment.contains(',') || !has_author_shape(segment) {
                return None;
            }
            (segment, end)
        }
    };

    let names = normalize_author_list(segment).filter(|n| has_author_shape(n));
    Some(AuthorSpan { names, end })
}

/// A year whose delimiter directly follows the author list.
fn year_after(work: &str, author_end: usize) -> Option<YearMatch> {
    YearForm::ORDERED.iter().find_map(|form| {
        years_of_form(work, *form)
            .into_iter()
            .find(|y| y.start >= author_end && is_gap(&work[author_end..y.start]))
    })
}

struct TitleSpan {
    title: Option<String>,
    /// Where venue/volume/pages text begins.
    end: usize,
    /// An `In:` marker follows the title.
    chapter: bool,
}

fn find_title(work: &str, start: usize) -> TitleSpan {
    static QUOTED: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"["“]([^"”]{10,}?)["”]"#).unwrap());
    static IN_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bIn:\s*").unwrap());
    static ENDS: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            // ". J. Mar" / ". Biol. Conserv"
            r"\.\s+\p{Lu}\p{Ll}*\.\s+\p{Lu}",
            // ". Marine Ecology Progress Series 537", ". Rev. Biol. Mar. Oceanogr. 47"
            r"\.\s+\p{Lu}[\p{L}&'’\-]*\.?(?:,?\s+(?:\p{Lu}[\p{L}&'’\-]*\.?|of|and|the|de|del|des|y|la|las|los|for|on))*,?\s+(?:[Vv]ol(?:\.|ume)?\s*)?\d",
            r"\.\s+pp?\.",
            r"(?i)\.\s+available\s",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    let start = start.min(work.len());
    let lead = work[start..]
        .find(|c: char| !(c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':')))
        .unwrap_or(work.len() - start);
    let body_start = start + lead;
    let body = &work[body_start..];
    let chapter_at = IN_MARKER.find(body).map(|m| m.start());

    if let Some(caps) = QUOTED.captures(&work[start..]) {
        if let (Some(inner), Some(whole)) = (caps.get(1), caps.get(0)) {
            let end = start + whole.end();
            return TitleSpan {
                title: clean_title(inner.as_str()),
                end,
                chapter: chapter_at.is_some_and(|at| body_start + at >= end),
            };
        }
    }

    if let Some(at) = chapter_at {
        return TitleSpan {
            title: clean_title(&body[..at]),
            end: body_start + at,
            chapter: true,
        };
    }

    let marker = ENDS.iter().filter_map(|re| re.find(body)).map(|m| m.start()).min();
    let end = marker
        .or_else(|| body.find(". "))
        .unwrap_or(body.len());
    TitleSpan {
        title: clean_title(&body[..end]),
        end: body_start + end,
        chapter: false,
    }
}

fn clean_title(candidate: &str) -> Option<String> {
    let title = candidate
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':') || c.is_whitespace())
        .trim_start_matches(|c: char| matches!(c, '.' | ',' | ';' | ':') || c.is_whitespace());
    if !is_valid_title(title) || starts_with_author(title) {
        return None;
    }
    Some(title.to_string())
}

struct Venue {
    name: String,
    /// Followed by `300 pp.`: a book's publisher, not a journal.
    total_pages: bool,
}

/// Venue sits between the title end and the first standalone number.
fn find_venue(tail: &str) -> Option<Venue> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^(?P<venue>\p{L}[^\d]*?)\s*[,;:(]?\s*(?:(?:Vol|vol|Volume)\.?\s*)?\d+(?P<pp>\s*pp\b)?",
        )
        .unwrap()
    });

    let tail = tail.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':'));
    let caps = RE.captures(tail)?;
    let name = caps
        .name("venue")?
        .as_str()
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '('))
        .to_string();
    let chars = name.chars().count();
    if !(2..=150).contains(&chars) || name.to_lowercase().starts_with("in:") {
        return None;
    }
    Some(Venue {
        name,
        total_pages: caps.name("pp").is_some(),
    })
}

/// The book title of an `In: Editors (Eds.), Book Title. Publisher, pp. 1-2` chapter.
fn find_book_title(tail: &str) -> Option<String> {
    static IN_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bIn:\s*").unwrap());
    static EDITORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(Eds?\.?\)").unwrap());
    static ENDS: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            r"\s+pp?\.",
            r"(?i)\s+available\s+from:",
            r"\.\s+\d{4}",
            r"\.\s+\p{Lu}",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    let after_in = &tail[IN_MARKER.find(tail)?.end()..];
    let book = match EDITORS.find(after_in) {
        Some(m) => &after_in[m.end()..],
        None => after_in,
    };
    let book = book.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    let end = ENDS
        .iter()
        .filter_map(|re| re.find(book))
        .map(|m| m.start())
        .min()
        .unwrap_or(book.len());
    let title = book[..end].trim().trim_end_matches(['.', ',', ';']).trim();
    if title.chars().count() > 3 {
        Some(title.to_string())
    } else {
        None
    }
}

/// Volume, issue and page range from the text after the title.
fn find_volume_pages(tail: &str) -> (Option<String>, Option<String>, Option<String>) {
    // "78: 123-145", "78(3): 123-145", "14: e0212485"
    static COLON: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?P<vol>\d{1,4})\s*(?:\((?P<issue>[^)]{1,10})\))?\s*:\s*(?P<pages>[eE]?\d+(?:\s*[-–—]\s*[eE]?\d+)?)",
        )
        .unwrap()
    });
    static VOL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bvol(?:\.|ume)?\s*(\d+)").unwrap());
    static VOL_ISSUE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(\d{1,4})\s*\((\d{1,4}(?:\s*[-–]\s*\d{1,4})?)\)").unwrap());
    static ISSUE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(?:no|n°|nº|núm|issue)\.?\s*(\d+)").unwrap());
    static PP: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\bpp?\.\s*(\d+(?:\s*[-–—]\s*\d+)?)").unwrap());
    static RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\s*[-–—]\s*(\d+)\b").unwrap());

    if let Some(caps) = COLON.captures(tail) {
        let volume = caps.name("vol").map(|m| m.as_str().to_string());
        let issue = caps.name("issue").map(|m| m.as_str().trim().to_string());
        let pages = caps.name("pages").map(|m| normalize_page_range(m.as_str()));
        return (volume, issue, pages);
    }

    let mut volume = VOL.captures(tail).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
    let mut issue = ISSUE.captures(tail).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
    if volume.is_none() {
        if let Some(caps) = VOL_ISSUE.captures(tail) {
            volume = caps.get(1).map(|m| m.as_str().to_string());
            issue = issue.or_else(|| caps.get(2).map(|m| m.as_str().to_string()));
        }
    }

    let pages = PP
        .captures(tail)
        .and_then(|c| c.get(1))
        .map(|m| normalize_page_range(m.as_str()))
        .or_else(|| {
            RANGE
                .captures_iter(tail)
                .find(|c| !is_year_range(&c[1], &c[2]))
                .and_then(|c| c.get(0))
                .map(|m| normalize_page_range(m.as_str()))
        });

    (volume, issue, pages)
}

/// `1967–73`, `2008-2010`: years, not pages.
fn is_year_range(first: &str, second: &str) -> bool {
    first.len() == 4
        && first.parse::<i32>().is_ok_and(is_plausible_year)
        && (second.len() == 2 || second.parse::<i32>().is_ok_and(is_plausible_year))
}

fn infer_document_type(work: &str, record: &BibliographicRecord) -> Option<DocumentType> {
    static THESIS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:tesis|thesis|dissertation|memoria\s+de\s+t[íi]tulo)\b").unwrap()
    });
    static REPORT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:informe|technical\s+report|report\s+no|documento\s+t[ée]cnico)\b")
            .unwrap()
    });

    if THESIS.is_match(work) {
        Some(DocumentType::Thesis)
    } else if REPORT.is_match(work) {
        Some(DocumentType::TechnicalReport)
    } else if record.publisher.is_some() {
        Some(DocumentType::Book)
    } else if record.venue.is_some() && record.volume.is_some() {
        Some(DocumentType::JournalArticle)
    } else {
        None
    }
}
