//! Deterministic merge of partial records into one final record.
//!
//! Fusion is a pure function of the *set* of partial records: candidates for
//! each field are sorted by source rank and then by value, so the input order
//! never affects the output and fusing the same input twice gives the same
//! record.

use crate::patterns::clean_doi;
use crate::record::{BibliographicRecord, DocumentType, Flag, PartialRecord, Source, TextField};
use crate::validate::{
    clean_abstract, is_valid_doi_value, is_valid_keywords, is_valid_year, looks_corrupted,
    title_looks_corrupted,
};

/// Regex titles shorter than this are considered truncated.
pub const MIN_REGEX_TITLE_CHARS: usize = 20;

/// Regex author strings shorter than this are considered truncated.
pub const MIN_REGEX_AUTHORS_CHARS: usize = 10;

/// Fields for which registry values are authoritative.
const REGISTRY_FIELDS: &[TextField] = &[
    TextField::Doi,
    TextField::IsbnIssn,
    TextField::Venue,
    TextField::Pages,
    TextField::Volume,
    TextField::Publisher,
    TextField::Issue,
    TextField::Link,
];

/// Fields with no special rule: plain rank order.
const RANKED_FIELDS: &[TextField] = &[TextField::Language, TextField::DocumentTypeOther];

/// A field value offered by one source.
#[derive(Debug, Clone)]
struct Candidate<'a> {
    source: Source,
    value: &'a str,
}

/// Rank first, then the longer value, then the lexicographically smaller one.
fn candidate_order(a: &Candidate<'_>, b: &Candidate<'_>) -> std::cmp::Ordering {
    a.source
        .rank()
        .cmp(&b.source.rank())
        .then(b.value.chars().count().cmp(&a.value.chars().count()))
        .then(a.value.cmp(b.value))
}

/// Drop every value that fails its own validation rule. Abstracts are also
/// capped here so the length comparison sees final values.
pub fn sanitize(partial: &PartialRecord) -> PartialRecord {
    let mut out = partial.clone();
    let rec = &mut out.record;

    for field in TextField::ALL {
        let value = rec.text(field).map(str::to_string);
        rec.set_text(field, value);
    }
    if rec.year.is_some_and(|y| !is_valid_year(y)) {
        rec.year = None;
        out.year_from_header = false;
    }
    rec.doi = rec
        .doi
        .as_deref()
        .map(clean_doi)
        .filter(|d| is_valid_doi_value(d));
    rec.abstract_text = rec.abstract_text.as_deref().and_then(clean_abstract);
    rec.keywords = rec.keywords.take().filter(|k| is_valid_keywords(k));
    if rec.year.is_none() {
        out.year_from_header = false;
    }
    out
}

fn candidates<'a>(partials: &'a [PartialRecord], field: TextField) -> Vec<Candidate<'a>> {
    let mut out: Vec<Candidate<'a>> = partials
        .iter()
        .filter_map(|p| {
            p.record.text(field).map(|value| Candidate {
                source: p.source,
                value,
            })
        })
        .collect();
    out.sort_by(candidate_order);
    out
}

fn best(partials: &[PartialRecord], field: TextField) -> Option<String> {
    candidates(partials, field)
        .first()
        .map(|c| c.value.to_string())
}

/// Keep the regex value unless it is missing, shorter than `min_chars`,
/// corrupted, or strictly shorter than the best alternate.
fn prefer_regex_unless_weak(
    partials: &[PartialRecord],
    field: TextField,
    min_chars: usize,
    corrupted: fn(&str) -> bool,
) -> Option<String> {
    let all = candidates(partials, field);
    let regex = all.iter().find(|c| c.source == Source::Regex);
    let alternate = all.iter().find(|c| c.source != Source::Regex);

    match (regex, alternate) {
        (None, None) => None,
        (Some(r), None) => Some(r.value.to_string()),
        (None, Some(a)) => Some(a.value.to_string()),
        (Some(r), Some(a)) => {
            let r_len = r.value.chars().count();
            let weak = r_len < min_chars
                || corrupted(r.value)
                || a.value.chars().count() > r_len;
            if weak {
                Some(a.value.to_string())
            } else {
                Some(r.value.to_string())
            }
        }
    }
}

fn fuse_year(partials: &[PartialRecord]) -> Option<i32> {
    let mut header_years: Vec<i32> = partials
        .iter()
        .filter(|p| p.source == Source::Regex && p.year_from_header)
        .filter_map(|p| p.record.year)
        .collect();
    header_years.sort_unstable();
    if let Some(year) = header_years.first() {
        return Some(*year);
    }

    let mut ranked: Vec<(u8, i32)> = partials
        .iter()
        .filter_map(|p| p.record.year.map(|y| (p.source.rank(), y)))
        .collect();
    ranked.sort_unstable();
    ranked.first().map(|(_, y)| *y)
}

/// Longest validated value; ties go to the better-ranked source, then the
/// lexicographically smaller value.
fn fuse_longest(partials: &[PartialRecord], field: TextField) -> Option<String> {
    let mut all = candidates(partials, field);
    all.sort_by(|a, b| {
        b.value
            .chars()
            .count()
            .cmp(&a.value.chars().count())
            .then(a.source.rank().cmp(&b.source.rank()))
            .then(a.value.cmp(b.value))
    });
    all.first().map(|c| c.value.to_string())
}

fn fuse_ranked<T: Copy + Ord>(
    partials: &[PartialRecord],
    get: impl Fn(&BibliographicRecord) -> Option<T>,
) -> Option<T> {
    let mut ranked: Vec<(u8, T)> = partials
        .iter()
        .filter_map(|p| get(&p.record).map(|v| (p.source.rank(), v)))
        .collect();
    ranked.sort();
    ranked.first().map(|(_, v)| *v)
}

/// Merge all partial records for one citation or document.
///
/// Each field is decided independently:
///
/// - identifier-like fields take the best-ranked source, so registry values
///   win whenever present;
/// - title and authors keep the regex value unless it is missing, too short,
///   corrupted, or an alternate is strictly longer;
/// - a year read from a journal header line wins outright, otherwise the
///   best-ranked year is used;
/// - abstract and keywords take the longest validated value.
pub fn fuse(partials: &[PartialRecord]) -> BibliographicRecord {
    let partials: Vec<PartialRecord> = partials.iter().map(sanitize).collect();
    let mut out = BibliographicRecord::default();

    for field in REGISTRY_FIELDS.iter().chain(RANKED_FIELDS) {
        out.set_text(*field, best(&partials, *field));
    }

    out.title = prefer_regex_unless_weak(
        &partials,
        TextField::Title,
        MIN_REGEX_TITLE_CHARS,
        title_looks_corrupted,
    );
    out.authors = prefer_regex_unless_weak(
        &partials,
        TextField::Authors,
        MIN_REGEX_AUTHORS_CHARS,
        looks_corrupted,
    );
    out.year = fuse_year(&partials);
    out.abstract_text = fuse_longest(&partials, TextField::Abstract);
    out.keywords = fuse_longest(&partials, TextField::Keywords);

    out.document_type = fuse_ranked::<DocumentType>(&partials, |r| r.document_type);
    out.peer_reviewed = fuse_ranked::<Flag>(&partials, |r| r.peer_reviewed);
    out.open_access = fuse_ranked::<Flag>(&partials, |r| r.open_access);

    if out.document_type != Some(DocumentType::Other) {
        out.document_type_other = None;
    }
    out
}
