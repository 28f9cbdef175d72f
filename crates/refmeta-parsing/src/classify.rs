//! First-page document-type classification.
//!
//! Ordered cue checks; the first group that matches wins. The result only
//! steers which optional sources are asked, it never blocks a fallback.

use once_cell::sync::Lazy;
use regex::Regex;

use refmeta_core::DocumentTypeHint;
use refmeta_core::patterns::parse_journal_header;

/// Characters of first-page text the classifier looks at.
pub const CLASSIFY_MAX_CHARS: usize = 3000;

fn report_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(?:informe\s+(?:t[ée]cnico|final|de\s+avance)|technical\s+report|final\s+report|progress\s+report|report\s+no\.?|documento\s+t[ée]cnico|working\s+paper)\b",
        )
        .unwrap()
    });
    &RE
}

fn thesis_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(?:tesis|thesis|dissertation|memoria\s+(?:de\s+t[íi]tulo|para\s+optar)|para\s+optar\s+al\s+(?:grado|t[íi]tulo)|submitted\s+in\s+partial\s+fulfil(?:l)?ment|doctor\s+of\s+philosophy|magíster|magister\s+en|master\s+of\s+science)\b",
        )
        .unwrap()
    });
    &RE
}

fn chapter_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?im)^\s*(?:cap[íi]tulo|chapter)\s+(?:\d+|[IVXLC]+)\b|\bIn:\s+.+\(Eds?\.\)")
            .unwrap()
    });
    &RE
}

fn book_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(?:ISBN(?:-1[03])?[:\s]|editorial\s+\p{Lu}|primera\s+edici[óo]n|first\s+edition|all\s+rights\s+reserved|todos\s+los\s+derechos\s+reservados)",
        )
        .unwrap()
    });
    &RE
}

fn journal_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)(?:\bdoi\s*:?\s*10\.\d{4,}|\bdoi\.org/10\.|\bvol(?:\.|ume)\s*\d+|\bISSN\b|\bjournal\b|\brevista\b|\breceived\b|\brecibido\b|\baccepted\b|\baceptado\b|\barticle\s+history\b|\boriginal\s+article\b|\bresearch\s+article\b)",
        )
        .unwrap()
    });
    &RE
}

/// Classify a document from its first-page text.
///
/// Checks run report, thesis, book chapter, book, journal article. A
/// "Journal, Place, Volume: Pages, Year" header line counts as a journal cue.
pub fn classify(first_page: &str) -> DocumentTypeHint {
    let slice: String = first_page.chars().take(CLASSIFY_MAX_CHARS).collect();
    if slice.trim().is_empty() {
        return DocumentTypeHint::Unknown;
    }

    if report_re().is_match(&slice) {
        return DocumentTypeHint::TechnicalReport;
    }
    if thesis_re().is_match(&slice) {
        return DocumentTypeHint::Thesis;
    }
    if chapter_re().is_match(&slice) {
        return DocumentTypeHint::BookChapter;
    }
    if book_re().is_match(&slice) {
        return DocumentTypeHint::Book;
    }
    if journal_re().is_match(&slice)
        || slice.lines().take(15).any(|l| parse_journal_header(l).is_some())
    {
        return DocumentTypeHint::JournalArticle;
    }
    DocumentTypeHint::Unknown
}
