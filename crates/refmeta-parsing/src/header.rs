//! A document's own metadata from the text of its first pages.

use once_cell::sync::Lazy;
use regex::Regex;

use refmeta_core::authors::{format_author, join_authors};
use refmeta_core::normalize::{collapse_whitespace, normalize_inline};
use refmeta_core::patterns::{
    contains_email, extract_doi, extract_isbn_issn, find_year, has_author_shape,
    is_identifier_line, is_metadata_line, is_plausible_year, is_running_header,
    parse_journal_header, starts_with_author,
};
use refmeta_core::validate::{clean_abstract, is_valid_keywords, is_valid_title};
use refmeta_core::{BibliographicRecord, PartialRecord, Source};

use crate::authors::normalize_author_list;
use crate::config::ParsingConfig;
use crate::text_processing::clean_page_text;

/// First-page lines considered for the title.
const TITLE_SEARCH_LINES: usize = 20;
/// Lines after the title searched for an author line.
const AUTHOR_SEARCH_LINES: usize = 8;
/// Function words needed before a language is guessed.
const MIN_LANGUAGE_EVIDENCE: usize = 20;

pub const LANGUAGE_SPANISH: &str = "Español";
pub const LANGUAGE_ENGLISH: &str = "Inglés";

/// Parse the header of a document from its page texts.
pub fn parse_header(pages: &[String]) -> PartialRecord {
    parse_header_with_config(pages, &ParsingConfig::default())
}

/// Config-aware version of [`parse_header`].
pub(crate) fn parse_header_with_config(pages: &[String], config: &ParsingConfig) -> PartialRecord {
    let header_pages: Vec<String> = pages
        .iter()
        .take(config.header_pages)
        .map(|p| clean_page_text(p, config))
        .collect();
    let text = header_pages.join("\n");
    if text.trim().is_empty() {
        return PartialRecord::empty(Source::Regex);
    }

    let mut record = BibliographicRecord {
        doi: extract_doi(&text),
        isbn_issn: extract_isbn_issn(&text),
        ..Default::default()
    };
    let mut year_from_header = false;

    let lines: Vec<String> = header_pages
        .first()
        .map(|p| {
            p.lines()
                .map(normalize_inline)
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if let Some(header) = lines.iter().find_map(|l| parse_journal_header(l)) {
        record.year = Some(header.year);
        record.venue = Some(header.venue_with_place());
        record.volume = Some(header.volume.clone());
        record.issue = header.issue.clone();
        record.pages = Some(header.pages.clone());
        year_from_header = true;
    } else {
        record.year = labeled_year(&text).or_else(|| {
            let top = lines.iter().take(TITLE_SEARCH_LINES).cloned().collect::<Vec<_>>();
            find_year(&top.join("\n")).map(|y| y.year)
        });
        record.venue = published_in(&text);
    }

    let title_at = lines
        .iter()
        .take(TITLE_SEARCH_LINES)
        .position(|l| is_title_candidate(l));
    if let Some(at) = title_at {
        let mut title = lines[at].clone();
        if config.title_continuation {
            if let Some(next) = lines.get(at + 1) {
                if continues_title(&title, next) {
                    title = format!("{title} {next}");
                }
            }
        }
        record.title = Some(title).filter(|t| is_valid_title(t));
    }

    record.authors = labeled_authors(&text).or_else(|| {
        let from = title_at.map(|i| i + 1).unwrap_or(0);
        lines
            .iter()
            .skip(from)
            .take(AUTHOR_SEARCH_LINES)
            .take_while(|l| !is_abstract_heading(l))
            .filter(|l| is_author_line(l))
            .find_map(|l| header_author_list(l))
    });

    record.abstract_text = find_abstract(&text);
    record.keywords = find_keywords(&text);
    record.language = guess_language(&text).map(str::to_string);

    PartialRecord {
        source: Source::Regex,
        record,
        year_from_header,
    }
}

fn is_title_candidate(line: &str) -> bool {
    static EXCLUDE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^vol(?:\.|ume)?\s*\d+|^\d+\s*:\s*\d+\s*[-–]\s*\d+|©|\bissn\b|\bisbn\b").unwrap()
    });
    static JOURNAL_BANNER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b(?:JOURNAL|REVISTA|SERIES|PROGRESS|BULLETIN|BOLET[ÍI]N)\b").unwrap());

    let len = line.chars().count();
    if !(16..300).contains(&len) {
        return false;
    }
    let shouting = !line.chars().any(char::is_lowercase);
    !(EXCLUDE.is_match(line)
        || (shouting && JOURNAL_BANNER.is_match(line))
        || parse_journal_header(line).is_some()
        || is_metadata_line(line)
        || is_identifier_line(line)
        || is_running_header(line)
        || line.to_lowercase().contains("doi:")
        || contains_email(line)
        || line.contains('@')
        || starts_with_author(line)
        || is_affiliation(line)
        || line.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()))
}

/// The next line continues a title that was cut: it opens in lowercase, or
/// the title ends on a connecting word.
fn continues_title(title: &str, next: &str) -> bool {
    static CONNECTOR_END: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:of|and|the|in|on|for|to|with|a|an|de|del|la|las|el|los|y|en|para|con|sobre)$")
            .unwrap()
    });
    if title.ends_with(['.', '?', '!']) || next.chars().count() > 150 {
        return false;
    }
    // Institution words also occur inside titles ("... de laboratorio");
    // only a capitalized line can be an affiliation.
    let opens_lowercase = next.chars().next().is_some_and(char::is_lowercase);
    if is_metadata_line(next)
        || is_identifier_line(next)
        || contains_email(next)
        || starts_with_author(next)
        || (!opens_lowercase && is_affiliation(next))
        || is_author_line(next)
    {
        return false;
    }
    opens_lowercase || CONNECTOR_END.is_match(title)
}

fn is_affiliation(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:universidad|university|universit[ée]|departamento|department|instituto|institute|facultad|faculty|laboratorio|laboratory|centro\s+de|center\s+for|centre\s+for|school\s+of|escuela\s+de)\b")
            .unwrap()
    });
    RE.is_match(line)
}

fn is_abstract_heading(line: &str) -> bool {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^\s*(?:abstract|resumen|summary)\b").unwrap());
    RE.is_match(line)
}

/// Year printed next to a publication label: `© 2015`, `Published: 3 May 2015`.
fn labeled_year(text: &str) -> Option<i32> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(?:©|copyright|published|publicado|accepted|aceptado|received|recibido)[^\n]{0,80}?\b((?:19|20)\d{2})\b")
            .unwrap()
    });
    RE.captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<i32>().ok())
        .filter(|y| is_plausible_year(*y))
        .max()
}

fn published_in(text: &str) -> Option<String> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?im)^\s*published\s+in\s*:?\s*([^\n,]{3,150})").unwrap());
    let caps = RE.captures(text)?;
    let venue = caps.get(1)?.as_str().trim().trim_end_matches('.');
    (!venue.is_empty()).then(|| venue.to_string())
}

fn labeled_authors(text: &str) -> Option<String> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?im)^\s*(?:authors?|autor(?:es)?)\s*:\s*(.+)$").unwrap());
    let caps = RE.captures(text)?;
    header_author_list(caps.get(1)?.as_str())
}

/// Footnote markers glued to names: digits, asterisks, daggers.
fn strip_markers(line: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d*†‡§¹²³⁴⁵⁶⁷⁸⁹⁰]+").unwrap());
    collapse_whitespace(&RE.replace_all(line, ""))
}

fn full_name_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\p{Lu}[\p{Ll}]*\.?(?:[\s-]+\p{Lu}[\p{Ll}]*\.?)*(?:\s+(?:de|del|de\s+la|van|von|da|dos))?\s+\p{Lu}[\p{Ll}'’]+(?:-\p{Lu}[\p{Ll}'’]+)?$")
            .unwrap()
    });
    &RE
}

fn split_names(line: &str) -> Vec<String> {
    static SEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*(?:,|;|&|\band\b|\by\b)\s*").unwrap());
    SEP.split(line)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// A line listing people, either `Surname, I.` or `Given Surname` style.
fn is_author_line(line: &str) -> bool {
    if contains_email(line) || line.contains('©') || is_affiliation(line) || is_metadata_line(line) {
        return false;
    }
    let stripped = strip_markers(line);
    let len = stripped.chars().count();
    if !(5..300).contains(&len) {
        return false;
    }
    if has_author_shape(&stripped) {
        return true;
    }
    let names = split_names(&stripped);
    let matching = names.iter().filter(|n| full_name_re().is_match(n)).count();
    matching > 0 && matching == names.len() && (names.len() > 1 || len <= 40)
}

/// `Juan Pérez1, María Soto2 y Luis González1` → `Pérez, J., Soto, M., González, L.`
fn header_author_list(line: &str) -> Option<String> {
    let stripped = strip_markers(line);
    if has_author_shape(&stripped) {
        return normalize_author_list(&stripped);
    }
    let authors = split_names(&stripped)
        .iter()
        .filter(|n| full_name_re().is_match(n))
        .filter_map(|name| {
            let words: Vec<&str> = name.split_whitespace().collect();
            let (given, family) = words.split_at(words.len().saturating_sub(1));
            // Lowercase particles belong to the surname.
            let particles = given
                .iter()
                .rev()
                .take_while(|w| w.chars().next().is_some_and(char::is_lowercase))
                .count();
            let (given, particles) = given.split_at(given.len() - particles);
            let family = particles
                .iter()
                .chain(family.iter())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            let given = given.join(" ");
            format_author(&family, (!given.is_empty()).then_some(given.as_str()))
        })
        .collect::<Vec<_>>();
    join_authors(authors)
}

fn stop_re() -> &'static Regex {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?im)\n[^\S\n]*\n|^[^\S\n]*(?:key\s*words?|palabras\s+clave|introduction|introducci[óo]n|abstract|resumen|summary)\b|^[^\S\n]*1\.?\s+\p{Lu}")
            .unwrap()
    });
    &RE
}

/// Text under an Abstract / Resumen / Summary heading, validated.
fn find_abstract(text: &str) -> Option<String> {
    static HEADING: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?im)^[^\S\n]*(?:abstract|resumen|summary)\b[^\S\n]*[:.\-–—]?[^\S\n]*\n?")
            .unwrap()
    });
    HEADING.find_iter(text).find_map(|heading| {
        let body = &text[heading.end()..];
        let end = stop_re().find(body).map(|m| m.start()).unwrap_or(body.len());
        clean_abstract(&collapse_whitespace(&body[..end]))
    })
}

/// Keywords / Key words / Palabras clave, 5 to 500 characters.
fn find_keywords(text: &str) -> Option<String> {
    static HEADING: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(?:key\s*words?|palabras\s+clave)[^\S\n]*[:.\-–—][^\S\n]*").unwrap()
    });
    HEADING.find_iter(text).find_map(|heading| {
        let body = &text[heading.end()..];
        let end = stop_re().find(body).map(|m| m.start()).unwrap_or(body.len());
        let keywords: String = body[..end].lines().take(2).collect::<Vec<_>>().join(" ");
        let keywords = collapse_whitespace(&keywords);
        let keywords = keywords.trim_end_matches(['.', ';', ',']).to_string();
        is_valid_keywords(&keywords).then_some(keywords)
    })
}

/// Spanish vs English by function-word frequency.
pub fn guess_language(text: &str) -> Option<&'static str> {
    const SPANISH: &[&str] = &[
        "de", "la", "el", "los", "las", "y", "en", "del", "que", "por", "para", "con", "una",
        "se", "al",
    ];
    const ENGLISH: &[&str] = &[
        "the", "of", "and", "in", "to", "with", "for", "is", "are", "that", "from", "this",
        "was", "were", "by",
    ];

    let (mut es, mut en) = (0usize, 0usize);
    for word in text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if SPANISH.contains(&word.as_str()) {
            es += 1;
        }
        if ENGLISH.contains(&word.as_str()) {
            en += 1;
        }
    }
    if es + en < MIN_LANGUAGE_EVIDENCE {
        return None;
    }
    Some(if es > en {
        LANGUAGE_SPANISH
    } else {
        LANGUAGE_ENGLISH
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParsingConfigBuilder;

    fn page() -> String {
        [
            "Invest. Mar., Valparaíso, 28: 39-52, 2000",
            "Crecimiento y mortalidad de larvas de Concholepas concholepas",
            "en condiciones de laboratorio",
            "Juan Pérez1, María Soto2 y Luis González1",
            "1Departamento de Biología Marina, Universidad Católica del Norte, Coquimbo, Chile",
            "jperez@ucn.cl",
            "RESUMEN. Se estudió el crecimiento de larvas de Concholepas concholepas en condiciones",
            "controladas de laboratorio durante 60 días, registrando la mortalidad diaria y la talla",
            "de cada individuo en el año 1998.",
            "Palabras clave: Concholepas, larvas, crecimiento, Chile.",
            "",
            "INTRODUCCIÓN",
            "El loco es un recurso de gran importancia para la pesca artesanal de Chile y del Perú.",
        ]
        .join("\n")
    }

    #[test]
    fn test_journal_header_line() {
        let record = parse_header(&[page()]);
        assert!(record.year_from_header);
        let r = record.record;
        assert_eq!(r.year, Some(2000));
        assert_eq!(r.venue.as_deref(), Some("Invest. Mar., Valparaíso"));
        assert_eq!(r.volume.as_deref(), Some("28"));
        assert_eq!(r.pages.as_deref(), Some("39-52"));
    }

    #[test]
    fn test_title_and_authors() {
        let r = parse_header(&[page()]).record;
        assert_eq!(
            r.title.as_deref(),
            Some("Crecimiento y mortalidad de larvas de Concholepas concholepas")
        );
        assert_eq!(
            r.authors.as_deref(),
            Some("Pérez, J., Soto, M., González, L.")
        );
    }

    #[test]
    fn test_title_continuation_when_enabled() {
        let config = ParsingConfigBuilder::new()
            .title_continuation(true)
            .build()
            .unwrap();
        let r = parse_header_with_config(&[page()], &config).record;
        assert_eq!(
            r.title.as_deref(),
            Some(
                "Crecimiento y mortalidad de larvas de Concholepas concholepas en condiciones de laboratorio"
            )
        );
    }

    #[test]
    fn test_continuation_skips_affiliations_only() {
        let title = "Crecimiento de larvas de Concholepas en condiciones de";
        assert!(continues_title(title, "laboratorio y en terreno"));
        assert!(!continues_title(
            title,
            "Laboratorio de Ecología, Universidad de Chile"
        ));
        assert!(!continues_title("A complete title.", "and a second line"));
    }

    #[test]
    fn test_abstract_keywords_language() {
        let r = parse_header(&[page()]).record;
        let abstract_text = r.abstract_text.unwrap();
        assert!(abstract_text.starts_with("Se estudió el crecimiento"));
        assert!(abstract_text.ends_with("en el año 1998."));
        assert_eq!(
            r.keywords.as_deref(),
            Some("Concholepas, larvas, crecimiento, Chile")
        );
        assert_eq!(r.language.as_deref(), Some(LANGUAGE_SPANISH));
    }

    #[test]
    fn test_footer_abstract_is_rejected() {
        let page = "A survey of kelp forests in northern Chile\nAbstract: see www.example.org\n\nIntroduction";
        let r = parse_header(&[page.to_string()]).record;
        assert_eq!(r.abstract_text, None);
    }

    #[test]
    fn test_labeled_authors_and_year() {
        let page = "Rafting of benthic invertebrates along the Chilean coast\nAuthors: Thiel, M. and Haye, P.\nReceived 12 March 2014; accepted 2 June 2015\ndoi: 10.3354/meps11451";
        let record = parse_header(&[page.to_string()]);
        assert!(!record.year_from_header);
        let r = record.record;
        assert_eq!(r.authors.as_deref(), Some("Thiel, M., Haye, P."));
        assert_eq!(r.year, Some(2015));
        assert_eq!(r.doi.as_deref(), Some("10.3354/meps11451"));
        assert_eq!(
            r.title.as_deref(),
            Some("Rafting of benthic invertebrates along the Chilean coast")
        );
    }

    #[test]
    fn test_empty_pages() {
        let record = parse_header(&[String::new(), String::new()]);
        assert!(record.record.is_empty());
        assert!(!record.year_from_header);
    }

    #[test]
    fn test_guess_language() {
        let english = "The growth of the larvae was measured in the laboratory and the results of this study are shown for each of the treatments with the controls from the field that were used by the team in the";
        assert_eq!(guess_language(english), Some(LANGUAGE_ENGLISH));
        assert_eq!(guess_language("too short"), None);
    }
}
