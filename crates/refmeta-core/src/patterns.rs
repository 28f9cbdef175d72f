//! Shared vocabulary of bibliographic patterns.
//!
//! Every rule is exposed as a pure predicate or extraction function so the
//! extractors, the segmenter and the field validators all read from the same
//! definitions. Compiled regexes are private to the function that owns them.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;

/// Bumped whenever a pattern changes in a way that alters extraction output.
pub const PATTERN_VERSION: u32 = 1;

/// Earliest year accepted into any record.
pub const MIN_YEAR: i32 = 1900;

/// Headings that end a reference list. Compared in upper case against the
/// start of a short line.
pub const SECTION_END_MARKERS: &[&str] = &[
    "FUNDING",
    "FINANCIAMIENTO",
    "ACKNOWLEDGMENTS",
    "ACKNOWLEDGMENT",
    "ACKNOWLEDGEMENTS",
    "ACKNOWLEDGEMENT",
    "AGRADECIMIENTOS",
    "DATA AVAILABILITY",
    "SUPPLEMENTARY MATERIAL",
    "SUPPLEMENTARY FIGURE",
    "AUTHOR CONTRIBUTIONS",
    "CONFLICT OF INTEREST",
    "CONFLICTS OF INTEREST",
];

/// Boilerplate that never appears inside a real citation. Compared in upper case.
pub const EXCLUSION_PHRASES: &[&str] = &[
    "THIS RESEARCH WAS SPONSORED",
    "FONDAP-CONICYT",
    "FONDEQUIP",
    "FONDECYT",
    "WE APPRECIATE",
    "THE ORIGINAL CONTRIBUTIONS",
    "FURTHER INQUIRIES",
    "SUPPLEMENTARY MATERIAL",
    "SUPPLEMENTARY FIGURE",
    "AUTHOR CONTRIBUTIONS",
    "ENDORSED BY THE PUBLISHER",
    "NO USE, DISTRIBUTION OR REPRODUCTION",
    "ANY PRODUCT THAT MAY BE EVALUATED",
];

/// Line patterns for running headers and footers injected by PDF extraction.
pub const RUNNING_HEADER_PATTERNS: &[&str] = &[
    r"(?i)^frontiers\b",
    r"(?i)^volume\s+\d+",
    r"(?i)^article\s+\d+",
    r"(?i)^www\.",
    r"(?i)^page\s+\d+",
    r"(?i)\|\s*www\.[a-z0-9.-]+\.[a-z]{2,}",
    r"(?i)^\d+\s*\|",
];

static RUNNING_HEADER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    RUNNING_HEADER_PATTERNS
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

// ── Years ──

/// The year a bibliographic value may take at most, relative to today.
pub fn max_year() -> i32 {
    chrono::Utc::now().year() + 2
}

/// `MIN_YEAR <= year <= current year + 2`.
pub fn is_plausible_year(year: i32) -> bool {
    (MIN_YEAR..=max_year()).contains(&year)
}

/// How a year was delimited in the text, most reliable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum YearForm {
    /// `(2009)`
    Parenthesized,
    /// `2009;`
    Semicolon,
    /// `2009.`
    Period,
    /// `2009,`
    Comma,
    /// a bare `19xx` / `20xx` token
    Bare,
}

impl YearForm {
    pub const ORDERED: [YearForm; 5] = [
        YearForm::Parenthesized,
        YearForm::Semicolon,
        YearForm::Period,
        YearForm::Comma,
        YearForm::Bare,
    ];
}

/// A year found in text. `start..end` spans the whole delimiter, e.g. `(2009)`
/// or `2009.`, so callers can split the text around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMatch {
    pub year: i32,
    pub form: YearForm,
    pub start: usize,
    pub end: usize,
}

fn year_regex(form: YearForm) -> &'static Regex {
    // Group 1 is the four digits; the whole match may include one leading
    // guard character that is not part of the delimiter.
    static PAREN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\((\d{4})[a-z]?(?:,[^)\n]{0,20})?\)").unwrap());
    static SEMI: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:^|[^\d/.\-–—])(\d{4})[a-z]?;").unwrap());
    static PERIOD: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:^|[^\d/.\-–—])(\d{4})[a-z]?\.(?:\s|$)").unwrap());
    static COMMA: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:^|[^\d/.\-–—])(\d{4})[a-z]?,").unwrap());
    static BARE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?:^|[^\d/.\-–—])((?:19|20)\d{2})(?:\D|$)").unwrap());
    match form {
        YearForm::Parenthesized => &PAREN,
        YearForm::Semicolon => &SEMI,
        YearForm::Period => &PERIOD,
        YearForm::Comma => &COMMA,
        YearForm::Bare => &BARE,
    }
}

/// All plausible years delimited in the given form, left to right.
pub fn years_of_form(text: &str, form: YearForm) -> Vec<YearMatch> {
    let re = year_regex(form);
    let mut found = Vec::new();
    for caps in re.captures_iter(text) {
        let Some(digits) = caps.get(1) else { continue };
        let Ok(year) = digits.as_str().parse::<i32>() else {
            continue;
        };
        if !is_plausible_year(year) {
            continue;
        }
        let Some(whole) = caps.get(0) else { continue };
        let (start, end) = match form {
            YearForm::Parenthesized => (whole.start(), whole.end()),
            YearForm::Bare => (digits.start(), digits.end()),
            // Keep the delimiter, drop the leading guard character and any
            // trailing whitespace the period form consumed.
            _ => {
                let tail = whole.as_str()[digits.end() - whole.start()..].trim_end();
                (digits.start(), digits.end() + tail.len())
            }
        };
        found.push(YearMatch {
            year,
            form,
            start,
            end,
        });
    }
    found
}

/// First plausible year, trying delimiter forms in reliability order.
///
/// A bare year that opens a range (`1967-1973`, `1990 – 95`) is skipped.
pub fn find_year(text: &str) -> Option<YearMatch> {
    YearForm::ORDERED.iter().find_map(|form| {
        years_of_form(text, *form)
            .into_iter()
            .find(|m| m.form != YearForm::Bare || !opens_range(&text[m.end..]))
    })
}

fn opens_range(rest: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-–—]\s*\d").unwrap());
    RE.is_match(rest)
}

/// Whether the text contains any plausible year token.
pub fn has_plausible_year(text: &str) -> bool {
    !years_of_form(text, YearForm::Bare).is_empty()
}

// ── DOI ──

/// Which textual form a DOI was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DoiForm {
    Url,
    Labeled,
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoiCandidate {
    pub doi: String,
    pub form: DoiForm,
    pub start: usize,
    pub end: usize,
}

impl DoiCandidate {
    fn suffix(&self) -> &str {
        self.doi.split_once('/').map(|(_, s)| s).unwrap_or("")
    }

    /// Dotted multi-segment suffixes and long suffixes are complete; short
    /// numeric ones are usually a truncated match.
    fn is_complete(&self) -> bool {
        let suffix = self.suffix();
        suffix.contains('.') || suffix.len() >= 8
    }
}

/// Strip trailing punctuation and unbalanced closing brackets from a DOI.
pub fn clean_doi(doi: &str) -> String {
    let mut doi = doi.trim_end_matches(['.', ',', ';', ':']);
    loop {
        let before = doi.len();
        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
            if doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count() {
                doi = &doi[..doi.len() - 1];
                doi = doi.trim_end_matches(['.', ',', ';', ':']);
            }
        }
        if doi.len() == before {
            break;
        }
    }
    doi.to_string()
}

/// `10.<registrant>/<suffix>` with a registrant of four or more digits and a
/// suffix of at least five characters.
pub fn is_valid_doi(doi: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,9}/\S{5,}$").unwrap());
    RE.is_match(doi) && clean_doi(doi) == doi
}

/// Every DOI written in the text, in any of the three forms.
pub fn doi_candidates(text: &str) -> Vec<DoiCandidate> {
    static URL_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(?:https?://)?(?:dx\.)?doi\.org/(10\.\d{4,}/[^\s\]>},;]+)").unwrap()
    });
    static LABEL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\bdoi\s*[:\s]\s*(10\.\d{4,}/[^\s\]>},;]+)").unwrap());
    static BARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"10\.\d{4,}/[^\s\]>},;]+").unwrap());

    let mut out = Vec::new();
    for (re, form) in [(&*URL_RE, DoiForm::Url), (&*LABEL_RE, DoiForm::Labeled)] {
        for caps in re.captures_iter(text) {
            if let (Some(whole), Some(doi)) = (caps.get(0), caps.get(1)) {
                out.push(DoiCandidate {
                    doi: clean_doi(doi.as_str()),
                    form,
                    start: whole.start(),
                    end: whole.end(),
                });
            }
        }
    }
    for m in BARE_RE.find_iter(text) {
        out.push(DoiCandidate {
            doi: clean_doi(m.as_str()),
            form: DoiForm::Bare,
            start: m.start(),
            end: m.end(),
        });
    }
    out.retain(is_candidate_valid);
    out
}

fn is_candidate_valid(c: &DoiCandidate) -> bool {
    is_valid_doi(&c.doi)
}

/// Best DOI in the text: complete suffixes beat short numeric ones, then the
/// longer candidate, then the more explicit form.
pub fn extract_doi(text: &str) -> Option<String> {
    doi_candidates(text)
        .into_iter()
        .max_by(|a, b| {
            a.is_complete()
                .cmp(&b.is_complete())
                .then(a.doi.len().cmp(&b.doi.len()))
                .then(b.form.cmp(&a.form))
                .then(b.start.cmp(&a.start))
        })
        .map(|c| c.doi)
}

// ── ISBN / ISSN / URL ──

/// Labeled ISBN (10 or 13 digits) or, failing that, labeled ISSN. Separators
/// are removed.
pub fn extract_isbn_issn(text: &str) -> Option<String> {
    static ISBN_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\bISBN(?:[-\s]?1[03])?\s*:?\s*((?:\d[-\s]?){9}[\dX](?:[-\s]?\d){0,3})").unwrap()
    });
    static ISSN_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(?:e-?)?ISSN\s*:?\s*(\d{4}[-\s]?\d{3}[\dX])").unwrap());

    for caps in ISBN_RE.captures_iter(text) {
        let Some(raw) = caps.get(1) else { continue };
        let digits: String = raw
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
            .collect();
        if digits.len() == 10 || digits.len() == 13 {
            return Some(digits.to_uppercase());
        }
    }
    ISSN_RE.captures(text).and_then(|caps| {
        caps.get(1)
            .map(|m| m.as_str().replace(['-', ' '], "").to_uppercase())
    })
}

/// First http(s) URL in the text.
pub fn extract_url(text: &str) -> Option<String> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s\)\]>]+").unwrap());
    RE.find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']).to_string())
}

// ── Domains ──

/// Whether a whitespace-delimited token is a web address or bare domain name.
pub fn looks_like_domain(token: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)^(?:https?://)?(?:www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|org|net|edu|gov|info|io|int|cl|es|mx|ar|br|co|pe|ec|uy|ve|bo|py|cu|uk|de|fr|it|pt|ca|au|nz|jp|cn|ru|nl|eu)(?:/\S*)?$",
        )
        .unwrap()
    });
    let token = token.trim_matches(|c: char| "()[]{}\"'«»,;:".contains(c));
    let token = token.trim_end_matches('.');
    !token.is_empty() && RE.is_match(token)
}

/// Whether the text contains an http(s) URL or a `www.` address.
pub fn contains_url(text: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://|\bwww\.").unwrap());
    RE.is_match(text)
}

pub fn contains_email(text: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.]+").unwrap());
    RE.is_match(text)
}

// ── Authors ──

/// At least one `Surname, I` shape anywhere in the text.
pub fn has_author_shape(text: &str) -> bool {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\p{Lu}[\p{Ll}'’\-]+,\s*\p{Lu}(?:\.|\b)").unwrap());
    RE.is_match(text)
}

/// `Surname, I.` searched anywhere, used to find citation starts inside a
/// single unbroken line. Returns byte offsets of each match start.
pub fn author_search_starts(text: &str) -> Vec<usize> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?:^|[.)]\s+|\d\s*[-–]\s*\d+\.?\s+)(\p{Lu}[\p{Ll}]{2,}(?:[\s-]\p{Lu}[\p{Ll}]+)?,\s*\p{Lu}\.)")
            .unwrap()
    });
    RE.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.start()))
        .collect()
}

/// A line opening with `Surname, I`. The surname may carry up to two
/// particles or extra words (`Van Der Berg`, `de la Fuente`, `Pérez-Soto`).
/// A lowercase particle opening needs a real initial after the comma, so a
/// wrapped `de Chile, Santiago` is not a start.
pub fn starts_with_author(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        let particle = "(?:van|von|de|del|der|den|da|dos|du|la|le)";
        let word = r"\p{Lu}[\p{Ll}'’\-]+";
        Regex::new(&format!(
            r"^(?:{word}(?:[\s-]+(?:{word}|{particle})){{0,2}},\s*\p{{Lu}}|(?:{particle}\s+){{1,2}}{word}(?:[\s-]+{word})?,\s*(?:\p{{Lu}}\.|\p{{Lu}}{{1,3}}\b))"
        ))
        .unwrap()
    });
    RE.is_match(line)
}

/// A line opening with `Surname (2009)` or `Surname, 2009`.
pub fn starts_with_author_year(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\p{Lu}[\p{Ll}'’\-]+(?:\s+\p{Lu}[\p{Ll}'’\-]+)?[\s,]*\(?\d{4}").unwrap()
    });
    RE.is_match(line)
}

/// A line opening with `Surname 2009`.
pub fn starts_with_surname_year(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{Lu}[\p{Ll}]+\s+\d{4}").unwrap());
    RE.is_match(line)
}

/// `America, 1967–73`: a place and a year range, not an author.
pub fn is_place_year_range(line: &str) -> bool {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\p{Lu}[\p{Ll}]+,\s*\d{4}\s*[-–—]").unwrap());
    RE.is_match(line)
}

/// `12. Surname...`
pub fn is_numbered_reference(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}\.\s+\p{Lu}").unwrap());
    RE.is_match(line)
}

// ── Section structure ──

/// A heading line that opens a reference list.
pub fn is_reference_heading(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)^\s*(?:\d+\.?\s*)?(?:references|referencias|referencias\s+bibliogr[áa]ficas|bibliograf[íi]a|bibliography|literature\s+cited|works\s+cited)\s*:?\s*$",
        )
        .unwrap()
    });
    RE.is_match(line)
}

/// A short line that starts with one of `markers` (upper-case comparison).
pub fn is_section_end_marker_in(line: &str, markers: &[String]) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() >= 100 {
        return false;
    }
    let upper = trimmed.to_uppercase();
    markers.iter().any(|marker| {
        let marker = marker.to_uppercase();
        upper == marker
            || upper
                .strip_prefix(marker.as_str())
                .is_some_and(|rest| rest.starts_with([' ', ':', '.']))
    })
}

pub fn is_section_end_marker(line: &str) -> bool {
    let markers: Vec<String> = SECTION_END_MARKERS.iter().map(|s| s.to_string()).collect();
    is_section_end_marker_in(line, &markers)
}

pub fn contains_exclusion_phrase_in(text: &str, phrases: &[String]) -> bool {
    let upper = text.to_uppercase();
    phrases.iter().any(|p| upper.contains(&p.to_uppercase()))
}

pub fn contains_exclusion_phrase(text: &str) -> bool {
    let phrases: Vec<String> = EXCLUSION_PHRASES.iter().map(|s| s.to_string()).collect();
    contains_exclusion_phrase_in(text, &phrases)
}

/// A running header/footer line such as `Volume 7 | Article 123`.
pub fn is_running_header(line: &str) -> bool {
    let line = line.trim();
    RUNNING_HEADER_RES.iter().any(|re| re.is_match(line))
}

/// A line holding only a page number.
pub fn is_page_number(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,4}$").unwrap());
    RE.is_match(line.trim())
}

/// A line that is only an identifier: `doi: 10.…`, `https://…`.
pub fn is_identifier_line(line: &str) -> bool {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^(?:doi\s*:\s*10\.|https?://|doi\.org/)").unwrap());
    RE.is_match(line.trim())
}

/// Lines that label metadata and can never be a document title.
pub fn is_metadata_line(line: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)^(?:authors?\b|abstract\b|summary\b|resumen\b|keywords?\b|key\s+words\b|palabras\s+clave\b|received\b|recibido\b|accepted\b|aceptado\b|published\b|editor\b|citation\b|research\s+article\b|review\s+article\b|original\s+article\b|copyright\b|©)",
        )
        .unwrap()
    });
    RE.is_match(line.trim())
}

/// Number of lowercase-to-uppercase junctions, a sign of words glued together
/// by PDF extraction.
pub fn count_concatenation_artifacts(text: &str) -> usize {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Ll}\p{Lu}").unwrap());
    RE.find_iter(text).count()
}

// ── Journal header line ──

/// Parsed `Journal, Place, Volume: Pages, Year` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalHeader {
    pub venue: String,
    pub place: Option<String>,
    pub volume: String,
    pub issue: Option<String>,
    pub pages: String,
    pub year: i32,
}

impl JournalHeader {
    /// Venue as printed, including the place when one is given.
    pub fn venue_with_place(&self) -> String {
        match &self.place {
            Some(place) => format!("{}, {}", self.venue, place),
            None => self.venue.clone(),
        }
    }
}

/// Recognize a journal header line such as
/// `Invest. Mar., Valparaíso, 28: 39-52, 2000` or
/// `Mar Ecol Prog Ser, Vol. 537: 247–263, 2015`.
pub fn parse_journal_header(line: &str) -> Option<JournalHeader> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"^\s*(?P<venue>[\p{L}][^,\n\d]{1,80}?),\s*(?:(?P<place>[\p{L}][^,\n\d:]{1,40}),\s*)?(?:Vol(?:\.|ume)?\s*)?(?P<vol>\d{1,4})\s*(?:\((?P<issue>[\d\-]{1,6})\))?\s*:\s*(?P<pages>\d+\s*[-–—]\s*\d+),\s*(?P<year>\d{4})\b",
        )
        .unwrap()
    });
    let caps = RE.captures(line)?;
    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    if !is_plausible_year(year) {
        return None;
    }
    Some(JournalHeader {
        venue: caps.name("venue")?.as_str().trim().to_string(),
        place: caps.name("place").map(|m| m.as_str().trim().to_string()),
        volume: caps.name("vol")?.as_str().to_string(),
        issue: caps.name("issue").map(|m| m.as_str().to_string()),
        pages: normalize_page_range(caps.name("pages")?.as_str()),
        year,
    })
}

/// `123 – 145` → `123-145`.
pub fn normalize_page_range(pages: &str) -> String {
    pages
        .replace(['–', '—'], "-")
        .split('-')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("-")
}
