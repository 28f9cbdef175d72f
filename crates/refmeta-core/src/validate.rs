//! Semantic checks applied to individual field values.
//!
//! A value that fails its check is dropped from consideration entirely.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::patterns::{contains_url, is_plausible_year, is_valid_doi, looks_like_domain};

/// Abstracts longer than this are cut at a word boundary.
pub const ABSTRACT_MAX_CHARS: usize = 5000;

/// Appended to an abstract that was cut.
pub const TRUNCATION_MARKER: &str = "... [truncado]";

pub const MIN_ABSTRACT_WORDS: usize = 10;

/// Share of domain-like tokens above which an abstract is footer leakage.
pub const MAX_DOMAIN_TOKEN_RATIO: f64 = 0.30;

pub const MIN_TITLE_CHARS: usize = 10;
pub const MAX_TITLE_CHARS: usize = 500;

pub const MIN_KEYWORDS_CHARS: usize = 5;
pub const MAX_KEYWORDS_CHARS: usize = 500;

/// Why an abstract candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractRejection {
    TooFewWords,
    ContainsUrl,
    DomainHeavy,
}

impl std::fmt::Display for AbstractRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbstractRejection::TooFewWords => write!(f, "fewer than {MIN_ABSTRACT_WORDS} words"),
            AbstractRejection::ContainsUrl => write!(f, "contains a URL or domain"),
            AbstractRejection::DomainHeavy => write!(f, "mostly domain names"),
        }
    }
}

/// Check an abstract candidate for footer or metadata leakage.
pub fn check_abstract(text: &str) -> Result<(), AbstractRejection> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < MIN_ABSTRACT_WORDS {
        return Err(AbstractRejection::TooFewWords);
    }
    if contains_url(text) {
        return Err(AbstractRejection::ContainsUrl);
    }
    let domains = tokens.iter().filter(|t| looks_like_domain(t)).count();
    if domains as f64 / tokens.len() as f64 > MAX_DOMAIN_TOKEN_RATIO {
        return Err(AbstractRejection::DomainHeavy);
    }
    if domains > 0 {
        return Err(AbstractRejection::ContainsUrl);
    }
    Ok(())
}

pub fn is_valid_abstract(text: &str) -> bool {
    check_abstract(text).is_ok()
}

/// Cut `text` to at most `max_chars` characters, preferring the last space
/// in the final tenth, and mark it as truncated. Text already cut this way
/// is returned unchanged.
pub fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let body = text.strip_suffix(TRUNCATION_MARKER).unwrap_or(text);
    if body.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let min_keep = head.len() * 9 / 10;
    let head = match head.rfind(' ') {
        Some(space) if space > min_keep => &head[..space],
        _ => head,
    };
    format!("{}{}", head.trim_end(), TRUNCATION_MARKER)
}

/// Validate and cap an abstract. `None` when it fails validation.
pub fn clean_abstract(text: &str) -> Option<String> {
    let text = text.trim();
    check_abstract(text).ok()?;
    Some(truncate_at_word(text, ABSTRACT_MAX_CHARS))
}

pub fn is_valid_title(title: &str) -> bool {
    let len = title.trim().chars().count();
    (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) && !contains_url(title)
}

pub fn is_valid_keywords(keywords: &str) -> bool {
    let len = keywords.trim().chars().count();
    (MIN_KEYWORDS_CHARS..=MAX_KEYWORDS_CHARS).contains(&len) && !contains_url(keywords)
}

pub fn is_valid_year(year: i32) -> bool {
    is_plausible_year(year)
}

pub fn is_valid_doi_value(doi: &str) -> bool {
    is_valid_doi(doi.trim())
}

/// Text whose punctuation suggests it was assembled from the wrong spans:
/// runs of three or more symbols, or punctuation making up over 40% of the
/// visible characters. Separators (`.`, `,` or `;` before a space, another
/// separator or the end) are not counted, so `Li, X., Wu, Y.` is clean.
pub fn looks_corrupted(text: &str) -> bool {
    static SYMBOL_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{Nd}\s]{3,}").unwrap());
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    let chars: Vec<char> = text.chars().collect();
    let is_separator = |i: usize| {
        matches!(chars[i], '.' | ',' | ';')
            && chars
                .get(i + 1)
                .is_none_or(|c| c.is_whitespace() || matches!(c, ',' | ';'))
    };
    let total = chars.iter().filter(|c| !c.is_whitespace()).count();
    let punct = (0..chars.len())
        .filter(|&i| !chars[i].is_alphanumeric() && !chars[i].is_whitespace() && !is_separator(i))
        .count();
    SYMBOL_RUN.is_match(text.trim_end_matches('.')) || (total > 0 && punct * 5 > total * 2)
}

/// Title-specific corruption: [`looks_corrupted`] or more than three commas.
pub fn title_looks_corrupted(title: &str) -> bool {
    title.matches(',').count() > 3 || looks_corrupted(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstract_rejects_short_domain_text() {
        let text = "See www.example.org for details";
        assert_eq!(check_abstract(text), Err(AbstractRejection::TooFewWords));
        assert!(clean_abstract(text).is_none());
    }

    #[test]
    fn test_abstract_rejects_urls_and_domains() {
        let with_url = "We studied the coastal upwelling system off central Chile during 2005, data at https://example.org";
        assert_eq!(check_abstract(with_url), Err(AbstractRejection::ContainsUrl));

        let footer = "frontiersin.org scielo.cl redalyc.org elsevier.com journal page one two three four five six";
        assert_eq!(check_abstract(footer), Err(AbstractRejection::DomainHeavy));
    }

    #[test]
    fn test_abstract_accepts_prose() {
        let text = "We describe seasonal variability of the coastal upwelling system off central Chile using moored current meters.";
        assert!(is_valid_abstract(text));
        assert_eq!(clean_abstract(text).as_deref(), Some(text));
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let text = "word ".repeat(2000);
        let cut = truncate_at_word(text.trim(), ABSTRACT_MAX_CHARS);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        let body = cut.trim_end_matches(TRUNCATION_MARKER);
        assert!(body.chars().count() <= ABSTRACT_MAX_CHARS);
        assert!(body.ends_with("word"));
    }

    #[test]
    fn test_truncated_text_is_stable() {
        let text = "word ".repeat(2000);
        let once = truncate_at_word(text.trim(), ABSTRACT_MAX_CHARS);
        assert_eq!(truncate_at_word(&once, ABSTRACT_MAX_CHARS), once);
        assert_eq!(clean_abstract(&once).as_deref(), Some(once.as_str()));
    }

    #[test]
    fn test_truncate_leaves_short_text() {
        assert_eq!(truncate_at_word("short text", 100), "short text");
    }

    #[test]
    fn test_title_bounds() {
        assert!(!is_valid_title("Impact."));
        assert!(is_valid_title("A study of coastal upwelling"));
        assert!(!is_valid_title(&"x".repeat(501)));
    }

    #[test]
    fn test_corruption_heuristics() {
        assert!(title_looks_corrupted("Smith, J., Doe, A., Roe, B., Poe, C."));
        assert!(looks_corrupted("Title ;;; ..."));
        assert!(!title_looks_corrupted("A study of coastal upwelling"));
        assert!(!looks_corrupted("Smith, J., Doe, A."));
        assert!(looks_corrupted("(a) [b] {c} <d>"));
    }

    #[test]
    fn test_short_author_lists_are_clean() {
        assert!(!looks_corrupted("Li, X., Wu, Y."));
        assert!(!looks_corrupted("Li, X.; Wu, Y."));
        assert!(!looks_corrupted("Ng, A."));
        assert!(looks_corrupted("Li, X., ;;, Y."));
    }
}
