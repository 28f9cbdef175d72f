use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::config::ParsingConfig;

/// Common compound-word suffixes that should keep the hyphen.
pub(crate) static COMPOUND_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "based",
        "driven",
        "dependent",
        "independent",
        "like",
        "free",
        "rich",
        "poor",
        "scale",
        "level",
        "term",
        "wide",
        "specific",
        "related",
        "induced",
        "mediated",
        "derived",
        "dwelling",
        "living",
        "water",
        "shore",
        "sea",
        "tidal",
        "sectional",
        "year",
        "season",
        // Spanish compounds
        "ambiental",
        "económico",
        "económica",
        "social",
        "cultural",
        "marino",
        "marina",
        "costero",
        "costera",
    ]
    .into_iter()
    .collect()
});

/// Expand common typographic ligatures found in PDFs.
pub fn expand_ligatures(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{FB05}', '\u{FB06}'], "st")
}

/// Fix hyphenation from PDF line breaks while preserving compound words.
///
/// - `"upwel- ling"` or `"upwel-\nling"` → `"upwelling"` (syllable break)
/// - `"wind- driven"` → `"wind-driven"` (compound word)
/// - `"Pérez-\nMatus"` → `"Pérez-Matus"` (hyphenated surname)
pub fn fix_hyphenation(text: &str) -> String {
    fix_hyphenation_with_config(text, &ParsingConfig::default())
}

/// Config-aware version of [`fix_hyphenation`].
pub(crate) fn fix_hyphenation_with_config(text: &str, config: &ParsingConfig) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w)-[^\S\n]*\n?[^\S\n]*(\w)(\w*)").unwrap());

    let default_suffixes: Vec<String> = COMPOUND_SUFFIXES.iter().map(|s| s.to_string()).collect();
    let suffix_set: HashSet<String> = config
        .compound_suffixes
        .resolve(&default_suffixes)
        .into_iter()
        .collect();

    RE.replace_all(text, |caps: &regex::Captures| {
        let whole = &caps[0];
        let before = &caps[1];
        let after_char = &caps[2];
        let after_word = format!("{}{}", after_char, &caps[3]);

        // "Smith-Jones" with nothing between hyphen and word is not a break.
        if whole.len() == before.len() + 1 + after_word.len() {
            return whole.to_string();
        }

        // Page ranges and codes: "123-\n145", "T-\n2"
        if before.chars().all(|c| c.is_ascii_digit())
            || after_char.chars().all(|c| c.is_ascii_digit())
        {
            return format!("{}-{}", before, after_word);
        }

        // Hyphenated surnames and proper names keep their hyphen.
        if after_char.chars().all(char::is_uppercase) {
            return format!("{}-{}", before, after_word);
        }

        let after_lower = after_word.to_lowercase();
        let stripped = after_lower.trim_end_matches(['.', ',', ';', ':']);
        if suffix_set.contains(stripped) {
            return format!("{}-{}", before, after_word);
        }

        format!("{}{}", before, after_word)
    })
    .into_owned()
}

/// Remove boilerplate fragments that PDF extraction glues to the front of
/// the first citation: the tail of an author-contribution statement, a
/// leading "References" word, stray punctuation.
pub fn strip_garbage_prefix(text: &str) -> String {
    static PREFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
        [
            r"(?i)^\s*and\s+approved\s+the\s+submitted\s+version\.?\s*",
            r"(?i)^\s*approved\s+the\s+submitted\s+version\.?\s*",
            r"(?i)^\s*the\s+submitted\s+version\.?\s*",
            r"(?i)^\s*submitted\s+version\.?\s*",
            r"(?i)^\s*and\s+approved\.?\s*",
            r"(?i)^\s*(?:references|referencias|bibliograf[íi]a)\s*:?\s+",
            r"^\s*[.,;:]+\s*",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });

    let mut out = text.to_string();
    loop {
        let before = out.len();
        for re in PREFIXES.iter() {
            if let Some(m) = re.find(&out) {
                out = out[m.end()..].to_string();
            }
        }
        if out.len() == before {
            break;
        }
    }
    out.trim().to_string()
}

/// Ligatures, then hyphenation, for a whole page or section.
pub(crate) fn clean_page_text(text: &str, config: &ParsingConfig) -> String {
    fix_hyphenation_with_config(&expand_ligatures(text), config)
}
