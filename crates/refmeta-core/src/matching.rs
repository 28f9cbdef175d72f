//! Fuzzy title comparison used to accept registry hits and to align
//! structured-metadata references with segmented citations.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Default similarity above which two titles name the same work.
pub const TITLE_MATCH_THRESHOLD: f64 = 0.90;

/// Titles shorter than this (after normalization) are never prefix-matched.
const MIN_PREFIX_LEN: usize = 30;

/// Spacing-modifier accents that PDF extraction emits next to, rather than on,
/// the letter: `Montecino R´ıos`, `Nu˜nez`.
fn compose_separated_accents(text: &str) -> String {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"([\u{b4}\u{a8}`\u{2dc}~])\s*([A-Za-zıÑñ])").unwrap());
    RE.replace_all(text, |caps: &regex::Captures| {
        let mark = caps.get(1).map_or("", |m| m.as_str());
        let letter = caps.get(2).map_or("", |m| m.as_str());
        let letter = if letter == "ı" { "i" } else { letter };
        let combining = match mark {
            "\u{b4}" => '\u{301}',
            "\u{a8}" => '\u{308}',
            "`" => '\u{300}',
            _ => '\u{303}',
        };
        format!("{letter}{combining}").nfc().collect::<String>()
    })
    .into_owned()
}

/// Reduce a title to lowercase ASCII alphanumerics for comparison.
///
/// HTML entities and JATS/markup tags are removed, separated accents are
/// recomposed, then NFKD strips diacritics so `Física` and `Fisica` compare
/// equal.
pub fn normalize_title(title: &str) -> String {
    static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
    let title = TAGS.replace_all(title, " ");
    let title = title
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let title = compose_separated_accents(&title);
    title
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Similarity in `[0, 1]` between two titles after normalization.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

/// Whether two titles name the same work.
///
/// Besides the fuzzy ratio, a long title that is a prefix of the other is
/// accepted when it covers at least 70% of it, which tolerates a subtitle
/// dropped by one side.
pub fn titles_match_with_threshold(a: &str, b: &str, threshold: f64) -> bool {
    let norm_a = normalize_title(a);
    let norm_b = normalize_title(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return false;
    }
    if rapidfuzz::fuzz::ratio(norm_a.chars(), norm_b.chars()) >= threshold {
        return true;
    }
    let (shorter, longer) = if norm_a.len() <= norm_b.len() {
        (&norm_a, &norm_b)
    } else {
        (&norm_b, &norm_a)
    };
    shorter.len() >= MIN_PREFIX_LEN
        && longer.starts_with(shorter.as_str())
        && shorter.len() as f64 / longer.len() as f64 >= 0.70
}

pub fn titles_match(a: &str, b: &str) -> bool {
    titles_match_with_threshold(a, b, TITLE_MATCH_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_strips_case_accents_and_markup() {
        assert_eq!(normalize_title("Física del <i>Océano</i>"), "fisicadeloceano");
        assert_eq!(normalize_title("Salt &amp; Pepper"), "saltpepper");
    }

    #[test]
    fn test_normalize_title_separated_accents() {
        assert_eq!(normalize_title("Nu˜nez R´ıos"), normalize_title("Núñez Ríos"));
    }

    #[test]
    fn test_titles_match_minor_difference() {
        assert!(titles_match(
            "Seasonal variability of coastal upwelling off central Chile",
            "Seasonal variability of coastal upwelling off Central Chile."
        ));
        assert!(titles_match(
            "Seasonal variability of coastal upwelling off central Chile",
            "Seasonal variabilty of coastal upwelling off central Chile"
        ));
    }

    #[test]
    fn test_titles_match_rejects_different_work() {
        assert!(!titles_match(
            "A study of coastal upwelling",
            "Phytoplankton blooms in the Humboldt Current"
        ));
        assert!(!titles_match("", "anything"));
    }

    #[test]
    fn test_titles_match_prefix_with_subtitle() {
        assert!(titles_match(
            "Oxygen minimum zone dynamics in the eastern South Pacific",
            "Oxygen minimum zone dynamics in the eastern South Pacific: a review"
        ));
    }

    #[test]
    fn test_title_similarity_range() {
        assert_eq!(title_similarity("abc title", "abc title"), 1.0);
        assert_eq!(title_similarity("", "x"), 0.0);
        let s = title_similarity("coastal upwelling", "open ocean");
        assert!((0.0..1.0).contains(&s));
    }
}
