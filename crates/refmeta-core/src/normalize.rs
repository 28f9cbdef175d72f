//! Repair of spacing lost during PDF text extraction.
//!
//! Every rule only ever inserts a single space at a character-class boundary,
//! and each rule is applied until the text stops changing, so running the
//! normalizer twice gives the same result as running it once.

use once_cell::sync::Lazy;
use regex::Regex;

/// Insert missing spaces and collapse horizontal whitespace.
///
/// Line breaks are kept; trailing spaces on each line are removed.
///
/// - `coastalUpwelling` → `coastal Upwelling`
/// - `Syst78` → `Syst 78`, `2009Title` → `2009 Title`
/// - `Smith,J.` → `Smith, J.`
/// - `J.Mar.Syst.` → `J. Mar. Syst.`
/// - `upwelling.J.` → `upwelling. J.`
pub fn normalize(text: &str) -> String {
    // lowercase followed by uppercase
    static LOWER_UPPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\p{Ll})(\p{Lu})").unwrap());
    // a digit run glued to a word (two or more letters), so `2009a)` and
    // article numbers such as `e0212485` stay intact
    static DIGIT_LETTER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\p{Nd})(\p{L}\p{L})").unwrap());
    static LETTER_DIGIT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\p{L}\p{L})(\p{Nd})").unwrap());
    // surname comma initial
    static COMMA_INITIAL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\p{Lu}\p{Ll}{2,}),(\p{Lu})").unwrap());
    // letter period capital: initials and abbreviated journal words
    static PERIOD_INITIAL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\p{L})\.(\p{Lu})").unwrap());

    let mut out = collapse_horizontal(text);
    for (re, sep) in [
        (&*LOWER_UPPER, " "),
        (&*DIGIT_LETTER, " "),
        (&*LETTER_DIGIT, " "),
        (&*COMMA_INITIAL, ", "),
        (&*PERIOD_INITIAL, ". "),
    ] {
        out = apply_to_fixed_point(re, out, &format!("${{1}}{sep}${{2}}"));
    }
    out
}

/// Single-line form: every whitespace run, line breaks included, becomes one
/// space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize and then flatten to a single line.
pub fn normalize_inline(text: &str) -> String {
    collapse_whitespace(&normalize(text))
}

fn collapse_horizontal(text: &str) -> String {
    static HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(|line| HSPACE.replace_all(line, " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Matches of a two-character boundary overlap (`aBcD`), so one pass can miss
/// some; repeat until stable.
fn apply_to_fixed_point(re: &Regex, mut text: String, replacement: &str) -> String {
    loop {
        let next = re.replace_all(&text, replacement).into_owned();
        if next == text {
            return next;
        }
        text = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_upper_boundary() {
        assert_eq!(normalize("coastalUpwelling"), "coastal Upwelling");
        assert_eq!(normalize("aBcD"), "a Bc D");
    }

    #[test]
    fn test_digit_letter_boundaries() {
        assert_eq!(normalize("Syst78: 123-145"), "Syst 78: 123-145");
        assert_eq!(normalize("2009Title"), "2009 Title");
        assert_eq!(normalize("(2009a)"), "(2009a)");
        assert_eq!(normalize("e0212485"), "e0212485");
    }

    #[test]
    fn test_initial_boundaries() {
        assert_eq!(normalize("Smith,J., Doe,A."), "Smith, J., Doe, A.");
        assert_eq!(normalize("J.Mar.Syst."), "J. Mar. Syst.");
        assert_eq!(normalize("Núñez,Á."), "Núñez, Á.");
        assert_eq!(normalize("upwelling.J.Mar."), "upwelling. J. Mar.");
        assert_eq!(normalize("journal.pone.0212485"), "journal.pone.0212485");
    }

    #[test]
    fn test_whitespace_and_newlines() {
        assert_eq!(normalize("a  \t b \nc   d  "), "a b\nc d");
        assert_eq!(collapse_whitespace(" a \n b\t c "), "a b c");
    }

    #[test]
    fn test_idempotent_on_samples() {
        let samples = [
            "Smith,J.,Doe,A.(2009).A study of coastalUpwelling.J.Mar.Syst.78:123-145.",
            "PIZARRO,O.,Montecino,V.2000.Vol15(3)pp12",
            "  already   normal text\n\nwith lines ",
            "MacDonald,B.J. and McIntyre,A.B.C. 1999b",
            "ÁreaMarina,Ñuble 2010Informe",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_already_normalized_is_unchanged() {
        let text = "Smith, J., Doe, A. (2009). A study of coastal upwelling. J. Mar. Syst. 78: 123-145.";
        assert_eq!(normalize(text), text);
    }
}
