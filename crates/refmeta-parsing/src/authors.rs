//! Author-list normalization for citation text.

use once_cell::sync::Lazy;
use regex::Regex;

use refmeta_core::authors::{format_author, join_authors};
use refmeta_core::normalize::collapse_whitespace;

const ET_AL: &str = "et al.";

/// Normalize an author segment into `Surname, I., Surname, I.` form.
///
/// "and", "y" and "&" connectors become commas, initials get periods
/// (`Smith J` → `Smith, J.`, `J.A.` → `J. A.`) and a trailing "et al."
/// is kept as the last list entry. Returns `None` when nothing usable is
/// left.
pub fn normalize_author_list(text: &str) -> Option<String> {
    static CONNECTOR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\s*,?\s+(?:and|y|&)\s+|\s*&\s*").unwrap());
    static ET_AL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i),?\s*\bet\.?\s+al\b\.?").unwrap());

    let text = collapse_whitespace(text);
    // Trailing initial periods are restored when initials are formatted.
    let text = text.trim_matches(|c: char| matches!(c, ',' | ';' | '.') || c.is_whitespace());
    if text.is_empty() {
        return None;
    }

    let has_et_al = ET_AL_RE.is_match(text);
    let text = ET_AL_RE.replace_all(text, "");
    let text = CONNECTOR.replace_all(&text, ", ");

    let mut authors: Vec<String> = Vec::new();
    let mut surname: Option<String> = None;

    for token in text
        .split([',', ';'])
        .map(str::trim)
        .filter(|t| t.chars().any(char::is_alphabetic))
    {
        if let Some(family) = surname.as_deref() {
            if is_initials(token) {
                authors.extend(format_author(family, Some(&given_from_initials(token))));
                surname = None;
                continue;
            }
            authors.extend(format_author(family, None));
            surname = None;
        }

        // Vancouver style: "Smith JA"
        if let Some((family, given)) = token.rsplit_once(' ') {
            if is_bare_initials(given) {
                authors.extend(format_author(family, Some(&given_from_initials(given))));
                continue;
            }
        }
        surname = Some(token.to_string());
    }
    if let Some(family) = surname {
        authors.extend(format_author(&family, None));
    }
    if has_et_al && !authors.is_empty() {
        authors.push(ET_AL.to_string());
    }

    join_authors(authors)
}

/// `J.`, `J. A.`, `JA`, `J.-P.`: at most three capitals, nothing else but
/// periods, hyphens and spaces.
fn is_initials(token: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\p{Lu}\.?\s*-?\s*){1,3}$").unwrap());
    RE.is_match(token) && (token.contains('.') || token.chars().count() <= 3)
}

fn is_bare_initials(token: &str) -> bool {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{Lu}{1,3}$").unwrap());
    RE.is_match(token)
}

/// `J.A.` → `J A`, `J.-P.` → `J-P`, the given-name shape [`format_author`]
/// turns back into initials.
fn given_from_initials(token: &str) -> String {
    let mut given = String::new();
    for c in token.chars() {
        if c.is_alphabetic() {
            given.push(c);
            given.push(' ');
        } else if c == '-' {
            if given.ends_with(' ') {
                given.pop();
            }
            given.push('-');
        }
    }
    given.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_normalized() {
        assert_eq!(
            normalize_author_list("Smith, J., Doe, A.").as_deref(),
            Some("Smith, J., Doe, A.")
        );
    }

    #[test]
    fn test_connectors() {
        assert_eq!(
            normalize_author_list("Smith, J. & Doe, A.").as_deref(),
            Some("Smith, J., Doe, A.")
        );
        assert_eq!(
            normalize_author_list("Smith, J., Doe, A. and Pérez, M.").as_deref(),
            Some("Smith, J., Doe, A., Pérez, M.")
        );
        assert_eq!(
            normalize_author_list("González, R. y Soto, L.").as_deref(),
            Some("González, R., Soto, L.")
        );
    }

    #[test]
    fn test_et_al() {
        assert_eq!(
            normalize_author_list("Smith, J. et al.").as_deref(),
            Some("Smith, J., et al.")
        );
        assert_eq!(
            normalize_author_list("Thiel, M., et al").as_deref(),
            Some("Thiel, M., et al.")
        );
    }

    #[test]
    fn test_initial_forms() {
        assert_eq!(
            normalize_author_list("Smith J, Doe AB").as_deref(),
            Some("Smith, J., Doe, A. B.")
        );
        assert_eq!(
            normalize_author_list("Smith, J.A., Doe, A.,").as_deref(),
            Some("Smith, J. A., Doe, A.")
        );
        assert_eq!(
            normalize_author_list("Dupont, J.-P.").as_deref(),
            Some("Dupont, J.-P.")
        );
    }

    #[test]
    fn test_compound_surnames() {
        assert_eq!(
            normalize_author_list("Pérez-Matus, A., van der Meer, J.").as_deref(),
            Some("Pérez-Matus, A., van der Meer, J.")
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize_author_list(" ,. "), None);
        assert_eq!(normalize_author_list(""), None);
    }
}
