//! Canonical "Surname, I." author formatting shared by all sources.

/// Initials of a given-name string: `Juan Pablo` → `J. P.`,
/// `Jean-Pierre` → `J.-P.`.
pub fn initials(given: &str) -> String {
    given
        .split_whitespace()
        .filter_map(|name| {
            let parts: Vec<String> = name
                .split('-')
                .filter_map(|part| {
                    part.chars()
                        .find(|c| c.is_alphabetic())
                        .map(|c| format!("{}.", c.to_uppercase()))
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("-"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `Surname, I.` or just `Surname` when no given name is known.
pub fn format_author(family: &str, given: Option<&str>) -> Option<String> {
    let family = family.split_whitespace().collect::<Vec<_>>().join(" ");
    if family.is_empty() {
        return None;
    }
    let initials = given.map(initials).unwrap_or_default();
    if initials.is_empty() {
        Some(family)
    } else {
        Some(format!("{family}, {initials}"))
    }
}

/// Join formatted authors with `, `. `None` for an empty list.
pub fn join_authors<I, S>(authors: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = authors
        .into_iter()
        .map(|a| a.as_ref().trim().to_string())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() { None } else { Some(joined) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials() {
        assert_eq!(initials("Juan Pablo"), "J. P.");
        assert_eq!(initials("Jean-Pierre"), "J.-P.");
        assert_eq!(initials("a."), "A.");
        assert_eq!(initials(""), "");
    }

    #[test]
    fn test_format_author() {
        assert_eq!(
            format_author("Escribano", Some("Rubén")).as_deref(),
            Some("Escribano, R.")
        );
        assert_eq!(format_author("de la Fuente", None).as_deref(), Some("de la Fuente"));
        assert_eq!(format_author("  ", Some("X")), None);
    }

    #[test]
    fn test_join_authors() {
        assert_eq!(
            join_authors(["Smith, J.", " ", "Doe, A."]).as_deref(),
            Some("Smith, J., Doe, A.")
        );
        assert_eq!(join_authors(Vec::<String>::new()), None);
    }
}
