use refmeta_core::normalize::{collapse_whitespace, normalize};
use refmeta_core::patterns::{
    author_search_starts, contains_exclusion_phrase_in, count_concatenation_artifacts,
    has_plausible_year, is_identifier_line, is_numbered_reference, is_page_number,
    is_place_year_range, is_reference_heading, is_running_header, is_section_end_marker_in,
    starts_with_author, starts_with_author_year, starts_with_surname_year,
};
use refmeta_core::{DiscardReason, DiscardedSpan, RawCitation};

use crate::config::ParsingConfig;
use crate::text_processing::strip_garbage_prefix;

/// How the reference section was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLocation {
    /// Text after the last reference-list heading.
    Heading,
    /// No heading; the last pages of the document.
    Fallback,
}

/// The reference-list text of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSection {
    pub text: String,
    pub location: SectionLocation,
}

/// Output of [`segment_references`]. Citations and discarded spans together
/// account for every non-whitespace character of the section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub citations: Vec<RawCitation>,
    pub discarded: Vec<DiscardedSpan>,
}

/// Locate the reference section in page texts.
///
/// Uses the LAST heading line matching the reference-section vocabulary
/// (References, Referencias, Bibliografía, Literature Cited, ...). Falls back
/// to the last three pages when no heading is found or nothing follows it.
pub fn find_references_section(pages: &[String]) -> Option<ReferenceSection> {
    find_references_section_with_config(pages, &ParsingConfig::default())
}

/// Config-aware version of [`find_references_section`].
pub(crate) fn find_references_section_with_config(
    pages: &[String],
    config: &ParsingConfig,
) -> Option<ReferenceSection> {
    let text = pages.join("\n");
    let is_heading = |line: &str| match &config.section_heading_re {
        Some(re) => re.is_match(line.trim()),
        None => is_reference_heading(line),
    };

    // Later headings win: tables of contents and "see References" lines
    // come before the real list.
    let heading_end = lines_with_offsets(&text)
        .into_iter()
        .filter(|l| is_heading(l.text))
        .last()
        .map(|l| l.offset + l.text.len());

    if let Some(end) = heading_end {
        let rest = text[end..].trim_start_matches(['\r', '\n']);
        if !rest.trim().is_empty() {
            return Some(ReferenceSection {
                text: rest.to_string(),
                location: SectionLocation::Heading,
            });
        }
    }

    let start = pages.len().saturating_sub(config.fallback_pages.max(1));
    let tail = pages[start..].join("\n");
    if tail.trim().is_empty() {
        return None;
    }
    Some(ReferenceSection {
        text: tail,
        location: SectionLocation::Fallback,
    })
}

/// Split a reference section into candidate citations.
///
/// Line-based: a line opening with an author pattern (`Surname, I`,
/// `Surname (2009)`, `Surname, 2009`, `Surname 2009`) or a numbered marker
/// (`12. Surname`) starts a new citation; other lines continue the open one.
/// A section-end marker (Funding, Acknowledgments, ...) discards everything
/// after it. When the whole section is one unbroken line, splits on
/// `Surname, I.` matches inside that line instead.
pub fn segment_references(text: &str) -> Segmentation {
    segment_references_with_config(text, &ParsingConfig::default())
}

/// Config-aware version of [`segment_references`].
pub(crate) fn segment_references_with_config(text: &str, config: &ParsingConfig) -> Segmentation {
    let lines = lines_with_offsets(text);
    let mut seg = Segmenter::new(config);

    let content: Vec<&Line<'_>> = lines.iter().filter(|l| !l.text.trim().is_empty()).collect();
    if let [only] = content.as_slice() {
        let starts = author_search_starts(only.text);
        if starts.len() >= 2 {
            for line in &lines {
                if line.offset == only.offset {
                    split_single_line(&mut seg, line, &starts);
                } else {
                    seg.discard(line.text, line.offset, DiscardReason::BlankLine);
                }
            }
            return seg.finish();
        }
    }

    for line in &lines {
        let trimmed = line.text.trim();
        if trimmed.is_empty() {
            seg.flush();
            seg.discard(line.text, line.offset, DiscardReason::BlankLine);
            continue;
        }
        if is_section_end_marker_in(trimmed, &config.section_end_markers) {
            seg.flush();
            seg.discard(&text[line.offset..], line.offset, DiscardReason::SectionEnd);
            break;
        }
        if is_page_number(trimmed) {
            seg.discard(line.text, line.offset, DiscardReason::PageNumber);
            continue;
        }
        if is_identifier_line(trimmed) {
            // A DOI or URL on its own line belongs to the open citation.
            if seg.pending.is_some() {
                seg.append(trimmed, line.offset, "\n");
            } else {
                seg.discard(line.text, line.offset, DiscardReason::RunningHeader);
            }
            continue;
        }
        if is_running_header(trimmed)
            || config.extra_running_headers.iter().any(|re| re.is_match(trimmed))
            || is_reference_heading(trimmed)
        {
            seg.discard(line.text, line.offset, DiscardReason::RunningHeader);
            continue;
        }

        match detect_start(&normalize(trimmed)) {
            // Multi-line author lists: keep going until a year shows up.
            Some(LineStart::Author) if seg.pending_lacks_year() => {
                seg.append(trimmed, line.offset, "\n")
            }
            Some(_) => seg.open(trimmed, line.offset),
            None => seg.append(trimmed, line.offset, "\n"),
        }
    }

    seg.finish()
}

fn split_single_line(seg: &mut Segmenter<'_>, line: &Line<'_>, starts: &[usize]) {
    let mut bounds = Vec::with_capacity(starts.len() + 2);
    bounds.push(0);
    bounds.extend(starts.iter().copied().filter(|s| *s > 0));
    bounds.push(line.text.len());

    for pair in bounds.windows(2) {
        let piece = &line.text[pair[0]..pair[1]];
        if piece.trim().is_empty() {
            continue;
        }
        let offset = line.offset + pair[0];
        if pair[0] > 0 && !seg.pending_lacks_year() {
            seg.open(piece, offset);
        } else {
            seg.append(piece, offset, "");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStart {
    Author,
    Numbered,
}

fn detect_start(line: &str) -> Option<LineStart> {
    if is_place_year_range(line) {
        return None;
    }
    if starts_with_author(line) || starts_with_author_year(line) {
        return Some(LineStart::Author);
    }
    if is_numbered_reference(line) {
        return Some(LineStart::Numbered);
    }
    // "Surname 2009" is weak evidence on a short line.
    if starts_with_surname_year(line) && line.chars().count() > 20 {
        return Some(LineStart::Author);
    }
    None
}

struct Line<'a> {
    text: &'a str,
    offset: usize,
}

fn lines_with_offsets(text: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|piece| {
            let line = Line {
                text: piece.trim_end_matches(['\n', '\r']),
                offset,
            };
            offset += piece.len();
            line
        })
        .collect()
}

struct Pending {
    offset: usize,
    text: String,
}

struct Segmenter<'c> {
    config: &'c ParsingConfig,
    pending: Option<Pending>,
    citations: Vec<RawCitation>,
    discarded: Vec<DiscardedSpan>,
}

impl<'c> Segmenter<'c> {
    fn new(config: &'c ParsingConfig) -> Self {
        Self {
            config,
            pending: None,
            citations: Vec::new(),
            discarded: Vec::new(),
        }
    }

    fn discard(&mut self, text: &str, offset: usize, reason: DiscardReason) {
        if text.is_empty() {
            return;
        }
        self.discarded.push(DiscardedSpan {
            text: text.to_string(),
            offset,
            reason,
        });
    }

    fn pending_lacks_year(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| !has_plausible_year(&p.text))
    }

    fn open(&mut self, text: &str, offset: usize) {
        self.flush();
        self.pending = Some(Pending {
            offset,
            text: text.to_string(),
        });
    }

    fn append(&mut self, text: &str, offset: usize, sep: &str) {
        match &mut self.pending {
            Some(p) => {
                p.text.push_str(sep);
                p.text.push_str(text);
            }
            None => {
                self.pending = Some(Pending {
                    offset,
                    text: text.to_string(),
                })
            }
        }
    }

    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let joined = collapse_whitespace(&pending.text);
        if joined.is_empty() {
            return;
        }
        let cleaned = strip_garbage_prefix(&joined);

        if let Some(reason) = self.rejection(&cleaned) {
            self.discard(&joined, pending.offset, reason);
            return;
        }

        if let Some(prefix) = joined.strip_suffix(cleaned.as_str()) {
            let prefix = prefix.trim();
            if !prefix.is_empty() {
                self.discard(prefix, pending.offset, DiscardReason::GarbagePrefix);
            }
        }
        self.citations.push(RawCitation {
            text: cleaned,
            offset: pending.offset,
        });
    }

    fn rejection(&self, candidate: &str) -> Option<DiscardReason> {
        let config = self.config;
        let chars = candidate.chars().count();
        if chars < config.min_citation_chars {
            Some(DiscardReason::TooShort)
        } else if !has_plausible_year(candidate) {
            Some(DiscardReason::NoYear)
        } else if contains_exclusion_phrase_in(candidate, &config.exclusion_phrases) {
            Some(DiscardReason::ExclusionPhrase)
        } else if chars > config.max_citation_chars {
            Some(DiscardReason::TooLong)
        } else if count_concatenation_artifacts(candidate) > config.max_concatenation_artifacts {
            Some(DiscardReason::ExtractionArtifacts)
        } else {
            None
        }
    }

    fn finish(mut self) -> Segmentation {
        self.flush();
        Segmentation {
            citations: self.citations,
            discarded: self.discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParsingConfigBuilder;

    const SECTION: &str = "Frontiers in Marine Science | www.frontiersin.org
Smith, J., Doe, A. (2009). A study of coastal upwelling. J. Mar. Syst. 78:
123-145.
Pérez, M., González, R.,
Soto, L. (2012). Kelp forest dynamics in northern Chile. Rev. Biol. Mar.
Oceanogr. 47: 1-12.
14
Thiel, M. (2003). Rafting of benthic macrofauna: important factors determining
the temporal succession of the assemblage. J. Sea Res. 49: 305-317.
FUNDING
This work was supported by FONDECYT 1150214 (2015).
";

    fn non_ws(text: &str) -> usize {
        text.chars().filter(|c| !c.is_whitespace()).count()
    }

    #[test]
    fn test_segment_author_year_lines() {
        let seg = segment_references(SECTION);
        assert_eq!(seg.citations.len(), 3);
        assert_eq!(
            seg.citations[0].text,
            "Smith, J., Doe, A. (2009). A study of coastal upwelling. J. Mar. Syst. 78: 123-145."
        );
        assert!(seg.citations[1].text.starts_with("Pérez, M., González, R., Soto, L. (2012)"));
        assert!(seg.citations[2].text.ends_with("J. Sea Res. 49: 305-317."));
    }

    #[test]
    fn test_segment_offsets_point_at_first_line() {
        let seg = segment_references(SECTION);
        for citation in &seg.citations {
            let head: String = citation.text.chars().take(8).collect();
            assert!(SECTION[citation.offset..].starts_with(&head));
        }
    }

    #[test]
    fn test_segment_discards_headers_and_tail() {
        let seg = segment_references(SECTION);
        let reasons: Vec<DiscardReason> = seg.discarded.iter().map(|d| d.reason).collect();
        assert!(reasons.contains(&DiscardReason::RunningHeader));
        assert!(reasons.contains(&DiscardReason::PageNumber));
        let tail = seg
            .discarded
            .iter()
            .find(|d| d.reason == DiscardReason::SectionEnd)
            .unwrap();
        assert!(tail.text.starts_with("FUNDING"));
        assert!(tail.text.contains("FONDECYT"));
        assert!(seg.citations.iter().all(|c| !c.text.contains("FONDECYT")));
    }

    #[test]
    fn test_segment_covers_all_text() {
        let seg = segment_references(SECTION);
        let covered: usize = seg.citations.iter().map(|c| non_ws(&c.text)).sum::<usize>()
            + seg.discarded.iter().map(|d| non_ws(&d.text)).sum::<usize>();
        assert_eq!(covered, non_ws(SECTION));
    }

    #[test]
    fn test_segment_place_year_is_not_a_start() {
        let text = "Smith, J. (2009). History of the artisanal fisheries of Latin\nAmerica, 1967–73. Fish. Bull. 12: 1-20.\n";
        let seg = segment_references(text);
        assert_eq!(seg.citations.len(), 1);
        assert!(seg.citations[0].text.contains("Latin America, 1967–73"));
    }

    #[test]
    fn test_segment_surname_particles_open_citations() {
        let text = "Smith, J. (2009). A study of coastal upwelling. J. Mar. Syst. 78: 123-145.\n\
Van Der Berg, H. 2001. Kelp forest dynamics in the southern hemisphere. Mar. Biol. 12: 1-20.\n\
de la Fuente, J. (2004). Tesis, Pontificia Universidad Católica\n\
de Chile, Santiago, 120 pp.\n";
        let seg = segment_references(text);
        assert_eq!(seg.citations.len(), 3);
        assert!(seg.citations[1].text.starts_with("Van Der Berg, H. 2001."));
        assert!(seg.citations[2].text.ends_with("Católica de Chile, Santiago, 120 pp."));
    }

    #[test]
    fn test_segment_numbered() {
        let text = "1. Smith J, Doe A. Coastal upwelling off central Chile. J Mar Syst. 2009;78:123-45.\n2. Thiel M. Rafting of benthic macrofauna. J Sea Res. 2003;49:305-17.\n";
        let seg = segment_references(text);
        assert_eq!(seg.citations.len(), 2);
        assert!(seg.citations[1].text.starts_with("2. Thiel M."));
    }

    #[test]
    fn test_segment_identifier_line_joins_citation() {
        let text = "Thiel, M. (2003). Rafting of benthic macrofauna. J. Sea Res. 49: 305-317.\ndoi: 10.1016/S1385-1101(03)00020-8\n";
        let seg = segment_references(text);
        assert_eq!(seg.citations.len(), 1);
        assert!(seg.citations[0].text.contains("10.1016/S1385-1101(03)00020-8"));
    }

    #[test]
    fn test_segment_single_unbroken_line() {
        let text = "Smith, J. (2009). A study of coastal upwelling. J. Mar. Syst. 78: 123-145. Jones, B. (2010). Rafting of kelp in the Humboldt Current. Mar. Biol. 12: 1-10. Thiel, M. (2003). Rafting of benthic macrofauna. J. Sea Res. 49: 305-317.";
        let seg = segment_references(text);
        assert_eq!(seg.citations.len(), 3);
        assert!(seg.citations[1].text.starts_with("Jones, B. (2010)"));
        assert_eq!(seg.citations[1].offset, text.find("Jones").unwrap());
    }

    #[test]
    fn test_segment_rejections() {
        let text = "Smith, J. (2009). Short.\n\nWe thank FONDECYT for funding support in the 2015 season of sampling.\nJones, B. Rafting of kelp in the Humboldt Current system without any date given.\n";
        let seg = segment_references(text);
        assert!(seg.citations.is_empty());
        let reasons: Vec<DiscardReason> = seg.discarded.iter().map(|d| d.reason).collect();
        assert!(reasons.contains(&DiscardReason::TooShort));
        assert!(reasons.contains(&DiscardReason::ExclusionPhrase));
        assert!(reasons.contains(&DiscardReason::NoYear));
    }

    #[test]
    fn test_segment_garbage_prefix_is_recorded() {
        let text = "and approved the submitted version. Smith, J. (2009). A study of coastal upwelling. J. Mar. Syst. 78: 123-145.\n";
        let seg = segment_references(text);
        assert_eq!(seg.citations.len(), 1);
        assert!(seg.citations[0].text.starts_with("Smith, J."));
        assert!(
            seg.discarded
                .iter()
                .any(|d| d.reason == DiscardReason::GarbagePrefix)
        );
    }

    #[test]
    fn test_segment_custom_min_length() {
        let config = ParsingConfigBuilder::new()
            .min_citation_chars(20)
            .build()
            .unwrap();
        let seg = segment_references_with_config("Smith, J. (2009). Short note.\n", &config);
        assert_eq!(seg.citations.len(), 1);
    }

    #[test]
    fn test_find_references_section_last_heading() {
        let pages = vec![
            "Contents\nIntroduction 1\nReferences\n".to_string(),
            "Body text of the article.".to_string(),
            "REFERENCIAS\nSmith, J. (2009). A study.\n".to_string(),
        ];
        let section = find_references_section(&pages).unwrap();
        assert_eq!(section.location, SectionLocation::Heading);
        assert_eq!(section.text, "Smith, J. (2009). A study.\n");
    }

    #[test]
    fn test_find_references_section_fallback() {
        let pages: Vec<String> = (1..=5).map(|i| format!("page {i}")).collect();
        let section = find_references_section(&pages).unwrap();
        assert_eq!(section.location, SectionLocation::Fallback);
        assert_eq!(section.text, "page 3\npage 4\npage 5");

        assert!(find_references_section(&[String::new()]).is_none());
    }

    #[test]
    fn test_find_section_custom_heading_re() {
        let config = ParsingConfigBuilder::new()
            .section_heading_regex(r"(?i)^literatura\s+consultada$")
            .build()
            .unwrap();
        let pages = vec!["Texto.\nLITERATURA CONSULTADA\nSmith, J. (2009).".to_string()];
        let section = find_references_section_with_config(&pages, &config).unwrap();
        assert_eq!(section.location, SectionLocation::Heading);
        assert_eq!(section.text, "Smith, J. (2009).");
    }
}
