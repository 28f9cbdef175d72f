//! End-to-end runs of the regex pipeline over a realistic reference list.

use refmeta_core::DiscardReason;
use refmeta_parsing::{ReferenceExtractor, SectionLocation, parse_citation, segment_references};

const SECTION: &str = "\
REFERENCIAS
Smith, J., Doe, A. (2009). A study of coastal upwelling. J. Mar. Syst. 78: 123-145.
Thiel, M., Macaya, E. C., Acuña, E., Arntz, W. E., Bastias, H., Brokordt, K. (2007).
The Humboldt Current System of northern and central Chile. Oceanogr. Mar. Biol. 45: 195-344.
Volume 7 | Article 123
12
Castilla, J. C. (1999). Coastal marine communities: trends and perspectives from human-exclusion experiments. Trends Ecol. Evol. 14: 284-290.

Proyecto FONDECYT 1140862 financió este trabajo durante los años 2014 y 2015 en su totalidad.
AGRADECIMIENTOS
Agradecemos a los pescadores de Caleta Los Vilos por su apoyo en terreno.
";

fn visible(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[test]
fn every_character_is_accounted_for() {
    let body = SECTION.split_once('\n').unwrap().1;
    let segmentation = segment_references(body);

    let mut kept: Vec<(usize, String)> = segmentation
        .citations
        .iter()
        .map(|c| (c.offset, c.text.clone()))
        .chain(segmentation.discarded.iter().map(|d| (d.offset, d.text.clone())))
        .collect();
    kept.sort_by_key(|(offset, _)| *offset);
    let kept: String = kept.iter().map(|(_, t)| visible(t)).collect();

    assert_eq!(kept.chars().count(), visible(body).chars().count());
}

#[test]
fn citations_and_discards_are_classified() {
    let body = SECTION.split_once('\n').unwrap().1;
    let segmentation = segment_references(body);

    assert_eq!(segmentation.citations.len(), 3);
    assert!(segmentation.citations[1].text.contains("Humboldt Current System"));
    assert!(segmentation.citations[2].text.starts_with("Castilla, J. C. (1999)"));

    let reasons: Vec<DiscardReason> = segmentation.discarded.iter().map(|d| d.reason).collect();
    assert!(reasons.contains(&DiscardReason::RunningHeader));
    assert!(reasons.contains(&DiscardReason::PageNumber));
    assert!(reasons.contains(&DiscardReason::ExclusionPhrase));
    assert!(reasons.contains(&DiscardReason::SectionEnd));
    assert!(
        !segmentation
            .citations
            .iter()
            .any(|c| c.text.contains("pescadores"))
    );
}

#[test]
fn pipeline_parses_each_citation() {
    let pages = vec![
        "Invest. Mar., Valparaíso, 28: 39-52, 2000\nCrecimiento de larvas de loco en laboratorio".to_string(),
        SECTION.to_string(),
    ];
    let parsed = ReferenceExtractor::new()
        .extract_references_from_pages(&pages)
        .unwrap();
    assert_eq!(parsed.location, SectionLocation::Heading);
    assert_eq!(parsed.records.len(), parsed.segmentation.citations.len());

    let first = &parsed.records[0].record;
    assert_eq!(first.authors.as_deref(), Some("Smith, J., Doe, A."));
    assert_eq!(first.title.as_deref(), Some("A study of coastal upwelling"));

    let humboldt = &parsed.records[1].record;
    assert_eq!(humboldt.year, Some(2007));
    assert_eq!(humboldt.volume.as_deref(), Some("45"));
    assert_eq!(humboldt.pages.as_deref(), Some("195-344"));
}

#[test]
fn scenario_citation_fields() {
    let record = parse_citation(
        "Smith, J., Doe, A. (2009). A study of coastal upwelling. J. Mar. Syst. 78: 123-145.",
    )
    .record;
    assert_eq!(record.authors.as_deref(), Some("Smith, J., Doe, A."));
    assert_eq!(record.year, Some(2009));
    assert_eq!(record.title.as_deref(), Some("A study of coastal upwelling"));
    assert_eq!(record.venue.as_deref(), Some("J. Mar. Syst."));
    assert_eq!(record.volume.as_deref(), Some("78"));
    assert_eq!(record.pages.as_deref(), Some("123-145"));
}
