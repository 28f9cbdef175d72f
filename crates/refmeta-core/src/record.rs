//! Record model shared by every extractor and by the fusion engine.

use serde::{Deserialize, Serialize};

/// The extractor that produced a [`PartialRecord`].
///
/// Variants are declared in fusion precedence order: registry lookups first,
/// the regex baseline last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    RegistryByDoi,
    RegistryByTitle,
    StructuredMetadata,
    LanguageModel,
    Regex,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::RegistryByDoi => "registry-by-doi",
            Source::RegistryByTitle => "registry-by-title",
            Source::StructuredMetadata => "structured-metadata",
            Source::LanguageModel => "language-model",
            Source::Regex => "regex",
        }
    }

    /// Lower rank wins during fusion.
    pub fn rank(&self) -> u8 {
        match self {
            Source::RegistryByDoi => 0,
            Source::RegistryByTitle => 1,
            Source::StructuredMetadata => 2,
            Source::LanguageModel => 3,
            Source::Regex => 4,
        }
    }

    pub fn is_registry(&self) -> bool {
        matches!(self, Source::RegistryByDoi | Source::RegistryByTitle)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of work a record describes, serialized with the record vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "Artículo en revista científica")]
    JournalArticle,
    #[serde(rename = "Capítulo de libro")]
    BookChapter,
    #[serde(rename = "Libro")]
    Book,
    #[serde(rename = "Tesis")]
    Thesis,
    #[serde(rename = "Informe técnico")]
    TechnicalReport,
    #[serde(rename = "Artículo en actas")]
    ConferencePaper,
    #[serde(rename = "Preprint")]
    Preprint,
    #[serde(rename = "Conjunto de datos")]
    Dataset,
    #[serde(rename = "Otro")]
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 9] = [
        DocumentType::JournalArticle,
        DocumentType::BookChapter,
        DocumentType::Book,
        DocumentType::Thesis,
        DocumentType::TechnicalReport,
        DocumentType::ConferencePaper,
        DocumentType::Preprint,
        DocumentType::Dataset,
        DocumentType::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::JournalArticle => "Artículo en revista científica",
            DocumentType::BookChapter => "Capítulo de libro",
            DocumentType::Book => "Libro",
            DocumentType::Thesis => "Tesis",
            DocumentType::TechnicalReport => "Informe técnico",
            DocumentType::ConferencePaper => "Artículo en actas",
            DocumentType::Preprint => "Preprint",
            DocumentType::Dataset => "Conjunto de datos",
            DocumentType::Other => "Otro",
        }
    }

    /// Parse a label from the closed vocabulary. Case and surrounding
    /// whitespace are ignored; anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.label().to_lowercase() == wanted)
    }
}

/// Yes/no flag used for peer-review and open-access markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
    #[serde(rename = "Sí")]
    Yes,
    #[serde(rename = "No")]
    No,
}

impl Flag {
    pub fn label(&self) -> &'static str {
        match self {
            Flag::Yes => "Sí",
            Flag::No => "No",
        }
    }

    /// Accepts "Sí"/"Si"/"Yes"/"true" and "No"/"false".
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "sí" | "si" | "yes" | "true" => Some(Flag::Yes),
            "no" | "false" => Some(Flag::No),
            _ => None,
        }
    }
}

/// Coarse first-page classification used to pick which optional sources to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentTypeHint {
    JournalArticle,
    Book,
    BookChapter,
    Thesis,
    TechnicalReport,
    #[default]
    Unknown,
}

impl DocumentTypeHint {
    pub fn name(&self) -> &'static str {
        match self {
            DocumentTypeHint::JournalArticle => "journal-article",
            DocumentTypeHint::Book => "book",
            DocumentTypeHint::BookChapter => "book-chapter",
            DocumentTypeHint::Thesis => "thesis",
            DocumentTypeHint::TechnicalReport => "technical-report",
            DocumentTypeHint::Unknown => "unknown",
        }
    }

    /// Non-article documents rarely live in registries; the language model
    /// reads their front matter better.
    pub fn prefers_language_model(&self) -> bool {
        !matches!(self, DocumentTypeHint::JournalArticle)
    }

    pub fn prefers_structured_metadata(&self) -> bool {
        matches!(
            self,
            DocumentTypeHint::JournalArticle | DocumentTypeHint::Unknown
        )
    }

    pub fn document_type(&self) -> Option<DocumentType> {
        match self {
            DocumentTypeHint::JournalArticle => Some(DocumentType::JournalArticle),
            DocumentTypeHint::Book => Some(DocumentType::Book),
            DocumentTypeHint::BookChapter => Some(DocumentType::BookChapter),
            DocumentTypeHint::Thesis => Some(DocumentType::Thesis),
            DocumentTypeHint::TechnicalReport => Some(DocumentType::TechnicalReport),
            DocumentTypeHint::Unknown => None,
        }
    }
}

/// The canonical structured output. Every field is optional; an all-empty
/// record is a valid result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographicRecord {
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub title: Option<String>,
    pub venue: Option<String>,
    pub publisher: Option<String>,
    pub volume: Option<String>,
    #[serde(rename = "issueOrArticleNumber")]
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub isbn_issn: Option<String>,
    pub link: Option<String>,
    pub language: Option<String>,
    pub document_type: Option<DocumentType>,
    pub document_type_other: Option<String>,
    pub peer_reviewed: Option<Flag>,
    pub open_access: Option<Flag>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<String>,
}

/// Free-text fields of a record, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Authors,
    Title,
    Venue,
    Publisher,
    Volume,
    Issue,
    Pages,
    Doi,
    IsbnIssn,
    Link,
    Language,
    DocumentTypeOther,
    Abstract,
    Keywords,
}

impl TextField {
    pub const ALL: [TextField; 14] = [
        TextField::Authors,
        TextField::Title,
        TextField::Venue,
        TextField::Publisher,
        TextField::Volume,
        TextField::Issue,
        TextField::Pages,
        TextField::Doi,
        TextField::IsbnIssn,
        TextField::Link,
        TextField::Language,
        TextField::DocumentTypeOther,
        TextField::Abstract,
        TextField::Keywords,
    ];
}

impl BibliographicRecord {
    pub fn text(&self, field: TextField) -> Option<&str> {
        let value = match field {
            TextField::Authors => &self.authors,
            TextField::Title => &self.title,
            TextField::Venue => &self.venue,
            TextField::Publisher => &self.publisher,
            TextField::Volume => &self.volume,
            TextField::Issue => &self.issue,
            TextField::Pages => &self.pages,
            TextField::Doi => &self.doi,
            TextField::IsbnIssn => &self.isbn_issn,
            TextField::Link => &self.link,
            TextField::Language => &self.language,
            TextField::DocumentTypeOther => &self.document_type_other,
            TextField::Abstract => &self.abstract_text,
            TextField::Keywords => &self.keywords,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn set_text(&mut self, field: TextField, value: Option<String>) {
        let slot = match field {
            TextField::Authors => &mut self.authors,
            TextField::Title => &mut self.title,
            TextField::Venue => &mut self.venue,
            TextField::Publisher => &mut self.publisher,
            TextField::Volume => &mut self.volume,
            TextField::Issue => &mut self.issue,
            TextField::Pages => &mut self.pages,
            TextField::Doi => &mut self.doi,
            TextField::IsbnIssn => &mut self.isbn_issn,
            TextField::Link => &mut self.link,
            TextField::Language => &mut self.language,
            TextField::DocumentTypeOther => &mut self.document_type_other,
            TextField::Abstract => &mut self.abstract_text,
            TextField::Keywords => &mut self.keywords,
        };
        *slot = value;
    }

    /// Number of populated fields.
    pub fn filled_fields(&self) -> usize {
        let text = TextField::ALL
            .iter()
            .filter(|f| self.text(**f).is_some())
            .count();
        text + usize::from(self.year.is_some())
            + usize::from(self.document_type.is_some())
            + usize::from(self.peer_reviewed.is_some())
            + usize::from(self.open_access.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.filled_fields() == 0
    }
}

/// A record produced by exactly one extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRecord {
    pub source: Source,
    pub record: BibliographicRecord,
    /// Set by the regex extractor when the year came from a
    /// "Journal, Place, Volume: Pages, Year" header line.
    #[serde(default)]
    pub year_from_header: bool,
}

impl PartialRecord {
    pub fn new(source: Source, record: BibliographicRecord) -> Self {
        Self {
            source,
            record,
            year_from_header: false,
        }
    }

    pub fn empty(source: Source) -> Self {
        Self::new(source, BibliographicRecord::default())
    }
}

/// One candidate citation cut from a reference section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCitation {
    pub text: String,
    /// Byte offset of the citation's first line within the section text.
    pub offset: usize,
}

/// Why a stretch of reference-section text did not become a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscardReason {
    BlankLine,
    RunningHeader,
    PageNumber,
    SectionEnd,
    ExclusionPhrase,
    TooShort,
    TooLong,
    NoYear,
    ExtractionArtifacts,
    /// Boilerplate glued to the front of a citation, such as the tail of an
    /// author-contribution statement.
    GarbagePrefix,
}

impl DiscardReason {
    pub fn name(&self) -> &'static str {
        match self {
            DiscardReason::BlankLine => "blank-line",
            DiscardReason::RunningHeader => "running-header",
            DiscardReason::PageNumber => "page-number",
            DiscardReason::SectionEnd => "section-end",
            DiscardReason::ExclusionPhrase => "exclusion-phrase",
            DiscardReason::TooShort => "too-short",
            DiscardReason::TooLong => "too-long",
            DiscardReason::NoYear => "no-year",
            DiscardReason::ExtractionArtifacts => "extraction-artifacts",
            DiscardReason::GarbagePrefix => "garbage-prefix",
        }
    }
}

/// Text the segmenter set aside, kept so that nothing is dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscardedSpan {
    pub text: String,
    pub offset: usize,
    pub reason: DiscardReason,
}

/// Output of document parsing: the document's own metadata plus one record
/// per reference-list entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecords {
    pub header_record: BibliographicRecord,
    pub reference_records: Vec<BibliographicRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_order_matches_rank() {
        let mut sources = vec![
            Source::Regex,
            Source::LanguageModel,
            Source::RegistryByTitle,
            Source::StructuredMetadata,
            Source::RegistryByDoi,
        ];
        sources.sort();
        let ranks: Vec<u8> = sources.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_document_type_labels_roundtrip() {
        for t in DocumentType::ALL {
            assert_eq!(DocumentType::from_label(t.label()), Some(t));
        }
        assert_eq!(
            DocumentType::from_label("  capítulo de libro "),
            Some(DocumentType::BookChapter)
        );
        assert_eq!(DocumentType::from_label("Poem"), None);
    }

    #[test]
    fn test_flag_serializes_as_label() {
        let json = serde_json::to_string(&Flag::Yes).unwrap();
        assert_eq!(json, "\"Sí\"");
        assert_eq!(Flag::from_label("si"), Some(Flag::Yes));
        assert_eq!(Flag::from_label("maybe"), None);
    }

    #[test]
    fn test_blank_text_counts_as_missing() {
        let record = BibliographicRecord {
            title: Some("   ".into()),
            venue: Some("Mar. Ecol.".into()),
            ..Default::default()
        };
        assert_eq!(record.text(TextField::Title), None);
        assert_eq!(record.text(TextField::Venue), Some("Mar. Ecol."));
        assert_eq!(record.filled_fields(), 1);
    }

    #[test]
    fn test_record_json_field_names() {
        let record = BibliographicRecord {
            issue: Some("3".into()),
            abstract_text: Some("text".into()),
            document_type: Some(DocumentType::Thesis),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["issueOrArticleNumber"], "3");
        assert_eq!(json["abstract"], "text");
        assert_eq!(json["documentType"], "Tesis");
        assert!(json["isbnIssn"].is_null());
    }
}
