use std::io::Write;

use owo_colors::OwoColorize;
use serde_json::json;

use refmeta_core::{BibliographicRecord, DocumentRecords, SourceReport, SourceStatus};
use refmeta_parsing::Segmentation;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Longest raw text shown in human output.
const MAX_RAW_DISPLAY: usize = 200;

fn shorten(text: &str) -> String {
    if text.chars().count() > MAX_RAW_DISPLAY {
        let head: String = text.chars().take(MAX_RAW_DISPLAY).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn heading(w: &mut dyn Write, text: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", text.bold().cyan())
    } else {
        writeln!(w, "{text}")
    }
}

/// Labelled field lines, empty fields left out.
fn record_lines(record: &BibliographicRecord) -> Vec<(&'static str, String)> {
    let mut lines = Vec::new();
    let mut push = |label: &'static str, value: Option<String>| {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            lines.push((label, v));
        }
    };
    push("Authors", record.authors.clone());
    push("Year", record.year.map(|y| y.to_string()));
    push("Title", record.title.clone());
    push("Venue", record.venue.clone());
    push("Publisher", record.publisher.clone());
    push("Volume", record.volume.clone());
    push("Issue", record.issue.clone());
    push("Pages", record.pages.clone());
    push("DOI", record.doi.clone());
    push("ISBN/ISSN", record.isbn_issn.clone());
    push("Link", record.link.clone());
    push("Language", record.language.clone());
    push("Type", record.document_type.map(|t| t.label().to_string()));
    push("Type (other)", record.document_type_other.clone());
    push("Peer reviewed", record.peer_reviewed.map(|f| f.label().to_string()));
    push("Open access", record.open_access.map(|f| f.label().to_string()));
    push("Keywords", record.keywords.clone());
    push("Abstract", record.abstract_text.as_deref().map(shorten));
    lines
}

/// Print one record as aligned `Label: value` lines.
pub fn print_record(
    w: &mut dyn Write,
    record: &BibliographicRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    let lines = record_lines(record);
    if lines.is_empty() {
        if color.enabled() {
            writeln!(w, "  {}", "(no fields extracted)".dimmed())?;
        } else {
            writeln!(w, "  (no fields extracted)")?;
        }
        return Ok(());
    }
    for (label, value) in lines {
        let label = format!("{label}:");
        if color.enabled() {
            writeln!(w, "  {:<15}{}", label.bold(), value)?;
        } else {
            writeln!(w, "  {label:<15}{value}")?;
        }
    }
    Ok(())
}

/// One line per queried source: name, status, elapsed time.
pub fn print_outcomes(
    w: &mut dyn Write,
    report: &SourceReport,
    color: ColorMode,
) -> std::io::Result<()> {
    for outcome in &report.outcomes {
        let status = format!("{:?}", outcome.status);
        let elapsed = outcome
            .elapsed
            .map(|d| format!(" ({} ms)", d.as_millis()))
            .unwrap_or_default();
        if color.enabled() {
            let status = match outcome.status {
                SourceStatus::Found => status.green().to_string(),
                SourceStatus::NoData | SourceStatus::Skipped => status.dimmed().to_string(),
                _ => status.yellow().to_string(),
            };
            writeln!(w, "  {} {}{}", outcome.name.bold(), status, elapsed)?;
        } else {
            writeln!(w, "  {} {}{}", outcome.name, status, elapsed)?;
        }
        if let Some(msg) = &outcome.error_message {
            writeln!(w, "    {msg}")?;
        }
    }
    Ok(())
}

/// Human output for parsed citations.
pub fn print_citations(
    w: &mut dyn Write,
    parsed: &[(String, refmeta_ingest::ParsedCitation)],
    verbose: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    for (i, (text, citation)) in parsed.iter().enumerate() {
        heading(w, &format!("[{}] {}", i + 1, shorten(text)), color)?;
        print_record(w, &citation.record, color)?;
        if verbose {
            writeln!(w, "  Sources:")?;
            print_outcomes(w, &citation.report, color)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

pub fn citations_json(parsed: &[(String, refmeta_ingest::ParsedCitation)]) -> serde_json::Value {
    json!(
        parsed
            .iter()
            .map(|(text, c)| json!({ "input": text, "record": c.record }))
            .collect::<Vec<_>>()
    )
}

/// Human output for a parsed document.
pub fn print_document(
    w: &mut dyn Write,
    name: &str,
    records: &DocumentRecords,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, &format!("{name}: document"), color)?;
    print_record(w, &records.header_record, color)?;
    writeln!(w)?;

    heading(
        w,
        &format!("{name}: {} references", records.reference_records.len()),
        color,
    )?;
    for (i, record) in records.reference_records.iter().enumerate() {
        if color.enabled() {
            writeln!(w, "{}", format!("[{}]", i + 1).bold().yellow())?;
        } else {
            writeln!(w, "[{}]", i + 1)?;
        }
        print_record(w, record, color)?;
    }
    Ok(())
}

/// Dry-run output: each citation as segmented, then what was set aside.
pub fn print_segmentation(
    w: &mut dyn Write,
    name: &str,
    segmentation: &Segmentation,
    color: ColorMode,
) -> std::io::Result<()> {
    let summary = format!(
        "{name} ({} citations, {} discarded spans)",
        segmentation.citations.len(),
        segmentation.discarded.len()
    );
    if color.enabled() {
        writeln!(w, "{} {}\n", "DRY RUN:".bold().cyan(), summary.bold())?;
    } else {
        writeln!(w, "DRY RUN: {summary}\n")?;
    }

    for (i, citation) in segmentation.citations.iter().enumerate() {
        if color.enabled() {
            writeln!(w, "{} @{}", format!("[{}]", i + 1).bold().yellow(), citation.offset)?;
        } else {
            writeln!(w, "[{}] @{}", i + 1, citation.offset)?;
        }
        writeln!(w, "  {}", shorten(&citation.text))?;
    }

    if !segmentation.discarded.is_empty() {
        writeln!(w)?;
        heading(w, "Discarded:", color)?;
        for span in &segmentation.discarded {
            let text = shorten(&span.text.split_whitespace().collect::<Vec<_>>().join(" "));
            if color.enabled() {
                writeln!(w, "  {:<22}{}", span.reason.name().red(), text.dimmed())?;
            } else {
                writeln!(w, "  {:<22}{}", span.reason.name(), text)?;
            }
        }
    }
    Ok(())
}

pub fn segmentation_json(segmentation: &Segmentation) -> serde_json::Value {
    json!({
        "citations": segmentation.citations,
        "discarded": segmentation.discarded,
    })
}
