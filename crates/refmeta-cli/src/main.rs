use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use refmeta_core::Config;
use refmeta_core::config_file::{self, ConfigFile};
use refmeta_ingest::{Pipeline, ProgressEvent};
use refmeta_parsing::{ParsingConfig, ParsingConfigBuilder, ReferenceExtractor};

mod output;

use output::ColorMode;

/// Bibliographic metadata extraction from citations and PDF documents
#[derive(Parser, Debug)]
#[command(name = "refmeta", version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse free-text citations
    Citation {
        /// Citation text
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        text: Option<String>,

        /// Read citations from a file, one per paragraph
        #[arg(long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Parse a PDF document: its own metadata and every reference
    Document {
        /// Path to the PDF file
        pdf: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Dry run: print the segmented reference list without querying any source
    Segment {
        /// Path to the PDF file
        pdf: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Write the effective configuration to the platform config path
    InitConfig {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug, Default, Clone)]
struct CommonArgs {
    /// Do not contact any external source
    #[arg(long)]
    offline: bool,

    /// Machine-readable JSON output
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Path to output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Contact e-mail for the CrossRef polite pool
    #[arg(long)]
    mailto: Option<String>,

    /// Base URL of a GROBID service
    #[arg(long)]
    grobid_url: Option<String>,

    /// API key for the language-model endpoint
    #[arg(long)]
    llm_api_key: Option<String>,

    /// Comma-separated list of sources to disable (registry, structured-metadata, language-model or an adapter name)
    #[arg(long, value_delimiter = ',')]
    disable_sources: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Citation { text, file, common } => citation(text, file, &common, cli.verbose).await,
        Command::Document { pdf, common } => document(&pdf, &common).await,
        Command::Segment { pdf, common } => segment(&pdf, &common),
        Command::InitConfig { common } => init_config(&common),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(
    common: &CommonArgs,
    file: &ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Config {
    let mut config = Config::default();
    file.apply(&mut config);

    if let Some(v) = env("CROSSREF_MAILTO") {
        config.crossref_mailto = Some(v);
    }
    if let Some(v) = env("GROBID_URL") {
        config.grobid_url = Some(v);
    }
    if let Some(v) = env("LLM_API_KEY") {
        config.llm_api_key = Some(v);
    }
    if let Some(v) = env("LLM_MODEL") {
        config.llm_model = v;
    }
    if let Some(v) = env("LLM_BASE_URL") {
        config.llm_base_url = Some(v);
    }
    // GROBID keeps its own, longer deadline.
    if let Some(secs) = env("SOURCE_TIMEOUT").and_then(|v| v.parse::<u64>().ok()) {
        config.registry_timeout_secs = secs;
        config.llm_timeout_secs = secs;
    }

    if common.offline {
        config.offline = true;
    }
    if let Some(v) = &common.mailto {
        config.crossref_mailto = Some(v.clone());
    }
    if let Some(v) = &common.grobid_url {
        config.grobid_url = Some(v.clone());
    }
    if let Some(v) = &common.llm_api_key {
        config.llm_api_key = Some(v.clone());
    }
    if !common.disable_sources.is_empty() {
        config.disabled_sources = common.disable_sources.clone();
    }
    config
}

fn parsing_config(file: &ConfigFile) -> anyhow::Result<ParsingConfig> {
    let section = file.parsing.clone().unwrap_or_default();
    Ok(ParsingConfigBuilder::from_section(&section).build()?)
}

fn load(common: &CommonArgs) -> anyhow::Result<(Config, ParsingConfig)> {
    let file = config_file::load_config();
    let config = resolve_config(common, &file, |key| std::env::var(key).ok());
    let parsing = parsing_config(&file)?;
    tracing::debug!(?config, "configuration resolved");
    Ok((config, parsing))
}

fn color_mode(common: &CommonArgs) -> ColorMode {
    ColorMode(
        !common.no_color && !common.json && common.output.is_none() && std::io::stdout().is_terminal(),
    )
}

fn writer(common: &CommonArgs) -> anyhow::Result<Box<dyn Write>> {
    Ok(match &common.output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Split text into paragraphs separated by blank lines, each joined into
/// one line.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                out.push(current.join(" "));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join(" "));
    }
    out
}

async fn citation(
    text: Option<String>,
    file: Option<PathBuf>,
    common: &CommonArgs,
    verbose: bool,
) -> anyhow::Result<()> {
    let inputs = match (text, file) {
        (Some(text), _) => vec![text],
        (None, Some(path)) => paragraphs(&std::fs::read_to_string(&path)?),
        (None, None) => anyhow::bail!("either a citation or --file is required"),
    };
    if inputs.is_empty() {
        anyhow::bail!("No citations to parse.");
    }

    let (config, parsing) = load(common)?;
    let pipeline = Pipeline::from_config(&config).with_parsing_config(parsing);

    let mut parsed = Vec::with_capacity(inputs.len());
    for input in inputs {
        let result = pipeline.parse_citation_detailed(&input).await;
        parsed.push((input, result));
    }

    let mut writer = writer(common)?;
    if common.json {
        writeln!(
            writer,
            "{}",
            serde_json::to_string_pretty(&output::citations_json(&parsed))?
        )?;
    } else {
        output::print_citations(&mut writer, &parsed, verbose, color_mode(common))?;
    }
    Ok(())
}

fn progress_bar(hidden: bool) -> anyhow::Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template(
        "{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len} (eta {eta})",
    )?);
    bar.set_message("Reading document");
    Ok(bar)
}

async fn document(path: &Path, common: &CommonArgs) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let (config, parsing) = load(common)?;

    let backend = refmeta_ingest::default_backend()?;
    let (pages, bytes) = refmeta_ingest::read_pdf(path, &*backend)?;
    let pipeline = Pipeline::from_config(&config).with_parsing_config(parsing);

    let bar = progress_bar(common.json || !std::io::stderr().is_terminal())?;
    let on_progress = {
        let bar = bar.clone();
        move |event: ProgressEvent| match event {
            ProgressEvent::HeaderDone => bar.set_message("Parsing references"),
            ProgressEvent::ReferencesFound { total } => bar.set_length(total as u64),
            ProgressEvent::ReferenceDone { .. } => bar.inc(1),
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let records = pipeline
        .parse_document_with_progress(&pages, &bytes, on_progress, cancel.clone())
        .await;
    bar.finish_and_clear();
    if cancel.is_cancelled() {
        tracing::warn!(
            done = records.reference_records.len(),
            "cancelled; remaining references were not processed"
        );
    }

    let mut writer = writer(common)?;
    if common.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&records)?)?;
    } else {
        output::print_document(&mut writer, &file_name(path), &records, color_mode(common))?;
    }
    Ok(())
}

fn segment(path: &Path, common: &CommonArgs) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let (_, parsing) = load(common)?;

    let backend = refmeta_ingest::default_backend()?;
    let pages = backend.extract_pages(path)?;
    let extractor = ReferenceExtractor::with_config(parsing);
    let (location, segmentation) = extractor.segment_pages(&pages);
    let location = location.ok_or_else(|| anyhow::anyhow!("No references section found"))?;
    tracing::debug!(?location, "reference section located");

    let mut writer = writer(common)?;
    if common.json {
        writeln!(
            writer,
            "{}",
            serde_json::to_string_pretty(&output::segmentation_json(&segmentation))?
        )?;
    } else {
        output::print_segmentation(&mut writer, &file_name(path), &segmentation, color_mode(common))?;
    }
    Ok(())
}

fn init_config(common: &CommonArgs) -> anyhow::Result<()> {
    let (config, parsing) = load(common)?;
    let file = ConfigFile::from_config(&config, Some(parsing.to_section()));
    let path = config_file::save_config(&file)?;
    println!("Configuration written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_flags_override_env_and_file() {
        let file: ConfigFile = toml::from_str(
            r#"
disabled_sources = ["language-model"]

[registry]
crossref_mailto = "file@example.org"
"#,
        )
        .unwrap();
        let common = CommonArgs {
            mailto: Some("flag@example.org".into()),
            ..Default::default()
        };
        let env = env_from(&[
            ("CROSSREF_MAILTO", "env@example.org"),
            ("GROBID_URL", "http://grobid:8070"),
        ]);

        let config = resolve_config(&common, &file, env);
        assert_eq!(config.crossref_mailto.as_deref(), Some("flag@example.org"));
        assert_eq!(config.grobid_url.as_deref(), Some("http://grobid:8070"));
        assert_eq!(config.disabled_sources, vec!["language-model".to_string()]);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: ConfigFile = toml::from_str(
            r#"
[registry]
crossref_mailto = "file@example.org"
"#,
        )
        .unwrap();
        let env = env_from(&[("CROSSREF_MAILTO", "env@example.org")]);
        let config = resolve_config(&CommonArgs::default(), &file, env);
        assert_eq!(config.crossref_mailto.as_deref(), Some("env@example.org"));
    }

    #[test]
    fn test_source_timeout_env() {
        let env = env_from(&[("SOURCE_TIMEOUT", "3")]);
        let config = resolve_config(&CommonArgs::default(), &ConfigFile::default(), env);
        assert_eq!(config.registry_timeout_secs, 3);
        assert_eq!(config.llm_timeout_secs, 3);
        assert_eq!(config.grobid_timeout_secs, 60);

        let env = env_from(&[("SOURCE_TIMEOUT", "soon")]);
        let config = resolve_config(&CommonArgs::default(), &ConfigFile::default(), env);
        assert_eq!(config.registry_timeout_secs, 10);
    }

    #[test]
    fn test_offline_and_disabled_flags() {
        let common = CommonArgs {
            offline: true,
            disable_sources: vec!["registry".into(), "GROBID".into()],
            ..Default::default()
        };
        let config = resolve_config(&common, &ConfigFile::default(), env_from(&[]));
        assert!(config.offline);
        assert_eq!(config.disabled_sources.len(), 2);
    }

    #[test]
    fn test_paragraphs() {
        let text = "Smith, J. (2009). A study.\n  J. Mar. Syst. 78: 1-2.\n\n\n\nDoe, A. (2010). Another.\n";
        assert_eq!(
            paragraphs(text),
            vec![
                "Smith, J. (2009). A study. J. Mar. Syst. 78: 1-2.".to_string(),
                "Doe, A. (2010). Another.".to_string(),
            ]
        );
        assert!(paragraphs("\n \n").is_empty());
    }

    #[test]
    fn test_parsing_config_from_file() {
        let file: ConfigFile = toml::from_str(
            r#"
[parsing]
min_citation_chars = 30
title_continuation = true
"#,
        )
        .unwrap();
        let parsing = parsing_config(&file).unwrap();
        assert_eq!(parsing.min_citation_chars(), 30);
        assert!(parsing.title_continuation());
    }

    #[test]
    fn test_cli_parses_common_flags() {
        let cli = Cli::try_parse_from([
            "refmeta",
            "document",
            "paper.pdf",
            "--offline",
            "--json",
            "--disable-sources",
            "registry,language-model",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Document { pdf, common } => {
                assert_eq!(pdf, PathBuf::from("paper.pdf"));
                assert!(common.offline && common.json);
                assert_eq!(common.disable_sources, vec!["registry", "language-model"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_citation_requires_text_or_file() {
        assert!(Cli::try_parse_from(["refmeta", "citation"]).is_err());
        assert!(Cli::try_parse_from(["refmeta", "citation", "--file", "refs.txt"]).is_ok());
    }
}
