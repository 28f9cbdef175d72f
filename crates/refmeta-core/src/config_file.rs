use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error("failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub disabled_sources: Option<Vec<String>>,
    pub registry: Option<RegistryConfig>,
    pub structured_metadata: Option<StructuredMetadataConfig>,
    pub language_model: Option<LanguageModelConfig>,
    pub parsing: Option<ParsingSection>,
    pub concurrency: Option<ConcurrencyConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub crossref_mailto: Option<String>,
    pub crossref_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredMetadataConfig {
    pub grobid_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageModelConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub excerpt_pages: Option<usize>,
    pub excerpt_min_chars: Option<usize>,
    pub excerpt_max_chars: Option<usize>,
}

/// Segmenter and extractor thresholds. Applied by the parsing crate's
/// config builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsingSection {
    pub min_citation_chars: Option<usize>,
    pub max_citation_chars: Option<usize>,
    pub max_concatenation_artifacts: Option<usize>,
    pub fallback_pages: Option<usize>,
    pub title_continuation: Option<bool>,
    /// Added to the built-in section-end markers.
    pub section_end_markers: Option<Vec<String>>,
    /// Added to the built-in exclusion phrases.
    pub exclusion_phrases: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_citations: Option<usize>,
}

impl ConfigFile {
    /// Copy every value present in the file onto `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(disabled) = &self.disabled_sources {
            config.disabled_sources = disabled.clone();
        }
        if let Some(r) = &self.registry {
            set_opt(&mut config.crossref_mailto, &r.crossref_mailto);
            set_opt(&mut config.crossref_base_url, &r.crossref_base_url);
            set(&mut config.registry_timeout_secs, r.timeout_secs);
        }
        if let Some(s) = &self.structured_metadata {
            set_opt(&mut config.grobid_url, &s.grobid_url);
            set(&mut config.grobid_timeout_secs, s.timeout_secs);
        }
        if let Some(l) = &self.language_model {
            set_opt(&mut config.llm_api_key, &l.api_key);
            set(&mut config.llm_model, l.model.clone());
            set(&mut config.llm_max_tokens, l.max_tokens);
            set_opt(&mut config.llm_base_url, &l.base_url);
            set(&mut config.llm_timeout_secs, l.timeout_secs);
            set(&mut config.llm_excerpt_pages, l.excerpt_pages);
            set(&mut config.llm_excerpt_min_chars, l.excerpt_min_chars);
            set(&mut config.llm_excerpt_max_chars, l.excerpt_max_chars);
        }
        if let Some(c) = &self.concurrency {
            set(&mut config.max_concurrent_citations, c.max_concurrent_citations);
        }
    }

    /// Snapshot of a runtime config, for `init-config`. Parsing settings are
    /// carried over from `parsing` unchanged.
    pub fn from_config(config: &Config, parsing: Option<ParsingSection>) -> Self {
        Self {
            disabled_sources: Some(config.disabled_sources.clone()),
            registry: Some(RegistryConfig {
                crossref_mailto: config.crossref_mailto.clone(),
                crossref_base_url: config.crossref_base_url.clone(),
                timeout_secs: Some(config.registry_timeout_secs),
            }),
            structured_metadata: Some(StructuredMetadataConfig {
                grobid_url: config.grobid_url.clone(),
                timeout_secs: Some(config.grobid_timeout_secs),
            }),
            language_model: Some(LanguageModelConfig {
                api_key: config.llm_api_key.clone(),
                model: Some(config.llm_model.clone()),
                max_tokens: Some(config.llm_max_tokens),
                base_url: config.llm_base_url.clone(),
                timeout_secs: Some(config.llm_timeout_secs),
                excerpt_pages: Some(config.llm_excerpt_pages),
                excerpt_min_chars: Some(config.llm_excerpt_min_chars),
                excerpt_max_chars: Some(config.llm_excerpt_max_chars),
            }),
            parsing,
            concurrency: Some(ConcurrencyConfig {
                max_concurrent_citations: Some(config.max_concurrent_citations),
            }),
        }
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn set_opt(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

/// Platform config directory path: `<config_dir>/refmeta/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("refmeta").join("config.toml"))
}

/// Load config by cascading CWD `.refmeta.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".refmeta.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// `overlay`'s field if set, else `base`'s.
fn pick<S, T>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (b, o) = (&base, &overlay);
    ConfigFile {
        disabled_sources: o.disabled_sources.clone().or_else(|| b.disabled_sources.clone()),
        registry: Some(RegistryConfig {
            crossref_mailto: pick(&o.registry, &b.registry, |r| r.crossref_mailto.clone()),
            crossref_base_url: pick(&o.registry, &b.registry, |r| r.crossref_base_url.clone()),
            timeout_secs: pick(&o.registry, &b.registry, |r| r.timeout_secs),
        }),
        structured_metadata: Some(StructuredMetadataConfig {
            grobid_url: pick(&o.structured_metadata, &b.structured_metadata, |s| {
                s.grobid_url.clone()
            }),
            timeout_secs: pick(&o.structured_metadata, &b.structured_metadata, |s| {
                s.timeout_secs
            }),
        }),
        language_model: Some(LanguageModelConfig {
            api_key: pick(&o.language_model, &b.language_model, |l| l.api_key.clone()),
            model: pick(&o.language_model, &b.language_model, |l| l.model.clone()),
            max_tokens: pick(&o.language_model, &b.language_model, |l| l.max_tokens),
            base_url: pick(&o.language_model, &b.language_model, |l| l.base_url.clone()),
            timeout_secs: pick(&o.language_model, &b.language_model, |l| l.timeout_secs),
            excerpt_pages: pick(&o.language_model, &b.language_model, |l| l.excerpt_pages),
            excerpt_min_chars: pick(&o.language_model, &b.language_model, |l| {
                l.excerpt_min_chars
            }),
            excerpt_max_chars: pick(&o.language_model, &b.language_model, |l| {
                l.excerpt_max_chars
            }),
        }),
        parsing: Some(ParsingSection {
            min_citation_chars: pick(&o.parsing, &b.parsing, |p| p.min_citation_chars),
            max_citation_chars: pick(&o.parsing, &b.parsing, |p| p.max_citation_chars),
            max_concatenation_artifacts: pick(&o.parsing, &b.parsing, |p| {
                p.max_concatenation_artifacts
            }),
            fallback_pages: pick(&o.parsing, &b.parsing, |p| p.fallback_pages),
            title_continuation: pick(&o.parsing, &b.parsing, |p| p.title_continuation),
            section_end_markers: pick(&o.parsing, &b.parsing, |p| p.section_end_markers.clone()),
            exclusion_phrases: pick(&o.parsing, &b.parsing, |p| p.exclusion_phrases.clone()),
        }),
        concurrency: Some(ConcurrencyConfig {
            max_concurrent_citations: pick(&o.concurrency, &b.concurrency, |c| {
                c.max_concurrent_citations
            }),
        }),
    }
}

/// Write a config to `path`, creating parent directories.
pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Save the current config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to_path(config, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = ConfigFile {
            structured_metadata: Some(StructuredMetadataConfig {
                grobid_url: Some("http://localhost:8070".to_string()),
                ..Default::default()
            }),
            parsing: Some(ParsingSection {
                min_citation_chars: Some(40),
                ..Default::default()
            }),
            ..Default::default()
        };
        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(
            loaded.structured_metadata.unwrap().grobid_url.as_deref(),
            Some("http://localhost:8070")
        );
        assert_eq!(loaded.parsing.unwrap().min_citation_chars, Some(40));
    }

    #[test]
    fn unparseable_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[registry\ncrossref_mailto = ").unwrap();
        assert!(load_from_path(&path).is_none());
        assert!(load_from_path(&dir.path().join("missing.toml")).is_none());
    }

    #[test]
    fn merge_overlay_wins_and_base_preserved() {
        let base: ConfigFile = toml::from_str(
            "[registry]\ncrossref_mailto = \"base@example.org\"\ntimeout_secs = 5\n",
        )
        .unwrap();
        let overlay: ConfigFile =
            toml::from_str("[registry]\ntimeout_secs = 15\n[concurrency]\nmax_concurrent_citations = 8\n")
                .unwrap();
        let merged = merge(base, overlay);
        let registry = merged.registry.unwrap();
        assert_eq!(registry.crossref_mailto.as_deref(), Some("base@example.org"));
        assert_eq!(registry.timeout_secs, Some(15));
        assert_eq!(merged.concurrency.unwrap().max_concurrent_citations, Some(8));
    }

    #[test]
    fn apply_only_overrides_present_values() {
        let file: ConfigFile = toml::from_str(
            "disabled_sources = [\"language-model\"]\n[language_model]\nmodel = \"custom\"\n",
        )
        .unwrap();
        let mut config = Config::default();
        file.apply(&mut config);
        assert_eq!(config.llm_model, "custom");
        assert_eq!(config.disabled_sources, vec!["language-model"]);
        assert_eq!(config.registry_timeout_secs, 10);
        assert_eq!(config.llm_excerpt_max_chars, 10_000);
    }

    #[test]
    fn snapshot_of_default_config_applies_cleanly() {
        let snapshot = ConfigFile::from_config(&Config::default(), None);
        let text = toml::to_string_pretty(&snapshot).unwrap();
        let parsed: ConfigFile = toml::from_str(&text).unwrap();
        let mut config = Config {
            llm_timeout_secs: 99,
            ..Default::default()
        };
        parsed.apply(&mut config);
        assert_eq!(config.llm_timeout_secs, 20);
    }
}
