//! Configuration file parser for `feedport.toml`.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::content::{Backend, Converter, Markup};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Import settings.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory entries are written below.
    pub entries_root: PathBuf,

    /// strftime pattern for the `date:` front matter value.
    pub date_format: String,

    /// Permalink pattern; tokens `:year`, `:month`, `:day`, `:slug`.
    pub entry_permalink: String,

    /// Default target markup (`markdown`, `rst` or `html`).
    pub format: String,

    /// Fetch timeout in seconds. 0 = no timeout.
    pub fetch_timeout_secs: u64,

    pub backends: BackendsConfig,
}

/// Converter chains as command lines, tried in order.
///
/// ```toml
/// [backends]
/// markdown = [["pandoc", "-f", "html", "-t", "gfm"], ["html2text"]]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub markdown: Option<Vec<Vec<String>>>,
    pub rst: Option<Vec<Vec<String>>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entries_root: PathBuf::from("content"),
            date_format: "%d.%m.%Y, %H:%M".to_string(),
            entry_permalink: "/:year/:slug/".to_string(),
            format: "markdown".to_string(),
            fetch_timeout_secs: 0,
            backends: BackendsConfig::default(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "entries_root",
                "date_format",
                "entry_permalink",
                "format",
                "fetch_timeout_secs",
                "backends",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            entries_root = %config.entries_root.display(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Target markup named by `format`. Unknown names select HTML.
    pub fn markup(&self) -> Markup {
        Markup::from_name(&self.format)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }

    /// Converter with the configured chains, falling back to the built-in
    /// chain for any target left unset.
    pub fn converter(&self) -> Converter {
        let builtin = Converter::default();
        let chain = |configured: &Option<Vec<Vec<String>>>, target: Markup| -> Vec<Backend> {
            match configured {
                Some(commands) => commands
                    .iter()
                    .filter_map(|command| Backend::from_command(command))
                    .collect(),
                None => builtin.chain(target).to_vec(),
            }
        };
        Converter::new(
            chain(&self.backends.markdown, Markup::Markdown),
            chain(&self.backends.rst, Markup::Rst),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedport.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.entries_root, PathBuf::from("content"));
        assert_eq!(config.date_format, "%d.%m.%Y, %H:%M");
        assert_eq!(config.entry_permalink, "/:year/:slug/");
        assert_eq!(config.markup(), Markup::Markdown);
        assert!(config.fetch_timeout().is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.format, "markdown");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (_dir, path) = write_config("");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.entry_permalink, "/:year/:slug/");
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (_dir, path) = write_config("   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.format, "markdown");
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("format = \"rst\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.markup(), Markup::Rst);
        assert_eq!(config.date_format, "%d.%m.%Y, %H:%M");
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
entries_root = "site/entries"
date_format = "%Y-%m-%d"
entry_permalink = "/:year/:month/:slug/"
format = "html"
fetch_timeout_secs = 30

[backends]
markdown = [["pandoc", "-f", "html", "-t", "gfm"], ["html2text"]]
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.entries_root, PathBuf::from("site/entries"));
        assert_eq!(config.date_format, "%Y-%m-%d");
        assert_eq!(config.entry_permalink, "/:year/:month/:slug/");
        assert_eq!(config.markup(), Markup::Html);
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(30)));

        let converter = config.converter();
        let programs: Vec<_> = converter
            .chain(Markup::Markdown)
            .iter()
            .map(Backend::program)
            .collect();
        assert_eq!(programs, vec!["pandoc", "html2text"]);
        // rst not configured: built-in chain
        assert_eq!(converter.chain(Markup::Rst)[1].program(), "html2rest");
    }

    #[test]
    fn test_empty_command_lines_skipped() {
        let (_dir, path) = write_config("[backends]\nrst = [[], [\"pandoc\", \"-t\", \"rst\"]]\n");
        let converter = Config::load(&path).unwrap().converter();
        assert_eq!(converter.chain(Markup::Rst).len(), 1);
    }

    #[test]
    fn test_empty_chain_disables_conversion() {
        let (_dir, path) = write_config("[backends]\nmarkdown = []\n");
        let converter = Config::load(&path).unwrap().converter();
        assert!(converter.chain(Markup::Markdown).is_empty());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("format = \"rst\"\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.format, "rst");
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("fetch_timeout_secs = \"soon\"\n");
        assert!(Config::load(&path).is_err());
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }
}
