use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_WIKI_URL: &str = "https://phasmophobia.fandom.com/api.php";
pub const DEFAULT_OUTPUT_FOLDER: &str = "data";
pub const DEFAULT_USER_AGENT: &str = concat!("wiki_extract/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONCURRENCY: usize = 4;

/// Runtime settings, read from `config.json`. Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// MediaWiki `api.php` endpoint.
    #[serde(rename = "WikiURL", default = "default_wiki_url")]
    pub wiki_url: String,
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wiki_url: default_wiki_url(),
            output_folder: default_output_folder(),
            concurrency: default_concurrency(),
            user_agent: None,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file means defaults. Environment
    /// variables `WIKI_API_URL` and `WIKI_OUTPUT_DIR` win over the file.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(json)?;
        if config.concurrency == 0 {
            config.concurrency = 1;
        }
        Ok(config)
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(url) = non_empty("WIKI_API_URL") {
            self.wiki_url = url;
        }
        if let Some(dir) = non_empty("WIKI_OUTPUT_DIR") {
            self.output_folder = PathBuf::from(dir);
        }
        self
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

fn default_wiki_url() -> String {
    DEFAULT_WIKI_URL.to_string()
}

fn default_output_folder() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_FOLDER)
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

// ── Tests ──
