//! Configuration documents and on-disk layout.
//!
//! Everything here is loaded once per pipeline invocation and injected into
//! the stage entry points; no stage re-reads configuration mid-run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Browser engine used for the collector session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Firefox,
    Chrome,
    Edge,
    Safari,
}

/// Which inference backend the refiner is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Direct generative-model call.
    #[default]
    Generative,
    /// Web-search-augmented call that also returns citation links.
    Search,
}

/// AND/OR combinator for the intake keyword gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeywordMode {
    #[default]
    And,
    Or,
}

/// Intake-time keyword filter: case-insensitive substring match over
/// title + description. An empty word list always passes.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeywordRule {
    pub mode: KeywordMode,
    #[serde(default)]
    pub words: Vec<String>,
}

impl KeywordRule {
    /// Evaluate the gate against a haystack (already concatenated text).
    pub fn matches(&self, haystack: &str) -> bool {
        if self.words.is_empty() {
            return true;
        }
        let lower = haystack.to_lowercase();
        match self.mode {
            KeywordMode::And => self
                .words
                .iter()
                .all(|w| lower.contains(&w.to_lowercase())),
            KeywordMode::Or => self
                .words
                .iter()
                .any(|w| lower.contains(&w.to_lowercase())),
        }
    }
}

/// One facet category: the configured name and the facet values to select.
///
/// Categories are an ordered list — their position, not their name, pairs
/// them with the site's facet blocks (see `collector::facets`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryFilter {
    pub name: String,
    pub values: Vec<String>,
}

/// Filter configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub browser: BrowserKind,
    #[serde(default)]
    pub categories: Vec<CategoryFilter>,
    #[serde(default)]
    pub keywords: KeywordRule,
    /// Free-text bias instructions for the enrichment interest rating.
    #[serde(default)]
    pub system_instructions: String,
    #[serde(default)]
    pub backend: BackendKind,
    /// Model identifier passed to the inference backend.
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

/// Login credentials for the listing site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Inference API key document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub gemini_api_key: String,
}

/// On-disk layout: configs/, tmp/ (snapshot cache), data/ (stores).
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
    pub configs_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl DataPaths {
    /// Resolve the layout under the given root and create the mutable dirs.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let paths = Self {
            configs_dir: root.join("configs"),
            tmp_dir: root.join("tmp"),
            data_dir: root.join("data"),
            root,
        };
        fs::create_dir_all(&paths.tmp_dir)
            .with_context(|| format!("failed to create {}", paths.tmp_dir.display()))?;
        fs::create_dir_all(&paths.data_dir)
            .with_context(|| format!("failed to create {}", paths.data_dir.display()))?;
        Ok(paths)
    }

    /// Default root: $FELLOWSCOUT_HOME, else the current directory.
    pub fn default_root() -> PathBuf {
        if let Ok(p) = std::env::var("FELLOWSCOUT_HOME") {
            return PathBuf::from(p);
        }
        PathBuf::from(".")
    }

    pub fn filters_file(&self) -> PathBuf {
        self.configs_dir.join("filters.json")
    }

    pub fn login_file(&self) -> PathBuf {
        self.configs_dir.join("login.json")
    }

    pub fn api_key_file(&self) -> PathBuf {
        self.configs_dir.join("api_key.json")
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.tmp_dir.join("snapshot.json")
    }

    pub fn raw_store_file(&self) -> PathBuf {
        self.data_dir.join("raw_fellowships.json")
    }

    pub fn processed_store_file(&self) -> PathBuf {
        self.data_dir.join("processed_fellowships.json")
    }

    /// Remove the snapshot cache (forces a full facet re-drive next run).
    pub fn clear_tmp(&self) -> Result<()> {
        if self.tmp_dir.exists() {
            fs::remove_dir_all(&self.tmp_dir)?;
        }
        fs::create_dir_all(&self.tmp_dir)?;
        Ok(())
    }

    /// Remove both stores.
    pub fn clear_data(&self) -> Result<()> {
        if self.data_dir.exists() {
            fs::remove_dir_all(&self.data_dir)?;
        }
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

/// Load a JSON document, with the path in any error.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

impl FilterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl ApiKey {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}
