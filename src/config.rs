//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional YAML
//! file, then `TABCAST__*` environment variables (`TABCAST__KEEP_OPEN_SECS=10`,
//! `TABCAST__BROWSER__HEADLESS=true`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const APP_DIR: &str = "tabcast";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub headless: Option<bool>,
    /// DevTools websocket of an already running browser.
    pub websocket_url: Option<String>,
    pub user_data_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserSettings,
    /// YAML overlay for the site strategy registry.
    pub strategies_file: Option<PathBuf>,
    pub selection_file: Option<PathBuf>,
    /// Destination aliases, alias to URL.
    pub destinations: BTreeMap<String, String>,
    /// Seconds the browser stays open after delivery.
    pub keep_open_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            browser: BrowserSettings::default(),
            strategies_file: None,
            selection_file: None,
            destinations: default_destinations(),
            keep_open_secs: 45,
        }
    }
}

fn default_destinations() -> BTreeMap<String, String> {
    [
        ("mistral", "https://chat.mistral.ai/chat"),
        ("claude", "https://claude.ai/new"),
        ("chatgpt", "https://chatgpt.com/"),
        ("deepseek", "https://chat.deepseek.com/"),
        ("aistudio", "https://aistudio.google.com/prompts/new_chat"),
        ("huggingface", "https://huggingface.co/chat/"),
        ("gemini", "https://gemini.google.com/app"),
    ]
    .into_iter()
    .map(|(alias, url)| (alias.to_string(), url.to_string()))
    .collect()
}

impl AppConfig {
    /// Resolve an alias (case-insensitive) to its URL. Anything containing a
    /// scheme is taken as is; a bare host gets `https://`.
    pub fn resolve_destination(&self, raw: &str) -> String {
        let raw = raw.trim();
        if let Some(url) = self.destinations.get(&raw.to_ascii_lowercase()) {
            return url.clone();
        }
        if raw.contains("://") || raw.is_empty() {
            raw.to_string()
        } else {
            format!("https://{raw}")
        }
    }

    pub fn selection_path(&self) -> PathBuf {
        self.selection_file
            .clone()
            .unwrap_or_else(|| app_dir().join("selection.json"))
    }
}

/// `<config_dir>/tabcast`, or `./.tabcast` when the platform has none.
pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".tabcast"))
}

pub fn default_config_path() -> PathBuf {
    app_dir().join("config.yaml")
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
}

/// Load the layered configuration. An explicit `path` must exist; the
/// default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    let defaults = Config::try_from(&AppConfig::default()).context("encode default config")?;
    let settings = Config::builder()
        .add_source(defaults)
        .add_source(
            File::from(path.as_path())
                .format(FileFormat::Yaml)
                .required(required),
        )
        .add_source(
            Environment::with_prefix("TABCAST")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    let config: AppConfig = settings
        .try_deserialize()
        .context("invalid configuration")?;

    if path.exists() {
        info!(path = %path.display(), "loaded configuration");
    } else {
        debug!(path = %path.display(), "no configuration file, using defaults");
    }
    Ok(LoadedConfig { config, path })
}
