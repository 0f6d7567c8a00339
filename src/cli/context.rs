use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use site_registry::StrategyRegistry;
use tracing::info;

use crate::config::AppConfig;
use crate::selection::SelectionStore;

pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: PathBuf,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn selection_store(&self) -> SelectionStore {
        SelectionStore::new(self.config.selection_path())
    }

    /// Built-in strategies plus the configured overlay, if any.
    pub fn strategies(&self) -> Result<StrategyRegistry> {
        let mut registry = StrategyRegistry::builtin();
        if let Some(path) = &self.config.strategies_file {
            let added = registry
                .load_overlay(path)
                .with_context(|| format!("failed to load strategies from {}", path.display()))?;
            info!(path = %path.display(), added, "loaded strategy overlay");
        }
        Ok(registry)
    }
}
