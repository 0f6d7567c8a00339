//! Last chosen destination set, persisted between runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("failed to access selection file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed selection file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSelection {
    #[serde(rename = "selectedServices", default)]
    selected_services: Vec<String>,
}

/// JSON file holding `{"selectedServices": [...]}`.
pub struct SelectionStore {
    path: PathBuf,
}

impl SelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored selection; empty when nothing was saved yet.
    pub fn load(&self) -> Result<Vec<String>, SelectionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SelectionError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let stored: StoredSelection =
            serde_json::from_str(&raw).map_err(|source| SelectionError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(stored.selected_services)
    }

    pub fn save(&self, destinations: &[String]) -> Result<(), SelectionError> {
        let io_err = |source| SelectionError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let stored = StoredSelection {
            selected_services: destinations.to_vec(),
        };
        let body = serde_json::to_string_pretty(&stored).map_err(|source| {
            SelectionError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, body).map_err(io_err)?;
        debug!(path = %self.path.display(), count = destinations.len(), "selection saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SelectionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SelectionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = SelectionStore::new(dir.path().join("selection.json"));
        assert!(store.load().unwrap().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn save_uses_the_selected_services_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("selection.json");
        let store = SelectionStore::new(&path);
        let chosen = vec![
            "https://claude.ai/new".to_string(),
            "https://chat.mistral.ai/chat".to_string(),
        ];
        store.save(&chosen).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["selectedServices"][1], "https://chat.mistral.ai/chat");
        assert_eq!(store.load().unwrap(), chosen);

        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selection.json");
        fs::write(&path, "not json").unwrap();
        let err = SelectionStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SelectionError::Parse { .. }));
    }
}
