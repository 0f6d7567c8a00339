use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read strategy overlay {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid strategy overlay {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("strategy for {site} has no element locators")]
    EmptyLocators { site: String },
    #[error("strategy for {site} needs at least one submit locator")]
    EmptySubmitLocators { site: String },
}
