//! Primitives shared by the orchestrator, the injector and the platform bridge.
//!
//! Nothing in here owns behaviour; these are the identities and messages that
//! cross the boundary between the two actor domains.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Identifier of a browser tab created for one destination.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TabId(pub Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host identity used to select an injection strategy.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteKey(String);

impl SiteKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(normalize_host(key.as_ref()))
    }

    /// Derive the key from a destination locator. URLs contribute their host,
    /// anything else is used verbatim (lowercased).
    pub fn from_locator(locator: &str) -> Self {
        match Url::parse(locator.trim()) {
            Ok(url) => match url.host_str() {
                Some(host) => Self::new(host),
                None => Self::new(locator),
            },
            Err(_) => Self::new(locator),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_host(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One destination of a broadcast: the locator used to open the tab plus the
/// site key derived from it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct DestinationRef {
    pub locator: String,
    pub site_key: SiteKey,
}

impl DestinationRef {
    pub fn new(locator: impl Into<String>) -> Self {
        let locator = locator.into().trim().to_string();
        let site_key = SiteKey::from_locator(&locator);
        Self { locator, site_key }
    }
}

impl fmt::Display for DestinationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.locator)
    }
}

/// Per-destination failure categories. None of them is fatal to a broadcast.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("tab creation failed")]
    TabCreationFailed,
    #[error("page load timed out")]
    LoadTimeout,
    #[error("command delivery exhausted its retries")]
    DeliveryExhausted,
    #[error("input element not found")]
    ElementNotFound,
    #[error("text injection failed")]
    InjectionFailed,
}

/// Tab lifecycle signals consumed from the browser platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TabEvent {
    /// Navigation for the tab's top-level document completed.
    Loaded(TabId),
    /// The tab was closed or its target went away.
    Removed(TabId),
}

impl TabEvent {
    pub fn tab(&self) -> TabId {
        match self {
            TabEvent::Loaded(tab) | TabEvent::Removed(tab) => *tab,
        }
    }
}

/// Start command sent by the UI surface to the orchestrator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename = "startTyping")]
pub struct StartCommand {
    pub text: String,
    pub destinations: Vec<String>,
}

/// Command the orchestrator delivers to the injector living in a tab.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename = "typeText")]
pub struct InjectionCommand {
    pub text: String,
}

impl InjectionCommand {
    pub fn type_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
