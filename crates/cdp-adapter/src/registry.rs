//! Tracks the browser targets backing destination tabs.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tabcast_core_types::TabId;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TabContext {
    pub target_id: String,
    pub cdp_session: Option<String>,
    pub url: Option<String>,
    /// Set once the tab was navigated to its destination; load signals
    /// before that belong to the initial blank document.
    pub armed: bool,
}

/// Concurrent registry of tabs.
#[derive(Default)]
pub struct Registry {
    tabs: DashMap<TabId, TabContext>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tab(&self, tab: TabId, target_id: String, url: Option<String>) {
        self.tabs.insert(
            tab,
            TabContext {
                target_id,
                cdp_session: None,
                url,
                armed: false,
            },
        );
    }

    pub fn remove_tab(&self, tab: &TabId) -> Option<TabContext> {
        self.tabs.remove(tab).map(|(_, ctx)| ctx)
    }

    pub fn get(&self, tab: &TabId) -> Option<TabContext> {
        self.tabs.get(tab).map(|entry| entry.value().clone())
    }

    pub fn iter(&self) -> Vec<(TabId, TabContext)> {
        self.tabs
            .iter()
            .map(|kv| (*kv.key(), kv.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn set_cdp_session(&self, tab: &TabId, session: String) {
        if let Some(mut entry) = self.tabs.get_mut(tab) {
            entry.cdp_session = Some(session);
        }
    }

    pub fn get_cdp_session(&self, tab: &TabId) -> Option<String> {
        self.tabs
            .get(tab)
            .and_then(|entry| entry.cdp_session.clone())
    }

    pub fn set_url(&self, tab: &TabId, url: String) {
        if let Some(mut entry) = self.tabs.get_mut(tab) {
            entry.url = Some(url);
        }
    }

    pub fn arm(&self, tab: &TabId) {
        if let Some(mut entry) = self.tabs.get_mut(tab) {
            entry.armed = true;
        }
    }

    pub fn is_armed(&self, tab: &TabId) -> bool {
        self.tabs.get(tab).map(|entry| entry.armed).unwrap_or(false)
    }
}
