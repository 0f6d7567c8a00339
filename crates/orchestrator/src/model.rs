use std::collections::HashSet;

use serde::Serialize;
use tabcast_core_types::{DestinationRef, ErrorKind, SiteKey, TabId};
use uuid::Uuid;

use crate::errors::BroadcastError;

/// Validated broadcast input. Destinations are deduplicated by locator and
/// keep their first-seen order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BroadcastRequest {
    id: Uuid,
    text: String,
    destinations: Vec<DestinationRef>,
}

impl BroadcastRequest {
    pub fn new<I, S>(text: impl Into<String>, destinations: I) -> Result<Self, BroadcastError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(BroadcastError::EmptyText);
        }

        let mut seen = HashSet::new();
        let destinations: Vec<DestinationRef> = destinations
            .into_iter()
            .map(DestinationRef::new)
            .filter(|dest| !dest.locator.is_empty())
            .filter(|dest| seen.insert(dest.locator.clone()))
            .collect();
        if destinations.is_empty() {
            return Err(BroadcastError::NoDestinations);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            text,
            destinations,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn destinations(&self) -> &[DestinationRef] {
        &self.destinations
    }
}

/// Lifecycle of one destination tab.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TabState {
    Creating,
    AwaitingLoad,
    Delivering,
    Injecting,
    Succeeded,
    Failed,
}

impl TabState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TabState::Succeeded | TabState::Failed)
    }
}

/// The orchestrator's per-destination record.
#[derive(Clone, Debug, Serialize)]
pub struct TabSession {
    pub tab_id: Option<TabId>,
    pub site_key: SiteKey,
    pub locator: String,
    pub state: TabState,
    pub delivery_attempts: u32,
    pub last_error: Option<ErrorKind>,
}

impl TabSession {
    pub fn new(destination: &DestinationRef) -> Self {
        Self {
            tab_id: None,
            site_key: destination.site_key.clone(),
            locator: destination.locator.clone(),
            state: TabState::Creating,
            delivery_attempts: 0,
            last_error: None,
        }
    }

    pub(crate) fn fail(&mut self, kind: ErrorKind) {
        self.state = TabState::Failed;
        self.last_error = Some(kind);
    }
}

/// How a destination's pipeline ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DestinationOutcome {
    /// The injection command was delivered to the tab.
    Succeeded,
    Failed(ErrorKind),
    /// The tab was closed before the pipeline finished.
    Closed,
    /// The pipeline task stopped without reporting (shutdown or panic).
    Aborted,
}

impl DestinationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DestinationOutcome::Succeeded)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct DestinationReport {
    pub locator: String,
    pub site_key: SiteKey,
    pub tab_id: Option<TabId>,
    pub outcome: DestinationOutcome,
    pub delivery_attempts: u32,
    pub elapsed_ms: u64,
}

/// Per-destination outcomes of one broadcast, in request order.
#[derive(Clone, Debug, Serialize)]
pub struct BroadcastReport {
    pub request_id: Uuid,
    pub destinations: Vec<DestinationReport>,
    pub elapsed_ms: u64,
}

impl BroadcastReport {
    pub fn succeeded(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| d.outcome.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.destinations.len() - self.succeeded()
    }

    pub fn get(&self, locator: &str) -> Option<&DestinationReport> {
        self.destinations.iter().find(|d| d.locator == locator)
    }
}
