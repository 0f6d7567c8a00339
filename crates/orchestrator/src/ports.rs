use async_trait::async_trait;
use tabcast_core_types::{InjectionCommand, TabEvent, TabId};
use tokio::sync::broadcast;

use crate::errors::PlatformError;

/// Browser tab management as seen by the orchestrator.
#[async_trait]
pub trait TabPlatform: Send + Sync {
    /// Open a tab navigating to `locator`.
    async fn create_tab(&self, locator: &str) -> Result<TabId, PlatformError>;

    /// Lifecycle events for every tab, from the moment of subscription.
    fn subscribe(&self) -> broadcast::Receiver<TabEvent>;
}

/// Message transport into the injector running in a tab.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// One full round trip. An error means this attempt failed.
    async fn send_to_tab(&self, tab: TabId, command: &InjectionCommand)
        -> Result<(), PlatformError>;
}
