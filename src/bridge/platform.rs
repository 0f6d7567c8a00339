use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::CdpAdapter;
use injector::InjectorHost;
use orchestrator::{CommandChannel, PlatformError, TabPlatform};
use tabcast_core_types::{InjectionCommand, TabEvent, TabId};
use tokio::sync::broadcast;
use tracing::debug;

use super::InjectorBridge;

/// Tab management for the orchestrator, backed by the CDP adapter. Tab
/// events come from the [`InjectorBridge`], so a `Loaded` tab already has a
/// receiving injector.
pub struct CdpTabPlatform {
    adapter: Arc<CdpAdapter>,
    ready: broadcast::Sender<TabEvent>,
}

impl CdpTabPlatform {
    pub fn new(adapter: Arc<CdpAdapter>, bridge: &InjectorBridge) -> Self {
        Self {
            adapter,
            ready: bridge.ready_sender(),
        }
    }
}

#[async_trait]
impl TabPlatform for CdpTabPlatform {
    async fn create_tab(&self, locator: &str) -> Result<TabId, PlatformError> {
        if self.adapter.mode().is_stub() {
            return Err(PlatformError::Unavailable("no browser available".into()));
        }
        self.adapter
            .create_tab(locator)
            .await
            .map_err(|err| PlatformError::TabCreation(err.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.ready.subscribe()
    }
}

/// Delivers commands into the injector mailboxes of [`InjectorHost`].
pub struct HostChannel {
    host: Arc<InjectorHost>,
}

impl HostChannel {
    pub fn new(host: Arc<InjectorHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl CommandChannel for HostChannel {
    async fn send_to_tab(
        &self,
        tab: TabId,
        command: &InjectionCommand,
    ) -> Result<(), PlatformError> {
        self.host.deliver(tab, command).await.map_err(|err| {
            debug!(target: "tabcast::bridge", %tab, %err, "delivery attempt failed");
            PlatformError::Delivery(err.to_string())
        })
    }
}
