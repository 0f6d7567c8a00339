use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tabcast_core_types::{TabEvent, TabId};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::metrics;
use crate::registry::Registry;
use crate::transport::{
    CdpTransport, ChromiumTransport, CommandTarget, NoopTransport, TransportEvent,
};

const EVENT_BUS_CAPACITY: usize = 256;
const ATTACH_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdapterMode {
    Real,
    Stub,
}

impl AdapterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterMode::Real => "real",
            AdapterMode::Stub => "stub",
        }
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, AdapterMode::Stub)
    }
}

/// Tab management over a pluggable CDP transport.
pub struct CdpAdapter {
    pub cfg: CdpConfig,
    registry: Arc<Registry>,
    mode: AdapterMode,
    bus: broadcast::Sender<TabEvent>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    transport: Arc<dyn CdpTransport>,
    targets: DashMap<String, TabId>,
    sessions: DashMap<String, TabId>,
}

impl CdpAdapter {
    /// Chromium transport when a browser can be reached, otherwise a stub
    /// whose commands all fail.
    pub fn new(cfg: CdpConfig) -> Self {
        let reachable = cfg.websocket_url.is_some()
            || (!cfg.executable.as_os_str().is_empty() && cfg.executable.exists());
        if reachable {
            info!(target: "cdp-adapter", "using Chromium transport");
            let transport = Arc::new(ChromiumTransport::new(cfg.clone()));
            Self::build(cfg, transport, AdapterMode::Real)
        } else {
            warn!(
                target: "cdp-adapter",
                mode = AdapterMode::Stub.as_str(),
                remediation = "install Chrome/Chromium, set TABCAST_CHROME or pass --chrome-path/--ws-url",
                "no browser found; tab operations will fail"
            );
            Self::build(cfg, Arc::new(NoopTransport), AdapterMode::Stub)
        }
    }

    pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self::build(cfg, transport, AdapterMode::Real)
    }

    fn build(cfg: CdpConfig, transport: Arc<dyn CdpTransport>, mode: AdapterMode) -> Self {
        let (bus, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            cfg,
            registry: Arc::new(Registry::new()),
            mode,
            bus,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            transport,
            targets: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn mode(&self) -> AdapterMode {
        self.mode
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Tab lifecycle events from the moment of subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.bus.subscribe()
    }

    pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
        {
            let guard = self.tasks.lock().await;
            if !guard.is_empty() {
                return Ok(());
            }
        }

        self.transport.connect().await?;
        let loop_task = spawn(Self::event_loop(Arc::clone(&self)));
        self.tasks.lock().await.push(loop_task);
        info!(target: "cdp-adapter", mode = self.mode.as_str(), "event loop started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.tasks.lock().await;
        while let Some(handle) = handles.pop() {
            let _ = handle.await;
        }
    }

    /// Open a tab and navigate it to `url`. The tab is attached and its page
    /// domain enabled before navigation starts, so its load signal is seen.
    #[instrument(target = "cdp-adapter", skip(self))]
    pub async fn create_tab(&self, url: &str) -> Result<TabId, AdapterError> {
        let response = self
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = response
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createTarget missing targetId")
            })?
            .to_string();

        let tab = self.wait_for_attach(&target_id).await?;
        self.send_tab_command(tab, "Page.enable", json!({})).await?;
        self.send_tab_command(tab, "Runtime.enable", json!({}))
            .await?;

        self.registry.arm(&tab);
        self.registry.set_url(&tab, url.to_string());
        let navigation = self
            .send_tab_command(tab, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error) = navigation.get("errorText").and_then(Value::as_str) {
            if let Err(err) = self.close_tab(tab).await {
                debug!(target: "cdp-adapter", %tab, ?err, "failed to close tab after navigation error");
            }
            return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint(format!("navigation to {url} failed: {error}")));
        }

        metrics::record_tab_created();
        info!(target: "cdp-adapter", %tab, url, "tab created");
        Ok(tab)
    }

    pub async fn close_tab(&self, tab: TabId) -> Result<(), AdapterError> {
        let ctx = self.registry.get(&tab).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TabNotFound).with_hint(tab.to_string())
        })?;
        self.send_command(
            CommandTarget::Browser,
            "Target.closeTarget",
            json!({ "targetId": ctx.target_id }),
        )
        .await
        .map(|_| ())
    }

    /// Evaluate `expression` in the tab's main world and return its value.
    pub async fn evaluate(&self, tab: TabId, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send_tab_command(
                tab,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let description = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script raised an exception")
                .to_string();
            return Err(AdapterError::new(AdapterErrorKind::ScriptException)
                .with_hint(description)
                .with_data(details.clone()));
        }

        Ok(response
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn wait_for_attach(&self, target_id: &str) -> Result<TabId, AdapterError> {
        let deadline = Instant::now() + Duration::from_millis(self.cfg.attach_timeout_ms);
        loop {
            if let Some(tab) = self.targets.get(target_id).map(|entry| *entry.value()) {
                if self.registry.get_cdp_session(&tab).is_some() {
                    return Ok(tab);
                }
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::Timeout)
                    .with_hint(format!("timed out waiting for target {target_id} to attach")));
            }
            sleep(ATTACH_POLL).await;
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let start = Instant::now();
        metrics::record_command(method);
        match self.transport.call(target, method, params).await {
            Ok(value) => {
                metrics::record_command_success(method, start.elapsed());
                Ok(value)
            }
            Err(err) => {
                metrics::record_command_failure(method);
                Err(err)
            }
        }
    }

    async fn send_tab_command(
        &self,
        tab: TabId,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let session = self.registry.get_cdp_session(&tab).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TabNotFound)
                .with_hint(format!("no cdp session for tab {tab}"))
        })?;
        self.send_command(CommandTarget::Session(session), method, params)
            .await
    }

    fn publish(&self, event: TabEvent) {
        let kind = match event {
            TabEvent::Loaded(_) => "loaded",
            TabEvent::Removed(_) => "removed",
        };
        metrics::record_tab_event(kind);
        debug!(target: "cdp-adapter", tab = %event.tab(), kind, "tab event");
        // No subscribers is fine.
        let _ = self.bus.send(event);
    }

    async fn event_loop(self: Arc<Self>) {
        debug!(target: "cdp-adapter", "event loop entered");
        const MIN_BACKOFF: Duration = Duration::from_millis(100);
        const MAX_BACKOFF: Duration = Duration::from_secs(5);
        let mut backoff = MIN_BACKOFF;

        loop {
            select! {
                _ = self.shutdown.cancelled() => break,
                event = self.transport.next_event() => {
                    match event {
                        Some(ev) => {
                            backoff = MIN_BACKOFF;
                            if let Err(err) = self.process_event(ev) {
                                warn!(target: "cdp-adapter", %err, "cdp event handling error");
                            }
                        }
                        None => {
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                            self.handle_transport_disconnect();
                            warn!(target: "cdp-adapter", "transport stream ended; attempting restart");
                            if let Err(err) = self.transport.connect().await {
                                warn!(target: "cdp-adapter", %err, "transport restart failed");
                            }
                            sleep(backoff).await;
                            backoff = (backoff + MIN_BACKOFF).min(MAX_BACKOFF);
                        }
                    }
                }
            }
        }
        debug!(target: "cdp-adapter", "event loop exiting");
    }

    fn handle_transport_disconnect(&self) {
        for (tab, _) in self.registry.iter() {
            self.registry.remove_tab(&tab);
            self.publish(TabEvent::Removed(tab));
        }
        self.targets.clear();
        self.sessions.clear();
    }

    fn process_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
        metrics::record_event();
        match event.method.as_str() {
            "Target.targetCreated" => self.on_target_created(event.params),
            "Target.attachedToTarget" => self.on_target_attached(event.params),
            "Target.targetInfoChanged" => self.on_target_info_changed(event.params),
            "Target.detachedFromTarget" => self.on_target_detached(event.params),
            "Target.targetDestroyed" => self.on_target_destroyed(event.params),
            "Page.loadEventFired" => {
                self.on_load_event_fired(event.session_id.as_deref());
                Ok(())
            }
            _ => {
                debug!(target: "cdp-adapter", method = %event.method, "unhandled cdp event");
                Ok(())
            }
        }
    }

    fn track_target(&self, info: &TargetInfoPayload) -> TabId {
        if let Some(existing) = self.targets.get(&info.target_id) {
            return *existing.value();
        }
        let tab = TabId::new();
        self.targets.insert(info.target_id.clone(), tab);
        self.registry.insert_tab(
            tab,
            info.target_id.clone(),
            info.url.clone().filter(|u| !u.is_empty()),
        );
        tab
    }

    fn on_target_created(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetCreatedParams =
            serde_json::from_value(params).map_err(AdapterError::decode)?;
        if payload.target_info.target_type == "page" {
            self.track_target(&payload.target_info);
        }
        Ok(())
    }

    fn on_target_attached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: AttachedToTargetParams =
            serde_json::from_value(params).map_err(AdapterError::decode)?;
        if payload.target_info.target_type != "page" {
            return Ok(());
        }
        let tab = self.track_target(&payload.target_info);
        self.sessions.insert(payload.session_id.clone(), tab);
        self.registry.set_cdp_session(&tab, payload.session_id);
        Ok(())
    }

    fn on_target_info_changed(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetInfoChangedParams =
            serde_json::from_value(params).map_err(AdapterError::decode)?;
        if let Some(tab) = self
            .targets
            .get(&payload.target_info.target_id)
            .map(|entry| *entry.value())
        {
            if let Some(url) = payload.target_info.url.filter(|u| !u.is_empty()) {
                self.registry.set_url(&tab, url);
            }
        }
        Ok(())
    }

    fn on_target_detached(&self, params: Value) -> Result<(), AdapterError> {
        let payload: DetachedFromTargetParams =
            serde_json::from_value(params).map_err(AdapterError::decode)?;
        if let Some((_, tab)) = self.sessions.remove(&payload.session_id) {
            self.publish(TabEvent::Removed(tab));
        }
        Ok(())
    }

    fn on_target_destroyed(&self, params: Value) -> Result<(), AdapterError> {
        let payload: TargetDestroyedParams =
            serde_json::from_value(params).map_err(AdapterError::decode)?;
        if let Some((_, tab)) = self.targets.remove(&payload.target_id) {
            self.sessions.retain(|_, v| *v != tab);
            self.registry.remove_tab(&tab);
            self.publish(TabEvent::Removed(tab));
        }
        Ok(())
    }

    fn on_load_event_fired(&self, session_id: Option<&str>) {
        let Some(tab) = session_id.and_then(|s| self.sessions.get(s).map(|entry| *entry.value()))
        else {
            return;
        };
        if self.registry.is_armed(&tab) {
            self.publish(TabEvent::Loaded(tab));
        } else {
            debug!(target: "cdp-adapter", %tab, "ignoring load of initial blank document");
        }
    }
}

impl Drop for CdpAdapter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Deserialize)]
struct TargetCreatedParams {
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct TargetDestroyedParams {
    #[serde(rename = "targetId")]
    target_id: String,
}

#[derive(Debug, Deserialize)]
struct AttachedToTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct DetachedFromTargetParams {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct TargetInfoChangedParams {
    #[serde(rename = "targetInfo")]
    target_info: TargetInfoPayload,
}

#[derive(Debug, Deserialize)]
struct TargetInfoPayload {
    #[serde(rename = "targetId")]
    target_id: String,
    #[serde(rename = "type")]
    target_type: String,
    url: Option<String>,
}
