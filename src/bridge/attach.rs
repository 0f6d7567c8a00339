use std::sync::Arc;

use cdp_adapter::CdpAdapter;
use injector::{InjectorHost, InjectorPolicy, InjectorSession, PageDom};
use parking_lot::Mutex;
use site_registry::StrategyRegistry;
use tabcast_core_types::{SiteKey, TabEvent, TabId};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dom::CdpPageDom;

const READY_CAPACITY: usize = 256;

/// Builds the page view an injector works against.
pub type DomFactory = Arc<dyn Fn(Arc<CdpAdapter>, TabId) -> Arc<dyn PageDom> + Send + Sync>;

/// Starts an injector in every tab once its page has loaded and tears it
/// down when the tab goes away. A reload replaces the previous injector.
///
/// The bridge republishes tab events on its own bus: `Loaded` only after the
/// tab's injector is attached, `Removed` after it is detached. Anything that
/// delivers commands should listen here rather than to the adapter.
pub struct InjectorBridge {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    adapter: Arc<CdpAdapter>,
    host: Arc<InjectorHost>,
    strategies: Arc<StrategyRegistry>,
    policy: InjectorPolicy,
    dom: DomFactory,
    ready: broadcast::Sender<TabEvent>,
    shutdown: CancellationToken,
}

impl InjectorBridge {
    pub fn new(
        adapter: Arc<CdpAdapter>,
        host: Arc<InjectorHost>,
        strategies: Arc<StrategyRegistry>,
        policy: InjectorPolicy,
    ) -> Self {
        Self::with_dom_factory(
            adapter,
            host,
            strategies,
            policy,
            Arc::new(|adapter: Arc<CdpAdapter>, tab: TabId| -> Arc<dyn PageDom> {
                Arc::new(CdpPageDom::new(adapter, tab))
            }),
        )
    }

    pub fn with_dom_factory(
        adapter: Arc<CdpAdapter>,
        host: Arc<InjectorHost>,
        strategies: Arc<StrategyRegistry>,
        policy: InjectorPolicy,
        dom: DomFactory,
    ) -> Self {
        let (ready, _) = broadcast::channel(READY_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                adapter,
                host,
                strategies,
                policy,
                dom,
                ready,
                shutdown: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Tab events gated on injector readiness, from the moment of subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.inner.ready.subscribe()
    }

    pub(super) fn ready_sender(&self) -> broadcast::Sender<TabEvent> {
        self.inner.ready.clone()
    }

    /// Subscribe to adapter tab events. Idempotent; call before any tab is
    /// created.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let inner = self.inner.clone();
        let mut events = inner.adapter.subscribe();
        *task = Some(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(TabEvent::Loaded(tab)) => {
                        let inner = inner.clone();
                        tokio::spawn(async move { inner.attach(tab).await });
                    }
                    Ok(TabEvent::Removed(tab)) => {
                        inner.host.detach(tab);
                        inner.publish(TabEvent::Removed(tab));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "tabcast::bridge", skipped, "tab event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(target: "tabcast::bridge", "injector bridge stopped");
        }));
    }

    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Inner {
    async fn attach(&self, tab: TabId) {
        let dom = (self.dom)(self.adapter.clone(), tab);
        let host = match dom.hostname().await {
            Ok(host) => host,
            Err(err) => {
                // Not announced: the tab never becomes ready for delivery.
                warn!(target: "tabcast::bridge", %tab, %err, "cannot read page hostname");
                return;
            }
        };
        // The tab may have closed while the hostname was read.
        if self.adapter.registry().get(&tab).is_none() {
            debug!(target: "tabcast::bridge", %tab, "tab gone before injector attach");
            return;
        }

        let site = SiteKey::new(&host);
        info!(target: "tabcast::bridge", %tab, %site, "page loaded, attaching injector");
        let session = InjectorSession::new(dom, site, &self.strategies, self.policy.clone());
        self.host.attach(tab, session);
        self.publish(TabEvent::Loaded(tab));
    }

    fn publish(&self, event: TabEvent) {
        // No listeners yet is fine.
        let _ = self.ready.send(event);
    }
}

impl Drop for InjectorBridge {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
