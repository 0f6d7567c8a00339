use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use parking_lot::Mutex;
use tabcast_core_types::{TabEvent, TabId};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::BroadcastError;
use crate::model::{
    BroadcastReport, BroadcastRequest, DestinationOutcome, DestinationReport, TabSession,
};
use crate::pipeline::Pipeline;
use crate::policy::OrchestratorPolicy;
use crate::ports::{CommandChannel, TabPlatform};

pub(crate) struct Tracked {
    pub(crate) session: TabSession,
    pub(crate) cancel: CancellationToken,
}

/// State shared by every pipeline and the tab-closure watcher.
pub(crate) struct Shared {
    pub(crate) platform: Arc<dyn TabPlatform>,
    pub(crate) channel: Arc<dyn CommandChannel>,
    pub(crate) policy: OrchestratorPolicy,
    pub(crate) sessions: DashMap<TabId, Tracked>,
    pub(crate) delivered: DashSet<TabId>,
    pub(crate) shutdown: CancellationToken,
}

impl Shared {
    pub(crate) fn is_tracked(&self, tab: TabId) -> bool {
        self.sessions.contains_key(&tab)
    }

    /// Mutate a tracked session. Closed tabs and sessions already in a
    /// terminal state are left alone.
    pub(crate) fn update(&self, tab: TabId, f: impl FnOnce(&mut TabSession)) -> bool {
        match self.sessions.get_mut(&tab) {
            Some(mut tracked) if !tracked.session.state.is_terminal() => {
                f(&mut tracked.session);
                true
            }
            _ => false,
        }
    }

    fn on_tab_removed(&self, tab: TabId) {
        self.delivered.remove(&tab);
        if let Some((_, tracked)) = self.sessions.remove(&tab) {
            tracked.cancel.cancel();
            info!(
                target: "orchestrator",
                %tab,
                site = %tracked.session.site_key,
                state = ?tracked.session.state,
                "tab closed, session dropped"
            );
        }
    }
}

/// Long-lived coordinator of broadcasts.
pub struct Orchestrator {
    shared: Arc<Shared>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn TabPlatform>,
        channel: Arc<dyn CommandChannel>,
        policy: OrchestratorPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                platform,
                channel,
                policy,
                sessions: DashMap::new(),
                delivered: DashSet::new(),
                shutdown: CancellationToken::new(),
            }),
            watcher: Mutex::new(None),
        }
    }

    /// Start watching tab removals. Idempotent.
    pub fn start(&self) {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let mut events = shared.platform.subscribe();
        *watcher = Some(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(TabEvent::Removed(tab)) => shared.on_tab_removed(tab),
                    Ok(TabEvent::Loaded(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "orchestrator", skipped, "tab event watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(target: "orchestrator", "tab watcher stopped");
        }));
    }

    /// Open, await and deliver to every destination concurrently. Returns
    /// once every destination reached a terminal outcome.
    #[instrument(target = "orchestrator", skip_all, fields(destinations = destinations.len()))]
    pub async fn begin_broadcast(
        &self,
        text: &str,
        destinations: &[String],
    ) -> Result<BroadcastReport, BroadcastError> {
        let request = BroadcastRequest::new(text, destinations.iter().cloned())?;
        self.start();

        let started = Instant::now();
        info!(
            target: "orchestrator",
            request = %request.id(),
            destinations = request.destinations().len(),
            "broadcast started"
        );

        let text: Arc<str> = Arc::from(request.text());
        let handles: Vec<_> = request
            .destinations()
            .iter()
            .map(|destination| {
                let pipeline = Pipeline::new(self.shared.clone(), destination.clone(), text.clone());
                tokio::spawn(pipeline.run())
            })
            .collect();

        let results = join_all(handles).await;
        let reports: Vec<DestinationReport> = results
            .into_iter()
            .zip(request.destinations())
            .map(|(result, destination)| match result {
                Ok(report) => report,
                Err(err) => {
                    warn!(target: "orchestrator", destination = %destination, error = %err, "pipeline task aborted");
                    DestinationReport {
                        locator: destination.locator.clone(),
                        site_key: destination.site_key.clone(),
                        tab_id: None,
                        outcome: DestinationOutcome::Aborted,
                        delivery_attempts: 0,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                }
            })
            .collect();

        let report = BroadcastReport {
            request_id: request.id(),
            destinations: reports,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            target: "orchestrator",
            request = %report.request_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "broadcast finished"
        );
        Ok(report)
    }

    /// Sessions currently tracked, i.e. not yet terminal and not closed.
    pub fn session_snapshot(&self) -> Vec<TabSession> {
        self.shared
            .sessions
            .iter()
            .map(|entry| entry.value().session.clone())
            .collect()
    }

    pub fn session(&self, tab: TabId) -> Option<TabSession> {
        self.shared
            .sessions
            .get(&tab)
            .map(|tracked| tracked.session.clone())
    }

    /// Whether an injection command already reached `tab`.
    pub fn is_delivered(&self, tab: TabId) -> bool {
        self.shared.delivered.contains(&tab)
    }

    /// Cancel every pending pipeline step and stop the watcher.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        for entry in self.shared.sessions.iter() {
            entry.value().cancel.cancel();
        }
        let watcher = self.watcher.lock().take();
        if let Some(handle) = watcher {
            let _ = handle.await;
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
