//! One destination's path: create, await load, deliver.

use std::sync::Arc;

use tabcast_core_types::{DestinationRef, ErrorKind, InjectionCommand, TabEvent, TabId};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{DestinationOutcome, DestinationReport, TabSession, TabState};
use crate::orchestrator::{Shared, Tracked};

enum LoadWait {
    Loaded,
    Removed,
}

pub(crate) struct Pipeline {
    shared: Arc<Shared>,
    destination: DestinationRef,
    text: Arc<str>,
    started: Instant,
}

impl Pipeline {
    pub(crate) fn new(shared: Arc<Shared>, destination: DestinationRef, text: Arc<str>) -> Self {
        Self {
            shared,
            destination,
            text,
            started: Instant::now(),
        }
    }

    pub(crate) async fn run(self) -> DestinationReport {
        let mut session = TabSession::new(&self.destination);
        let outcome = self.drive(&mut session).await;
        if let Some(tab) = session.tab_id {
            self.shared.sessions.remove(&tab);
        }

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match outcome {
            DestinationOutcome::Succeeded => info!(
                target: "orchestrator",
                destination = %self.destination,
                attempts = session.delivery_attempts,
                elapsed_ms,
                "command delivered"
            ),
            DestinationOutcome::Failed(kind) => warn!(
                target: "orchestrator",
                destination = %self.destination,
                error = %kind,
                attempts = session.delivery_attempts,
                elapsed_ms,
                "destination failed"
            ),
            _ => info!(
                target: "orchestrator",
                destination = %self.destination,
                outcome = ?outcome,
                "destination abandoned"
            ),
        }

        DestinationReport {
            locator: self.destination.locator.clone(),
            site_key: self.destination.site_key.clone(),
            tab_id: session.tab_id,
            outcome,
            delivery_attempts: session.delivery_attempts,
            elapsed_ms,
        }
    }

    async fn drive(&self, session: &mut TabSession) -> DestinationOutcome {
        // Subscribe before the tab exists so its load signal cannot be missed.
        let mut events = self.shared.platform.subscribe();

        let tab = match self
            .shared
            .platform
            .create_tab(&self.destination.locator)
            .await
        {
            Ok(tab) => tab,
            Err(err) => {
                warn!(target: "orchestrator", destination = %self.destination, error = %err, "tab creation failed");
                session.fail(ErrorKind::TabCreationFailed);
                return DestinationOutcome::Failed(ErrorKind::TabCreationFailed);
            }
        };

        session.tab_id = Some(tab);
        session.state = TabState::AwaitingLoad;
        let cancel = self.shared.shutdown.child_token();
        self.shared.sessions.insert(
            tab,
            Tracked {
                session: session.clone(),
                cancel: cancel.clone(),
            },
        );
        debug!(target: "orchestrator", %tab, site = %session.site_key, "awaiting load");

        let load_timeout = self.shared.policy.load_timeout();
        let waited = tokio::select! {
            _ = cancel.cancelled() => return DestinationOutcome::Closed,
            waited = tokio::time::timeout(load_timeout, wait_for_load(&mut events, tab)) => waited,
        };
        // Drop the listener as soon as the race settled.
        drop(events);
        match waited {
            Ok(LoadWait::Loaded) => {}
            Ok(LoadWait::Removed) => return DestinationOutcome::Closed,
            Err(_) => {
                session.fail(ErrorKind::LoadTimeout);
                self.shared.update(tab, |s| s.fail(ErrorKind::LoadTimeout));
                return DestinationOutcome::Failed(ErrorKind::LoadTimeout);
            }
        }
        if !self.shared.is_tracked(tab) {
            return DestinationOutcome::Closed;
        }

        self.deliver(session, tab, &cancel).await
    }

    async fn deliver(
        &self,
        session: &mut TabSession,
        tab: TabId,
        cancel: &CancellationToken,
    ) -> DestinationOutcome {
        session.state = TabState::Delivering;
        self.shared.update(tab, |s| s.state = TabState::Delivering);

        if self.shared.delivered.contains(&tab) {
            debug!(target: "orchestrator", %tab, "already delivered, not sending again");
            session.state = TabState::Succeeded;
            return DestinationOutcome::Succeeded;
        }

        let command = InjectionCommand::type_text(self.text.as_ref());
        let attempts = self.shared.policy.delivery_attempts.max(1);
        for attempt in 1..=attempts {
            session.delivery_attempts = attempt;
            if !self.shared.update(tab, |s| s.delivery_attempts = attempt) {
                return DestinationOutcome::Closed;
            }

            let sent = tokio::select! {
                _ = cancel.cancelled() => return DestinationOutcome::Closed,
                sent = self.shared.channel.send_to_tab(tab, &command) => sent,
            };
            match sent {
                Ok(()) => {
                    if !self.shared.is_tracked(tab) {
                        return DestinationOutcome::Closed;
                    }
                    self.shared.delivered.insert(tab);
                    session.state = TabState::Injecting;
                    self.shared.update(tab, |s| s.state = TabState::Injecting);
                    session.state = TabState::Succeeded;
                    return DestinationOutcome::Succeeded;
                }
                Err(err) => {
                    debug!(target: "orchestrator", %tab, attempt, error = %err, "delivery attempt failed");
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return DestinationOutcome::Closed,
                    _ = tokio::time::sleep(self.shared.policy.delivery_backoff()) => {}
                }
            }
        }

        session.fail(ErrorKind::DeliveryExhausted);
        DestinationOutcome::Failed(ErrorKind::DeliveryExhausted)
    }
}

async fn wait_for_load(events: &mut broadcast::Receiver<TabEvent>, tab: TabId) -> LoadWait {
    loop {
        match events.recv().await {
            Ok(TabEvent::Loaded(id)) if id == tab => return LoadWait::Loaded,
            Ok(TabEvent::Removed(id)) if id == tab => return LoadWait::Removed,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "orchestrator", %tab, skipped, "load listener lagged");
            }
            // Platform went away: only the timeout can settle this wait.
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
