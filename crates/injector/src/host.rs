//! Per-tab mailboxes connecting the orchestrator to the injectors.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tabcast_core_types::{InjectionCommand, TabId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DeliveryError;
use crate::session::{InjectionOutcome, InjectorSession};

const MAILBOX_DEPTH: usize = 8;
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

struct Envelope {
    message: Value,
    ack: oneshot::Sender<()>,
}

struct Mailbox {
    tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
}

/// Registry of running injector actors, one per attached tab.
pub struct InjectorHost {
    mailboxes: DashMap<TabId, Mailbox>,
    ack_timeout: Duration,
}

impl Default for InjectorHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectorHost {
    pub fn new() -> Self {
        Self::with_ack_timeout(DEFAULT_ACK_TIMEOUT)
    }

    pub fn with_ack_timeout(ack_timeout: Duration) -> Self {
        Self {
            mailboxes: DashMap::new(),
            ack_timeout,
        }
    }

    /// Start an injector actor for `tab`. A previous injector for the same
    /// tab (an earlier page instance) is torn down first.
    pub fn attach(&self, tab: TabId, session: InjectorSession) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel(MAILBOX_DEPTH);
        let cancel = CancellationToken::new();
        if let Some(previous) = self.mailboxes.insert(
            tab,
            Mailbox {
                tx,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }
        info!(target: "injector", %tab, site = %session.site(), "injector attached");
        tokio::spawn(run_actor(tab, Arc::new(session), rx, cancel))
    }

    /// Tear down the injector for `tab`, cancelling any in-flight attempt.
    pub fn detach(&self, tab: TabId) -> bool {
        match self.mailboxes.remove(&tab) {
            Some((_, mailbox)) => {
                mailbox.cancel.cancel();
                debug!(target: "injector", %tab, "injector detached");
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self, tab: TabId) -> bool {
        self.mailboxes.contains_key(&tab)
    }

    /// One full round trip: resolves once the tab's injector acknowledged
    /// receipt of the command.
    pub async fn deliver(
        &self,
        tab: TabId,
        command: &InjectionCommand,
    ) -> Result<(), DeliveryError> {
        let message = serde_json::to_value(command)?;
        let tx = self
            .mailboxes
            .get(&tab)
            .map(|mailbox| mailbox.tx.clone())
            .ok_or(DeliveryError::NoReceiver(tab))?;

        let (ack, acked) = oneshot::channel();
        tx.send(Envelope { message, ack })
            .await
            .map_err(|_| DeliveryError::Closed(tab))?;

        match tokio::time::timeout(self.ack_timeout, acked).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DeliveryError::Dropped(tab)),
            Err(_) => Err(DeliveryError::Timeout(tab)),
        }
    }
}

async fn run_actor(
    tab: TabId,
    session: Arc<InjectorSession>,
    mut rx: mpsc::Receiver<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };
        let _ = envelope.ack.send(());

        let command: InjectionCommand = match serde_json::from_value(envelope.message) {
            Ok(command) => command,
            Err(err) => {
                debug!(target: "injector", %tab, error = %err, "ignoring unknown message");
                continue;
            }
        };
        if command.text.is_empty() {
            debug!(target: "injector", %tab, "ignoring empty text");
            continue;
        }

        // Each command runs on its own task so a duplicate reaches the
        // processing flag while the first one is still in flight.
        let session = session.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(target: "injector", %tab, "injection cancelled, page went away");
                }
                outcome = session.handle_injection_command(&command.text) => match outcome {
                    InjectionOutcome::Succeeded => info!(target: "injector", %tab, "injection succeeded"),
                    InjectionOutcome::Skipped => debug!(target: "injector", %tab, "duplicate command skipped"),
                    InjectionOutcome::Failed(kind) => warn!(target: "injector", %tab, error = %kind, "injection failed"),
                },
            }
        });
    }
    debug!(target: "injector", %tab, "injector stopped");
}
