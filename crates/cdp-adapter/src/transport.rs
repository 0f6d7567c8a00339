//! Websocket plumbing between the adapter and the browser.
//!
//! [`ChromiumTransport`] owns at most one live [`Link`]. A link that lost
//! its websocket, or stopped answering heartbeats, is replaced on the next
//! call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::cdp::browser_protocol::target::SessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::launch;

const REQUEST_QUEUE: usize = 128;
const EVENT_QUEUE: usize = 512;
const HEARTBEAT_DEADLINE: Duration = Duration::from_secs(5);

/// A raw CDP event, optionally scoped to a flattened session.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// Where a command is routed: the browser endpoint or one attached page.
#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

/// Wire-level access to the browser.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Open (or reopen) the connection with target discovery and flattened
    /// auto-attach switched on.
    async fn connect(&self) -> Result<(), AdapterError>;
    /// Next browser event, `None` once the connection is gone.
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

/// Transport used when no browser is available: every command fails.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn connect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn call(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("no browser available for {method}")))
    }
}

/// Transport backed by a launched (or externally started) Chromium.
pub struct ChromiumTransport {
    cfg: CdpConfig,
    link: Mutex<Option<Arc<Link>>>,
}

impl ChromiumTransport {
    pub fn new(cfg: CdpConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.default_deadline_ms)
    }

    async fn link(&self) -> Result<Arc<Link>, AdapterError> {
        let mut slot = self.link.lock().await;
        if let Some(link) = slot.as_ref().filter(|link| link.is_open()) {
            return Ok(Arc::clone(link));
        }
        let link = Arc::new(Link::open(&self.cfg).await?);
        *slot = Some(Arc::clone(&link));
        Ok(link)
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn connect(&self) -> Result<(), AdapterError> {
        let link = self.link().await?;
        let deadline = self.deadline();
        link.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            deadline,
        )
        .await?;
        link.call(
            CommandTarget::Browser,
            "Target.setAutoAttach",
            json!({ "autoAttach": true, "waitForDebuggerOnStart": false, "flatten": true }),
            deadline,
        )
        .await?;
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.link().await {
            Ok(link) => link.next_event().await,
            Err(err) => {
                warn!(target: "cdp-transport", %err, "no browser connection");
                None
            }
        }
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.link()
            .await?
            .call(target, method, params, self.deadline())
            .await
    }
}

type Reply = oneshot::Sender<Result<Value, AdapterError>>;

struct Request {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: Reply,
}

/// One websocket to the browser, plus the process behind it when we
/// launched it ourselves.
struct Link {
    requests: mpsc::Sender<Request>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    open: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    child: std::sync::Mutex<Option<Child>>,
}

impl Link {
    async fn open(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (child, url) = match &cfg.websocket_url {
            Some(url) => (None, url.clone()),
            None => {
                let (child, url) = launch::launch(cfg).await?;
                (Some(child), url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&url)
            .await
            .map_err(map_cdp_error)?;
        let (requests, inbox) = mpsc::channel(REQUEST_QUEUE);
        let (event_tx, events) = mpsc::channel(EVENT_QUEUE);
        let open = Arc::new(AtomicBool::new(true));

        let pump = Pump {
            conn,
            pending: HashMap::new(),
            events: event_tx,
        };
        let mut tasks = vec![tokio::spawn(pump.run(inbox, Arc::clone(&open)))];
        tasks.extend(heartbeat(
            requests.clone(),
            Arc::clone(&open),
            Duration::from_millis(cfg.heartbeat_interval_ms),
            HEARTBEAT_DEADLINE.min(Duration::from_millis(cfg.default_deadline_ms)),
        ));

        info!(target: "cdp-transport", %url, launched = child.is_some(), "browser connected");
        Ok(Self {
            requests,
            events: Mutex::new(events),
            open,
            tasks,
            child: std::sync::Mutex::new(child),
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    async fn call(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, AdapterError> {
        roundtrip(&self.requests, target, method, params, deadline).await
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Relaxed);
        for task in &self.tasks {
            task.abort();
        }
        let Some(mut child) = self.child.get_mut().ok().and_then(Option::take) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", %err, "failed to stop chromium");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to stop chromium"),
        }
    }
}

async fn roundtrip(
    requests: &mpsc::Sender<Request>,
    target: CommandTarget,
    method: &str,
    params: Value,
    deadline: Duration,
) -> Result<Value, AdapterError> {
    let (reply, response) = oneshot::channel();
    requests
        .send(Request {
            target,
            method: method.to_string(),
            params,
            reply,
        })
        .await
        .map_err(|_| closed("browser connection is closed"))?;

    match tokio::time::timeout(deadline, response).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(closed("connection dropped before replying")),
        Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
            .with_hint(format!("{method} timed out"))
            .retriable(true)),
    }
}

/// Periodic `Browser.getVersion`. A missed beat marks the link closed so
/// the next call reconnects.
fn heartbeat(
    requests: mpsc::Sender<Request>,
    open: Arc<AtomicBool>,
    every: Duration,
    deadline: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while open.load(Ordering::Relaxed) {
            ticker.tick().await;
            let beat = roundtrip(
                &requests,
                CommandTarget::Browser,
                "Browser.getVersion",
                json!({}),
                deadline,
            )
            .await;
            if let Err(err) = beat {
                warn!(target: "cdp-transport", %err, "browser missed a heartbeat");
                open.store(false, Ordering::Relaxed);
            }
        }
    }))
}

/// Moves requests onto the websocket and replies and events off it.
struct Pump {
    conn: Connection<CdpEventMessage>,
    pending: HashMap<CallId, Reply>,
    events: mpsc::Sender<TransportEvent>,
}

impl Pump {
    async fn run(mut self, mut inbox: mpsc::Receiver<Request>, open: Arc<AtomicBool>) {
        let outcome = loop {
            tokio::select! {
                Some(request) = inbox.recv() => self.submit(request),
                message = self.conn.next() => match message {
                    Some(Ok(Message::Response(resp))) => self.settle(resp),
                    Some(Ok(Message::Event(event))) => self.forward(event).await,
                    Some(Err(err)) => break Err(map_cdp_error(err)),
                    None => break Ok(()),
                },
            }
        };

        open.store(false, Ordering::Relaxed);
        let reason = match &outcome {
            Ok(()) => closed("browser closed the connection"),
            Err(err) => err.clone(),
        };
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(reason.clone()));
        }
        match outcome {
            Ok(()) => info!(target: "cdp-transport", "browser connection closed"),
            Err(err) => warn!(target: "cdp-transport", %err, "browser connection failed"),
        }
    }

    fn submit(&mut self, request: Request) {
        let Request {
            target,
            method,
            params,
            reply,
        } = request;
        let session = match target {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(SessionId::from(id)),
        };
        match self
            .conn
            .submit_command(MethodId::from(method), session, params)
        {
            Ok(id) => {
                self.pending.insert(id, reply);
            }
            Err(err) => {
                let _ = reply.send(Err(AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("cannot encode command: {err}"))));
            }
        }
    }

    fn settle(&mut self, resp: Response) {
        match self.pending.remove(&resp.id) {
            Some(reply) => {
                let _ = reply.send(response_payload(resp));
            }
            None => debug!(target: "cdp-transport", id = ?resp.id, "reply for unknown call"),
        }
    }

    async fn forward(&mut self, event: CdpEventMessage) {
        let raw: CdpJsonEventMessage = match event.try_into() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "cdp-transport", %err, "undecodable cdp event");
                return;
            }
        };
        let event = TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        };
        if self.events.send(event).await.is_err() {
            debug!(target: "cdp-transport", "nobody is reading browser events");
        }
    }
}

/// Protocol errors are final; commands with no result yield `{}`.
fn response_payload(resp: Response) -> Result<Value, AdapterError> {
    match (resp.result, resp.error) {
        (Some(value), _) => Ok(value),
        (None, Some(err)) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("cdp error {}: {}", err.code, err.message))),
        (None, None) => Ok(json!({})),
    }
}

fn map_cdp_error(err: CdpError) -> AdapterError {
    let kind = match &err {
        CdpError::Timeout => AdapterErrorKind::Timeout,
        CdpError::JavascriptException(_) => AdapterErrorKind::ScriptException,
        CdpError::Serde(_) => AdapterErrorKind::Internal,
        _ => AdapterErrorKind::CdpIo,
    };
    AdapterError::new(kind)
        .with_hint(err.to_string())
        .retriable(matches!(
            kind,
            AdapterErrorKind::Timeout | AdapterErrorKind::CdpIo
        ))
}

fn closed(hint: &str) -> AdapterError {
    AdapterError::new(AdapterErrorKind::CdpIo)
        .with_hint(hint)
        .retriable(true)
}
