use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orchestrator::{
    BroadcastError, CommandChannel, DestinationOutcome, Orchestrator, OrchestratorPolicy,
    PlatformError, TabPlatform, TabState,
};
use parking_lot::Mutex;
use tabcast_core_types::{ErrorKind, InjectionCommand, TabEvent, TabId};
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct Script {
    load_after: Option<Duration>,
    close_after: Option<Duration>,
    fail_create: bool,
    rejections: u32,
    repeat_load: bool,
}

impl Script {
    fn loads_after(ms: u64) -> Self {
        Self {
            load_after: Some(Duration::from_millis(ms)),
            ..Self::default()
        }
    }

    fn never_loads() -> Self {
        Self::default()
    }
}

struct SendRecord {
    tab: TabId,
    at: Instant,
    accepted: bool,
}

struct FakeBrowser {
    events: broadcast::Sender<TabEvent>,
    scripts: HashMap<String, Script>,
    tabs: Mutex<Vec<(String, TabId)>>,
    rejections_left: Mutex<HashMap<TabId, u32>>,
    sends: Mutex<Vec<SendRecord>>,
}

impl FakeBrowser {
    fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            events,
            scripts: scripts
                .iter()
                .map(|(locator, script)| (locator.to_string(), script.clone()))
                .collect(),
            tabs: Mutex::new(Vec::new()),
            rejections_left: Mutex::new(HashMap::new()),
            sends: Mutex::new(Vec::new()),
        })
    }

    fn tab_for(&self, locator: &str) -> Option<TabId> {
        self.tabs
            .lock()
            .iter()
            .find(|(l, _)| l == locator)
            .map(|(_, tab)| *tab)
    }

    fn tab_count(&self) -> usize {
        self.tabs.lock().len()
    }

    fn sends_to(&self, tab: TabId) -> Vec<(Instant, bool)> {
        self.sends
            .lock()
            .iter()
            .filter(|send| send.tab == tab)
            .map(|send| (send.at, send.accepted))
            .collect()
    }

    fn close(&self, tab: TabId) {
        let _ = self.events.send(TabEvent::Removed(tab));
    }
}

#[async_trait]
impl TabPlatform for FakeBrowser {
    async fn create_tab(&self, locator: &str) -> Result<TabId, PlatformError> {
        let script = self.scripts.get(locator).cloned().unwrap_or_default();
        if script.fail_create {
            return Err(PlatformError::TabCreation(format!("cannot open {locator}")));
        }
        let tab = TabId::new();
        self.tabs.lock().push((locator.to_string(), tab));
        self.rejections_left.lock().insert(tab, script.rejections);

        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(delay) = script.load_after {
                tokio::time::sleep(delay).await;
                let _ = events.send(TabEvent::Loaded(tab));
                if script.repeat_load {
                    let _ = events.send(TabEvent::Loaded(tab));
                }
            }
        });
        if let Some(delay) = script.close_after {
            let events = self.events.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(TabEvent::Removed(tab));
            });
        }
        Ok(tab)
    }

    fn subscribe(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl CommandChannel for FakeBrowser {
    async fn send_to_tab(
        &self,
        tab: TabId,
        command: &InjectionCommand,
    ) -> Result<(), PlatformError> {
        assert!(!command.text.is_empty());
        let accepted = {
            let mut left = self.rejections_left.lock();
            let remaining = left.entry(tab).or_insert(0);
            if *remaining > 0 {
                *remaining -= 1;
                false
            } else {
                true
            }
        };
        self.sends.lock().push(SendRecord {
            tab,
            at: Instant::now(),
            accepted,
        });
        if accepted {
            Ok(())
        } else {
            Err(PlatformError::Delivery("receiving end does not exist".into()))
        }
    }
}

fn orchestrator(browser: &Arc<FakeBrowser>) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        browser.clone(),
        browser.clone(),
        OrchestratorPolicy::default(),
    ))
}

fn destinations(locators: &[&str]) -> Vec<String> {
    locators.iter().map(|l| l.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_fail_fast_without_tabs() {
    let browser = FakeBrowser::new(&[]);
    let orchestrator = orchestrator(&browser);

    let err = orchestrator
        .begin_broadcast("", &destinations(&["siteA"]))
        .await
        .unwrap_err();
    assert_eq!(err, BroadcastError::EmptyText);

    let err = orchestrator.begin_broadcast("hello", &[]).await.unwrap_err();
    assert_eq!(err, BroadcastError::NoDestinations);

    assert_eq!(browser.tab_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn one_tab_and_one_command_per_distinct_destination() {
    let browser = FakeBrowser::new(&[
        ("siteA", Script::loads_after(100)),
        ("siteB", Script::loads_after(300)),
    ]);
    let orchestrator = orchestrator(&browser);

    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["siteA", "siteB", "siteA"]))
        .await
        .unwrap();

    assert_eq!(report.destinations.len(), 2);
    assert_eq!(browser.tab_count(), 2);
    for locator in ["siteA", "siteB"] {
        let tab = browser.tab_for(locator).unwrap();
        assert_eq!(browser.sends_to(tab).len(), 1);
        assert_eq!(report.get(locator).unwrap().outcome, DestinationOutcome::Succeeded);
        assert!(orchestrator.is_delivered(tab));
    }
    assert_eq!(report.succeeded(), 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_load_signal_sends_one_command() {
    let browser = FakeBrowser::new(&[(
        "siteA",
        Script {
            repeat_load: true,
            ..Script::loads_after(100)
        },
    )]);
    let orchestrator = orchestrator(&browser);

    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["siteA"]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let tab = browser.tab_for("siteA").unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(browser.sends_to(tab).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn delivery_accepted_on_third_attempt_succeeds() {
    let browser = FakeBrowser::new(&[(
        "siteA",
        Script {
            rejections: 2,
            ..Script::loads_after(1000)
        },
    )]);
    let orchestrator = orchestrator(&browser);

    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["siteA"]))
        .await
        .unwrap();

    let entry = report.get("siteA").unwrap();
    assert_eq!(entry.outcome, DestinationOutcome::Succeeded);
    assert_eq!(entry.delivery_attempts, 3);

    let sends = browser.sends_to(entry.tab_id.unwrap());
    assert_eq!(
        sends.iter().map(|(_, ok)| *ok).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    for pair in sends.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!(gap >= Duration::from_secs(2) && gap < Duration::from_millis(2050));
    }
}

#[tokio::test(start_paused = true)]
async fn delivery_rejected_three_times_is_exhausted() {
    let browser = FakeBrowser::new(&[(
        "siteA",
        Script {
            rejections: 10,
            ..Script::loads_after(1000)
        },
    )]);
    let orchestrator = orchestrator(&browser);

    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["siteA"]))
        .await
        .unwrap();

    let entry = report.get("siteA").unwrap();
    assert_eq!(
        entry.outcome,
        DestinationOutcome::Failed(ErrorKind::DeliveryExhausted)
    );
    assert_eq!(entry.delivery_attempts, 3);
    assert_eq!(browser.sends_to(entry.tab_id.unwrap()).len(), 3);
    // load at 1s, attempts at 1s, 3s, 5s, no backoff after the last
    assert!(entry.elapsed_ms >= 5000 && entry.elapsed_ms < 5100);
    assert!(orchestrator.session_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn tab_creation_failure_is_isolated() {
    let browser = FakeBrowser::new(&[
        (
            "broken",
            Script {
                fail_create: true,
                ..Script::default()
            },
        ),
        ("siteA", Script::loads_after(500)),
    ]);
    let orchestrator = orchestrator(&browser);

    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["broken", "siteA"]))
        .await
        .unwrap();

    let broken = report.get("broken").unwrap();
    assert_eq!(
        broken.outcome,
        DestinationOutcome::Failed(ErrorKind::TabCreationFailed)
    );
    assert_eq!(broken.tab_id, None);
    assert_eq!(
        report.get("siteA").unwrap().outcome,
        DestinationOutcome::Succeeded
    );
}

#[tokio::test(start_paused = true)]
async fn slow_destination_times_out_without_delaying_others() {
    let browser = FakeBrowser::new(&[
        ("siteA", Script::loads_after(1000)),
        ("siteB", Script::never_loads()),
    ]);
    let orchestrator = orchestrator(&browser);

    let started = Instant::now();
    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["siteA", "siteB"]))
        .await
        .unwrap();

    assert_eq!(report.destinations.len(), 2);
    let a = report.get("siteA").unwrap();
    assert_eq!(a.outcome, DestinationOutcome::Succeeded);
    assert!(a.elapsed_ms < 3000, "siteA took {}ms", a.elapsed_ms);

    let b = report.get("siteB").unwrap();
    assert_eq!(b.outcome, DestinationOutcome::Failed(ErrorKind::LoadTimeout));
    assert!(b.elapsed_ms >= 30_000 && b.elapsed_ms < 30_100);
    assert_eq!(b.delivery_attempts, 0);

    let total = started.elapsed();
    assert!(total >= Duration::from_secs(30) && total < Duration::from_millis(30_100));
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
}

#[tokio::test(start_paused = true)]
async fn closing_a_tab_awaiting_load_drops_its_session() {
    let browser = FakeBrowser::new(&[(
        "siteA",
        Script {
            close_after: Some(Duration::from_secs(5)),
            ..Script::never_loads()
        },
    )]);
    let orchestrator = orchestrator(&browser);

    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["siteA"]))
        .await
        .unwrap();

    let entry = report.get("siteA").unwrap();
    assert_eq!(entry.outcome, DestinationOutcome::Closed);
    assert!(entry.elapsed_ms >= 5000 && entry.elapsed_ms < 5100);
    assert!(browser.sends_to(entry.tab_id.unwrap()).is_empty());
    assert!(orchestrator.session_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn snapshot_shows_sessions_awaiting_load() {
    let browser = FakeBrowser::new(&[("siteA", Script::loads_after(10_000))]);
    let orchestrator = orchestrator(&browser);

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .begin_broadcast("hello", &destinations(&["siteA"]))
                .await
        })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = orchestrator.session_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, TabState::AwaitingLoad);
    assert_eq!(snapshot[0].site_key.as_str(), "sitea");
    assert_eq!(snapshot[0].delivery_attempts, 0);

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.succeeded(), 1);
    assert!(orchestrator.session_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn delivered_marker_is_cleared_when_tab_closes() {
    let browser = FakeBrowser::new(&[("siteA", Script::loads_after(100))]);
    let orchestrator = orchestrator(&browser);

    let report = orchestrator
        .begin_broadcast("hello", &destinations(&["siteA"]))
        .await
        .unwrap();
    let tab = report.get("siteA").unwrap().tab_id.unwrap();
    assert!(orchestrator.is_delivered(tab));

    browser.close(tab);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!orchestrator.is_delivered(tab));
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_pending_destinations() {
    let browser = FakeBrowser::new(&[("siteA", Script::never_loads())]);
    let orchestrator = orchestrator(&browser);

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .begin_broadcast("hello", &destinations(&["siteA"]))
                .await
        })
    };
    tokio::time::sleep(Duration::from_secs(2)).await;
    orchestrator.shutdown().await;

    let report = running.await.unwrap().unwrap();
    assert_eq!(
        report.get("siteA").unwrap().outcome,
        DestinationOutcome::Closed
    );
}
