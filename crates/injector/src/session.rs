use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use site_registry::{ElementLocator, InputProtocol, Pick, StrategyRegistry};
use tabcast_core_types::{ErrorKind, SiteKey};
use tracing::{debug, info, instrument, warn};

use crate::dom::{ElementHandle, PageDom};
use crate::policy::InjectorPolicy;
use crate::protocol;

/// Injector lifecycle within one page instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectorState {
    Idle,
    Locating,
    Waiting,
    Injecting,
    Retrying,
    Succeeded,
    Failed,
}

/// Result of one `handle_injection_command` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InjectionOutcome {
    /// Another command was already being processed; nothing was done.
    Skipped,
    Succeeded,
    Failed(ErrorKind),
}

/// Strategy resolved once for the page: site locators followed by the
/// generic ones, and the protocol to apply.
#[derive(Clone, Debug)]
pub(crate) struct PageStrategy {
    pub(crate) locators: Vec<ElementLocator>,
    pub(crate) protocol: InputProtocol,
}

/// Transient per-page injector state.
pub struct InjectorSession {
    pub(crate) dom: Arc<dyn PageDom>,
    pub(crate) policy: InjectorPolicy,
    pub(crate) strategy: PageStrategy,
    site: SiteKey,
    processing: AtomicBool,
    state: Mutex<InjectorState>,
}

struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl InjectorSession {
    pub fn new(
        dom: Arc<dyn PageDom>,
        site: SiteKey,
        registry: &StrategyRegistry,
        policy: InjectorPolicy,
    ) -> Self {
        let resolved = registry.resolve(&site);
        let strategy = PageStrategy {
            locators: resolved.locators().cloned().collect(),
            protocol: resolved.protocol().clone(),
        };
        debug!(
            target: "injector",
            %site,
            known = resolved.is_known_site(),
            protocol = strategy.protocol.name(),
            "injector session created"
        );
        Self {
            dom,
            policy,
            strategy,
            site,
            processing: AtomicBool::new(false),
            state: Mutex::new(InjectorState::Idle),
        }
    }

    pub fn site(&self) -> &SiteKey {
        &self.site
    }

    pub fn state(&self) -> InjectorState {
        *self.state.lock()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    fn set_state(&self, state: InjectorState) {
        *self.state.lock() = state;
        debug!(target: "injector", site = %self.site, ?state, "injector state");
    }

    /// Locate, fill and submit. A call made while another is in flight
    /// returns [`InjectionOutcome::Skipped`] without touching the page.
    #[instrument(target = "injector", skip_all, fields(site = %self.site))]
    pub async fn handle_injection_command(&self, text: &str) -> InjectionOutcome {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            debug!(target: "injector", "already processing a command, skipping");
            return InjectionOutcome::Skipped;
        };

        self.set_state(InjectorState::Locating);
        let mut element = match self.wait_for_element().await {
            Ok(element) => Some(element),
            Err(kind) => {
                warn!(target: "injector", error = %kind, "giving up before injection");
                self.set_state(InjectorState::Failed);
                return InjectionOutcome::Failed(kind);
            }
        };

        let attempts = self.policy.injection_attempts.max(1);
        for attempt in 1..=attempts {
            self.set_state(InjectorState::Injecting);
            // Re-resolve on retries: the host may have re-rendered the control.
            let target = match element.take() {
                Some(element) => Some(element),
                None => self.locate_input_element().await,
            };
            match target {
                Some(element) => {
                    if self.apply_input_protocol(element, text).await {
                        info!(target: "injector", attempt, "text injected");
                        self.set_state(InjectorState::Succeeded);
                        return InjectionOutcome::Succeeded;
                    }
                }
                None => debug!(target: "injector", attempt, "input element vanished"),
            }
            if attempt < attempts {
                self.set_state(InjectorState::Retrying);
                tokio::time::sleep(self.policy.retry_delay()).await;
            }
        }

        warn!(target: "injector", attempts, error = %ErrorKind::InjectionFailed, "injection attempts exhausted");
        self.set_state(InjectorState::Failed);
        InjectionOutcome::Failed(ErrorKind::InjectionFailed)
    }

    /// First attached element matched by the page strategy, evaluated afresh.
    pub async fn locate_input_element(&self) -> Option<ElementHandle> {
        for locator in &self.strategy.locators {
            if let Some(element) = self.find(locator).await {
                return Some(element);
            }
        }
        None
    }

    pub(crate) async fn find(&self, locator: &ElementLocator) -> Option<ElementHandle> {
        let matches = match self.dom.query_all(&locator.selector).await {
            Ok(matches) => matches,
            Err(err) => {
                debug!(target: "injector", selector = %locator.selector, error = %err, "query failed");
                return None;
            }
        };

        let mut attached = Vec::with_capacity(matches.len());
        for element in matches {
            if matches!(self.dom.is_connected(element).await, Ok(true)) {
                attached.push(element);
            }
        }
        match locator.pick {
            Pick::First => attached.first().copied(),
            Pick::Last => attached.last().copied(),
        }
    }

    /// Poll for the input element at a fixed interval.
    pub async fn wait_for_element(&self) -> Result<ElementHandle, ErrorKind> {
        let attempts = self.policy.poll_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(element) = self.locate_input_element().await {
                debug!(target: "injector", attempt, element = element.0, "input element found");
                return Ok(element);
            }
            if attempt < attempts {
                self.set_state(InjectorState::Waiting);
                tokio::time::sleep(self.policy.poll_interval()).await;
            }
        }
        Err(ErrorKind::ElementNotFound)
    }

    /// Run the page's input protocol once. Errors are logged, never raised.
    pub async fn apply_input_protocol(&self, element: ElementHandle, text: &str) -> bool {
        match protocol::apply(self, element, text).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target: "injector",
                    protocol = self.strategy.protocol.name(),
                    error = %err,
                    "input protocol failed"
                );
                false
            }
        }
    }
}
