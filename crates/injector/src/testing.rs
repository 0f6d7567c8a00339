//! In-memory page used by tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use site_registry::CommitKey;

use crate::dom::{DomEvent, ElementHandle, PageDom};
use crate::errors::DomError;

/// Recorded DOM operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DomCall {
    Query(String),
    Focus(ElementHandle),
    SetValue(ElementHandle, String),
    SetText(ElementHandle, String),
    Event(ElementHandle, DomEvent),
    Key(ElementHandle, CommitKey),
    Click(ElementHandle),
}

#[derive(Debug)]
struct FakeElement {
    handle: ElementHandle,
    selectors: Vec<String>,
    connected: bool,
    content_editable: bool,
    enabled: bool,
    value: String,
    text: String,
}

#[derive(Default)]
struct State {
    elements: Vec<FakeElement>,
    calls: Vec<DomCall>,
    failing_writes: usize,
    next_id: u64,
}

/// A page whose elements match selectors by exact string.
pub struct FakeDom {
    hostname: String,
    state: Mutex<State>,
}

impl FakeDom {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            state: Mutex::new(State::default()),
        }
    }

    fn add(&self, selectors: &[&str], content_editable: bool, enabled: bool) -> ElementHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let handle = ElementHandle(state.next_id);
        state.elements.push(FakeElement {
            handle,
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            connected: true,
            content_editable,
            enabled,
            value: String::new(),
            text: String::new(),
        });
        handle
    }

    pub fn add_textarea(&self, selectors: &[&str]) -> ElementHandle {
        self.add(selectors, false, true)
    }

    pub fn add_content_editable(&self, selectors: &[&str]) -> ElementHandle {
        self.add(selectors, true, true)
    }

    pub fn add_button(&self, selectors: &[&str], enabled: bool) -> ElementHandle {
        self.add(selectors, false, enabled)
    }

    pub fn detach(&self, handle: ElementHandle) {
        self.with_element(handle, |el| el.connected = false);
    }

    pub fn set_enabled(&self, handle: ElementHandle, enabled: bool) {
        self.with_element(handle, |el| el.enabled = enabled);
    }

    /// Make the next `count` value/text writes throw.
    pub fn fail_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    pub fn value(&self, handle: ElementHandle) -> Option<String> {
        self.with_element(handle, |el| el.value.clone())
    }

    pub fn text(&self, handle: ElementHandle) -> Option<String> {
        self.with_element(handle, |el| el.text.clone())
    }

    pub fn calls(&self) -> Vec<DomCall> {
        self.state.lock().calls.clone()
    }

    pub fn query_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, DomCall::Query(_)))
            .count()
    }

    /// Calls other than queries, in order.
    pub fn mutations(&self) -> Vec<DomCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, DomCall::Query(_)))
            .collect()
    }

    fn with_element<T>(
        &self,
        handle: ElementHandle,
        f: impl FnOnce(&mut FakeElement) -> T,
    ) -> Option<T> {
        let mut state = self.state.lock();
        state
            .elements
            .iter_mut()
            .find(|el| el.handle == handle)
            .map(f)
    }

    fn record(&self, call: DomCall) {
        self.state.lock().calls.push(call);
    }

    fn known(&self, handle: ElementHandle) -> Result<(), DomError> {
        self.with_element(handle, |_| ())
            .ok_or(DomError::UnknownHandle(handle.0))
    }

    fn write(
        &self,
        handle: ElementHandle,
        f: impl FnOnce(&mut FakeElement),
    ) -> Result<(), DomError> {
        {
            let mut state = self.state.lock();
            if state.failing_writes > 0 {
                state.failing_writes -= 1;
                return Err(DomError::Script("write rejected".into()));
            }
        }
        self.with_element(handle, f)
            .ok_or(DomError::UnknownHandle(handle.0))
    }
}

#[async_trait]
impl PageDom for FakeDom {
    async fn hostname(&self) -> Result<String, DomError> {
        Ok(self.hostname.clone())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError> {
        self.record(DomCall::Query(selector.to_string()));
        let state = self.state.lock();
        Ok(state
            .elements
            .iter()
            .filter(|el| el.selectors.iter().any(|s| s == selector))
            .map(|el| el.handle)
            .collect())
    }

    async fn is_connected(&self, element: ElementHandle) -> Result<bool, DomError> {
        self.with_element(element, |el| el.connected)
            .ok_or(DomError::UnknownHandle(element.0))
    }

    async fn is_content_editable(&self, element: ElementHandle) -> Result<bool, DomError> {
        self.with_element(element, |el| el.content_editable)
            .ok_or(DomError::UnknownHandle(element.0))
    }

    async fn is_enabled(&self, element: ElementHandle) -> Result<bool, DomError> {
        self.with_element(element, |el| el.enabled)
            .ok_or(DomError::UnknownHandle(element.0))
    }

    async fn focus(&self, element: ElementHandle) -> Result<(), DomError> {
        self.known(element)?;
        self.record(DomCall::Focus(element));
        Ok(())
    }

    async fn set_value(&self, element: ElementHandle, text: &str) -> Result<(), DomError> {
        self.write(element, |el| el.value = text.to_string())?;
        self.record(DomCall::SetValue(element, text.to_string()));
        Ok(())
    }

    async fn set_text_content(&self, element: ElementHandle, text: &str) -> Result<(), DomError> {
        self.write(element, |el| el.text = text.to_string())?;
        self.record(DomCall::SetText(element, text.to_string()));
        Ok(())
    }

    async fn dispatch_event(
        &self,
        element: ElementHandle,
        event: &DomEvent,
    ) -> Result<(), DomError> {
        self.known(element)?;
        self.record(DomCall::Event(element, event.clone()));
        Ok(())
    }

    async fn dispatch_key(&self, element: ElementHandle, key: CommitKey) -> Result<(), DomError> {
        self.known(element)?;
        self.record(DomCall::Key(element, key));
        Ok(())
    }

    async fn click(&self, element: ElementHandle) -> Result<(), DomError> {
        self.known(element)?;
        self.record(DomCall::Click(element));
        Ok(())
    }
}
