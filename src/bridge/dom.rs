use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, AdapterErrorKind, CdpAdapter, TabId};
use injector::{DomError, DomEvent, ElementHandle, PageDom};
use serde_json::Value;
use site_registry::CommitKey;

/// Page-global handle table. Handles hold their node weakly; a handle whose
/// node was collected reads as detached and is pruned on the next query.
const HANDLES: &str = "(window.__tabcast ??= { next: 1, byId: new Map(), ids: new WeakMap() })";

/// [`PageDom`] for one tab, executed through `Runtime.evaluate`.
pub struct CdpPageDom {
    adapter: Arc<CdpAdapter>,
    tab: TabId,
}

impl CdpPageDom {
    pub fn new(adapter: Arc<CdpAdapter>, tab: TabId) -> Self {
        Self { adapter, tab }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    async fn eval(&self, expression: String) -> Result<Value, DomError> {
        self.adapter
            .evaluate(self.tab, &expression)
            .await
            .map_err(dom_error)
    }

    /// Run `body` with `el` bound to the element behind `handle`.
    async fn with_element(&self, handle: ElementHandle, body: &str) -> Result<Value, DomError> {
        let value = self.eval(element_script(handle, body)).await?;
        if value.get("missing").and_then(Value::as_bool) == Some(true) {
            return Err(DomError::UnknownHandle(handle.0));
        }
        if value.get("gone").and_then(Value::as_bool) == Some(true) {
            return Err(DomError::Detached);
        }
        Ok(value.get("ok").cloned().unwrap_or(Value::Null))
    }

    async fn element_flag(&self, handle: ElementHandle, body: &str) -> Result<bool, DomError> {
        self.with_element(handle, body)
            .await?
            .as_bool()
            .ok_or_else(|| DomError::Script("expected a boolean".into()))
    }
}

fn dom_error(err: AdapterError) -> DomError {
    match err.kind {
        AdapterErrorKind::ScriptException => {
            DomError::Script(err.hint.unwrap_or_else(|| err.kind.to_string()))
        }
        _ => DomError::Transport(err.to_string()),
    }
}

fn js_string(raw: &str) -> String {
    // A JSON string literal is a valid JS string literal.
    Value::String(raw.to_owned()).to_string()
}

fn element_script(handle: ElementHandle, body: &str) -> String {
    format!(
        "(() => {{ const r = {HANDLES}; const ref = r.byId.get({id}); \
         if (!ref) return {{ missing: true }}; \
         const el = ref.deref(); \
         if (!el) {{ r.byId.delete({id}); return {{ gone: true }}; }} \
         return {{ ok: (() => {{ {body} }})() }}; }})()",
        id = handle.0,
    )
}

fn query_script(selector: &str) -> String {
    format!(
        "(() => {{ const r = {HANDLES}; \
         for (const [id, ref] of r.byId) {{ if (!ref.deref()) r.byId.delete(id); }} \
         return Array.from(document.querySelectorAll({sel}), (node) => {{ \
           let id = r.ids.get(node); \
           if (id === undefined) {{ id = r.next++; r.ids.set(node, id); r.byId.set(id, new WeakRef(node)); }} \
           return id; }}); }})()",
        sel = js_string(selector),
    )
}

fn event_body(event: &DomEvent) -> String {
    let name = js_string(event.type_name());
    match event.data() {
        Some(data) => format!(
            "el.dispatchEvent(new CompositionEvent({name}, {{ bubbles: true, data: {data} }})); return null;",
            data = js_string(data),
        ),
        None => format!("el.dispatchEvent(new Event({name}, {{ bubbles: true }})); return null;"),
    }
}

fn key_body(key: CommitKey) -> String {
    format!(
        "el.dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Enter', code: 'Enter', \
         keyCode: 13, which: 13, bubbles: true, cancelable: true, ctrlKey: {ctrl} }})); return null;",
        ctrl = key.ctrl(),
    )
}

#[async_trait]
impl PageDom for CdpPageDom {
    async fn hostname(&self) -> Result<String, DomError> {
        match self.eval("location.hostname".into()).await? {
            Value::String(host) => Ok(host),
            other => Err(DomError::Script(format!("unexpected hostname {other}"))),
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError> {
        let value = self.eval(query_script(selector)).await?;
        let ids = value
            .as_array()
            .ok_or_else(|| DomError::Script("query did not return a list".into()))?;
        ids.iter()
            .map(|id| {
                id.as_u64()
                    .map(ElementHandle)
                    .ok_or_else(|| DomError::Script(format!("bad element handle {id}")))
            })
            .collect()
    }

    async fn is_connected(&self, element: ElementHandle) -> Result<bool, DomError> {
        match self.element_flag(element, "return el.isConnected;").await {
            Err(DomError::Detached) => Ok(false),
            other => other,
        }
    }

    async fn is_content_editable(&self, element: ElementHandle) -> Result<bool, DomError> {
        self.element_flag(element, "return el.isContentEditable === true;")
            .await
    }

    async fn is_enabled(&self, element: ElementHandle) -> Result<bool, DomError> {
        self.element_flag(element, "return !el.disabled;").await
    }

    async fn focus(&self, element: ElementHandle) -> Result<(), DomError> {
        self.with_element(element, "el.focus(); return null;")
            .await
            .map(|_| ())
    }

    async fn set_value(&self, element: ElementHandle, text: &str) -> Result<(), DomError> {
        let body = format!("el.value = {}; return null;", js_string(text));
        self.with_element(element, &body).await.map(|_| ())
    }

    async fn set_text_content(&self, element: ElementHandle, text: &str) -> Result<(), DomError> {
        let body = format!("el.textContent = {}; return null;", js_string(text));
        self.with_element(element, &body).await.map(|_| ())
    }

    async fn dispatch_event(
        &self,
        element: ElementHandle,
        event: &DomEvent,
    ) -> Result<(), DomError> {
        self.with_element(element, &event_body(event))
            .await
            .map(|_| ())
    }

    async fn dispatch_key(&self, element: ElementHandle, key: CommitKey) -> Result<(), DomError> {
        self.with_element(element, &key_body(key)).await.map(|_| ())
    }

    async fn click(&self, element: ElementHandle) -> Result<(), DomError> {
        self.with_element(element, "el.click(); return null;")
            .await
            .map(|_| ())
    }
}
