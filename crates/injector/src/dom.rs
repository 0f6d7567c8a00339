use async_trait::async_trait;
use site_registry::CommitKey;

use crate::errors::DomError;

/// Page-local reference to a DOM element. Handles stay valid after the node
/// leaves the document; [`PageDom::is_connected`] tells whether it did.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ElementHandle(pub u64);

/// Synthetic events dispatched on an element. All of them bubble.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DomEvent {
    Input,
    Change,
    CompositionStart,
    CompositionUpdate { data: String },
    CompositionEnd { data: String },
}

impl DomEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            DomEvent::Input => "input",
            DomEvent::Change => "change",
            DomEvent::CompositionStart => "compositionstart",
            DomEvent::CompositionUpdate { .. } => "compositionupdate",
            DomEvent::CompositionEnd { .. } => "compositionend",
        }
    }

    pub fn data(&self) -> Option<&str> {
        match self {
            DomEvent::CompositionUpdate { data } | DomEvent::CompositionEnd { data } => Some(data),
            _ => None,
        }
    }
}

/// DOM capabilities the injector needs from the page it runs in.
#[async_trait]
pub trait PageDom: Send + Sync {
    async fn hostname(&self) -> Result<String, DomError>;

    /// Elements matching `selector`, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, DomError>;

    async fn is_connected(&self, element: ElementHandle) -> Result<bool, DomError>;
    async fn is_content_editable(&self, element: ElementHandle) -> Result<bool, DomError>;
    async fn is_enabled(&self, element: ElementHandle) -> Result<bool, DomError>;

    async fn focus(&self, element: ElementHandle) -> Result<(), DomError>;
    async fn set_value(&self, element: ElementHandle, text: &str) -> Result<(), DomError>;
    async fn set_text_content(&self, element: ElementHandle, text: &str) -> Result<(), DomError>;
    async fn dispatch_event(&self, element: ElementHandle, event: &DomEvent)
        -> Result<(), DomError>;

    /// Keydown for the commit key, dispatched on the element.
    async fn dispatch_key(&self, element: ElementHandle, key: CommitKey) -> Result<(), DomError>;
    async fn click(&self, element: ElementHandle) -> Result<(), DomError>;
}
