use tabcast_core_types::TabId;
use thiserror::Error;

/// Failure of a single DOM operation inside the destination page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The element is no longer attached to the document.
    #[error("element is detached from the document")]
    Detached,

    /// The element handle is unknown to the page.
    #[error("unknown element handle {0}")]
    UnknownHandle(u64),

    /// A script executed in the page threw.
    #[error("page script threw: {0}")]
    Script(String),

    /// The submit control never became enabled.
    #[error("submit control unavailable")]
    SubmitUnavailable,

    /// The page could not be reached.
    #[error("page transport error: {0}")]
    Transport(String),
}

/// Transport-level failure of one command round trip into a tab.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no injector is listening in tab {0}")]
    NoReceiver(TabId),

    #[error("injector mailbox for tab {0} is closed")]
    Closed(TabId),

    #[error("injector in tab {0} dropped the command without acknowledging")]
    Dropped(TabId),

    #[error("injector in tab {0} did not acknowledge in time")]
    Timeout(TabId),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}
