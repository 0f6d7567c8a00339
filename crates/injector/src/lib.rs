//! Page-scoped text injector.
//!
//! One [`InjectorSession`] lives per destination page. It discovers the input
//! control through the site's strategy, synthesizes the event sequence the
//! host application expects and triggers submission. [`InjectorHost`] owns the
//! per-tab mailboxes the orchestrator delivers commands into.

pub mod dom;
pub mod errors;
pub mod host;
pub mod policy;
pub mod session;

mod protocol;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dom::{DomEvent, ElementHandle, PageDom};
pub use errors::{DeliveryError, DomError};
pub use host::InjectorHost;
pub use policy::InjectorPolicy;
pub use session::{InjectionOutcome, InjectorSession, InjectorState};
