//! Glue between the CDP adapter and the two actor domains.
//!
//! The orchestrator sees the browser through [`CdpTabPlatform`] and reaches
//! injectors through [`HostChannel`]. [`InjectorBridge`] starts an injector
//! for every tab whose page finished loading, backed by [`CdpPageDom`], and
//! only then tells the orchestrator the tab is loaded.

mod attach;
mod dom;
mod platform;

pub use attach::{DomFactory, InjectorBridge};
pub use dom::CdpPageDom;
pub use platform::{CdpTabPlatform, HostChannel};
