//! tabcast: type one prompt into several web chat tabs at once.
//!
//! The binary wires the CDP adapter, the injector host and the orchestrator
//! together; this library exposes those pieces for integration tests.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod metrics;
pub mod selection;

pub use config::{AppConfig, BrowserSettings};
pub use selection::SelectionStore;
