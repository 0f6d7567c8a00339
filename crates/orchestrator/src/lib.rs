//! Broadcast orchestrator.
//!
//! Owns the in-flight broadcasts: creates one tab per destination, waits for
//! its load signal, and delivers the injection command with bounded retries.
//! Every destination runs its own pipeline; outcomes are reported per
//! destination, never as a single aggregate.

pub mod errors;
pub mod model;
pub mod policy;
pub mod ports;

mod orchestrator;
mod pipeline;

pub use errors::{BroadcastError, PlatformError};
pub use model::{
    BroadcastReport, BroadcastRequest, DestinationOutcome, DestinationReport, TabSession, TabState,
};
pub use orchestrator::Orchestrator;
pub use policy::OrchestratorPolicy;
pub use ports::{CommandChannel, TabPlatform};
