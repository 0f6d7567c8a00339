use thiserror::Error;

/// Fail-fast validation errors of `begin_broadcast`. Nothing else about a
/// broadcast is reported as an error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("broadcast text is empty")]
    EmptyText,
    #[error("no destinations selected")]
    NoDestinations,
}

/// Failure reported by a platform port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("tab creation failed: {0}")]
    TabCreation(String),
    #[error("message delivery failed: {0}")]
    Delivery(String),
    #[error("platform unavailable: {0}")]
    Unavailable(String),
}
