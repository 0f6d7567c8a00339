use std::time::Duration;

/// Fixed timing of the per-destination pipeline.
#[derive(Clone, Debug)]
pub struct OrchestratorPolicy {
    /// Time allowed for a tab's load signal (milliseconds)
    pub load_timeout_ms: u64,

    /// Delivery round trips per tab
    pub delivery_attempts: u32,

    /// Pause between delivery attempts (milliseconds)
    pub delivery_backoff_ms: u64,
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            load_timeout_ms: 30_000,
            delivery_attempts: 3,
            delivery_backoff_ms: 2_000,
        }
    }
}

impl OrchestratorPolicy {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn delivery_backoff(&self) -> Duration {
        Duration::from_millis(self.delivery_backoff_ms)
    }
}
