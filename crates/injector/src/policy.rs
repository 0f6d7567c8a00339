use std::time::Duration;

/// Fixed timing of the injector's bounded retries.
#[derive(Clone, Debug)]
pub struct InjectorPolicy {
    /// Interval between element lookups (milliseconds)
    pub poll_interval_ms: u64,

    /// Element lookups before giving up with `ElementNotFound`
    pub poll_attempts: u32,

    /// Attempts at applying the input protocol
    pub injection_attempts: u32,

    /// Delay between protocol attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Pause between filling the element and committing (milliseconds)
    pub settle_ms: u64,

    /// Interval between submit-control checks (milliseconds)
    pub submit_poll_interval_ms: u64,

    /// Submit-control checks before the attempt fails
    pub submit_poll_attempts: u32,
}

impl Default for InjectorPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            poll_attempts: 30,
            injection_attempts: 3,
            retry_delay_ms: 1000,
            settle_ms: 1000,
            submit_poll_interval_ms: 500,
            submit_poll_attempts: 10,
        }
    }
}

impl InjectorPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn submit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.submit_poll_interval_ms)
    }
}
