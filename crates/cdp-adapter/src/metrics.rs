//! Prometheus collectors for the CDP layer.
//!
//! Collectors live in one process-wide set; the host binary decides which
//! registry exposes them via [`register_metrics`].

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use tracing::error;

struct AdapterCollectors {
    commands: IntCounterVec,
    command_failures: IntCounterVec,
    command_seconds: HistogramVec,
    events: IntCounter,
    tabs_created: IntCounter,
    tab_events: IntCounterVec,
}

impl AdapterCollectors {
    fn build() -> prometheus::Result<Self> {
        Ok(Self {
            commands: IntCounterVec::new(
                Opts::new("tabcast_cdp_commands_total", "CDP commands sent"),
                &["method"],
            )?,
            command_failures: IntCounterVec::new(
                Opts::new("tabcast_cdp_command_failures_total", "CDP commands that failed"),
                &["method"],
            )?,
            command_seconds: HistogramVec::new(
                HistogramOpts::new(
                    "tabcast_cdp_command_duration_seconds",
                    "Latency of successful CDP commands",
                )
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
                &["method"],
            )?,
            events: IntCounter::new("tabcast_cdp_events_total", "CDP events received")?,
            tabs_created: IntCounter::new(
                "tabcast_tabs_created_total",
                "Destination tabs opened",
            )?,
            tab_events: IntCounterVec::new(
                Opts::new("tabcast_tab_events_total", "Tab lifecycle events published"),
                &["kind"],
            )?,
        })
    }

    fn register_into(&self, registry: &Registry) -> prometheus::Result<()> {
        let collectors: [Box<dyn prometheus::core::Collector>; 6] = [
            Box::new(self.commands.clone()),
            Box::new(self.command_failures.clone()),
            Box::new(self.command_seconds.clone()),
            Box::new(self.events.clone()),
            Box::new(self.tabs_created.clone()),
            Box::new(self.tab_events.clone()),
        ];
        for collector in collectors {
            match registry.register(collector) {
                Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

lazy_static! {
    static ref COLLECTORS: Option<AdapterCollectors> = match AdapterCollectors::build() {
        Ok(collectors) => Some(collectors),
        Err(err) => {
            error!(target: "cdp-adapter", %err, "cdp metrics disabled");
            None
        }
    };
}

fn with_collectors(record: impl FnOnce(&AdapterCollectors)) {
    if let Some(collectors) = COLLECTORS.as_ref() {
        record(collectors);
    }
}

/// Expose the adapter's collectors through `registry`. Registering twice is
/// harmless.
pub fn register_metrics(registry: &Registry) {
    with_collectors(|c| {
        if let Err(err) = c.register_into(registry) {
            error!(target: "cdp-adapter", %err, "failed to register cdp metrics");
        }
    });
}

pub fn record_command(method: &str) {
    with_collectors(|c| c.commands.with_label_values(&[method]).inc());
}

pub fn record_command_success(method: &str, elapsed: Duration) {
    with_collectors(|c| {
        c.command_seconds
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64())
    });
}

pub fn record_command_failure(method: &str) {
    with_collectors(|c| c.command_failures.with_label_values(&[method]).inc());
}

pub fn record_event() {
    with_collectors(|c| c.events.inc());
}

pub fn record_tab_created() {
    with_collectors(|c| c.tabs_created.inc());
}

/// `kind` is `loaded` or `removed`.
pub fn record_tab_event(kind: &str) {
    with_collectors(|c| c.tab_events.with_label_values(&[kind]).inc());
}
