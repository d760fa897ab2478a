//! Periodic flush driver
//!
//! Every interval the store is flushed and the detached snapshot handed to a
//! [`FlushSink`]. The sink decides what a reporting window turns into; the
//! shipped [`LogSink`] only summarizes it through `tracing`.

use crate::metrics::{MetricsStore, Snapshot};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Receives each flushed reporting window.
pub trait FlushSink: Send + Sync + 'static {
    fn export(&self, snapshot: Snapshot);
}

/// Logs a one-line summary of every window.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FlushSink for LogSink {
    fn export(&self, snapshot: Snapshot) {
        info!(
            counters = snapshot.counters.len(),
            gauges = snapshot.gauges.len(),
            timers = snapshot.timers.len(),
            timer_samples = snapshot.timer_samples(),
            "Flushed metrics window"
        );
    }
}

pub struct Flusher {
    store: MetricsStore,
    interval: Duration,
    sink: Box<dyn FlushSink>,
}

impl Flusher {
    pub fn new(store: MetricsStore, interval: Duration, sink: Box<dyn FlushSink>) -> Self {
        debug_assert!(!interval.is_zero(), "flush interval must be positive");
        Flusher {
            store,
            interval,
            sink,
        }
    }

    /// Flush on every tick until cancelled. The first flush happens one full
    /// interval after start.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Flusher started with interval {:?}", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Flusher stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let snapshot = self.store.flush();
                    self.sink.export(snapshot);
                }
            }
        }
    }
}
