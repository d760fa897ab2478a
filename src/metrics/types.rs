//! Core metric types for the aggregation store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Accumulated counter values keyed by metric name
pub type Counters = HashMap<String, f64>;

/// Last written gauge values keyed by metric name
pub type Gauges = HashMap<String, f64>;

/// Raw timer samples keyed by metric name, in insertion order
pub type Timers = HashMap<String, Vec<f64>>;

/// The three independent metric namespaces.
///
/// The same name may exist in every family at once; they never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricFamily {
    /// Summed, sample-rate corrected values
    Counter,
    /// Last-write-wins values
    Gauge,
    /// Append-only sample lists
    Timer,
}

impl MetricFamily {
    /// Plural label used when rendering keys (`counters.<name>`)
    pub fn label(&self) -> &'static str {
        match self {
            MetricFamily::Counter => "counters",
            MetricFamily::Gauge => "gauges",
            MetricFamily::Timer => "timers",
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One decoded metric line-segment, as produced by the packet parser.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    Counter {
        key: String,
        delta: f64,
        sample_rate: f64,
    },
    Gauge {
        key: String,
        value: f64,
    },
    Timer {
        key: String,
        sample: f64,
    },
}

impl MetricUpdate {
    pub fn key(&self) -> &str {
        match self {
            MetricUpdate::Counter { key, .. }
            | MetricUpdate::Gauge { key, .. }
            | MetricUpdate::Timer { key, .. } => key,
        }
    }

    pub fn family(&self) -> MetricFamily {
        match self {
            MetricUpdate::Counter { .. } => MetricFamily::Counter,
            MetricUpdate::Gauge { .. } => MetricFamily::Gauge,
            MetricUpdate::Timer { .. } => MetricFamily::Timer,
        }
    }
}

/// The live mappings guarded by the store lock.
#[derive(Debug, Clone, Default)]
pub struct MetricMaps {
    pub counters: Counters,
    pub gauges: Gauges,
    pub timers: Timers,
}

impl MetricMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy of all three mappings
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            counters: self.counters.clone(),
            gauges: self.gauges.clone(),
            timers: self.timers.clone(),
        }
    }

    /// Detach the current mappings, leaving empty ones in place
    pub fn take(&mut self) -> Snapshot {
        Snapshot {
            counters: std::mem::take(&mut self.counters),
            gauges: std::mem::take(&mut self.gauges),
            timers: std::mem::take(&mut self.timers),
        }
    }
}

/// Point-in-time copy of the store returned by `read` and `flush`.
///
/// Independent of the live store: later mutations never show up here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub counters: Counters,
    pub gauges: Gauges,
    pub timers: Timers,
}

impl Snapshot {
    /// Total number of entries across all families
    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len() + self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty() && self.timers.is_empty()
    }

    /// Total number of timer samples held
    pub fn timer_samples(&self) -> usize {
        self.timers.values().map(Vec::len).sum()
    }

    pub fn counter(&self, key: &str) -> Option<f64> {
        self.counters.get(key).copied()
    }

    pub fn gauge(&self, key: &str) -> Option<f64> {
        self.gauges.get(key).copied()
    }

    pub fn timer(&self, key: &str) -> Option<&[f64]> {
        self.timers.get(key).map(Vec::as_slice)
    }
}
