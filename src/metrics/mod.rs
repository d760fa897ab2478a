//! In-memory metric aggregation
//!
//! Three independent families live behind one reader/writer lock:
//!
//! - **Counters**: `value += delta / sample_rate`
//! - **Gauges**: last write wins
//! - **Timers**: raw samples appended in arrival order
//!
//! All writes are serialized through a bounded queue with a single consumer.
//! Reads and flushes take the lock directly and never wait on the queue.

mod error;
mod mutation;
mod store;
mod types;

pub use error::StoreError;
pub use mutation::{Mutation, MutationActor};
pub use store::{MetricsStore, StoreConfig, DEFAULT_QUEUE_CAPACITY};
pub use types::{Counters, Gauges, MetricFamily, MetricMaps, MetricUpdate, Snapshot, Timers};
