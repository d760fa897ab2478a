//! The aggregation store
//!
//! Writers go through the mutation queue; readers take the lock directly.
//! A read therefore reflects every mutation the serializer has applied when
//! the lock was acquired, and nothing still waiting in the queue. Call
//! [`MetricsStore::sync`] first when read-your-writes is required.

use super::error::StoreError;
use super::mutation::{Mutation, MutationActor};
use super::types::{MetricFamily, MetricMaps, MetricUpdate, Snapshot};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Default bound on pending mutations
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Pending mutations allowed before submitters wait
    pub queue_capacity: usize,
    /// Per-key sample cap for timers within one flush epoch (None = unbounded)
    pub max_timer_samples: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_timer_samples: None,
        }
    }
}

/// Handle to the shared store. Cloning is cheap; all clones see the same maps
/// and feed the same queue.
#[derive(Clone)]
pub struct MetricsStore {
    maps: Arc<RwLock<MetricMaps>>,
    tx: mpsc::Sender<Mutation>,
}

impl MetricsStore {
    /// Build a store together with its serializer, without starting it.
    ///
    /// Mutations submitted before the actor runs stay queued.
    pub fn new(config: StoreConfig) -> (Self, MutationActor) {
        debug_assert!(config.queue_capacity > 0, "queue capacity must be positive");
        let maps = Arc::new(RwLock::new(MetricMaps::new()));
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let actor = MutationActor::new(maps.clone(), rx, config.max_timer_samples);
        (MetricsStore { maps, tx }, actor)
    }

    /// Build a store and spawn its serializer on the current tokio runtime.
    pub fn spawn(config: StoreConfig) -> Self {
        let (store, actor) = Self::new(config);
        tokio::spawn(actor.run());
        info!(
            "Metrics store started (queue capacity {}, timer cap {:?})",
            config.queue_capacity, config.max_timer_samples
        );
        store
    }

    /// Enqueue a mutation, waiting while the queue is full.
    ///
    /// Counter updates with a sample rate that is not finite or is `<= 0` are
    /// rejected and nothing is enqueued.
    pub async fn submit(&self, mutation: Mutation) -> Result<(), StoreError> {
        mutation.validate()?;
        self.tx.send(mutation).await.map_err(|_| StoreError::Closed)
    }

    /// Enqueue from a thread outside the async runtime, blocking while full.
    ///
    /// Validates like [`submit`](Self::submit). Panics if called from within
    /// an async execution context.
    pub fn blocking_submit(&self, mutation: Mutation) -> Result<(), StoreError> {
        mutation.validate()?;
        self.tx.blocking_send(mutation).map_err(|_| StoreError::Closed)
    }

    pub async fn update_counter(
        &self,
        key: impl Into<String>,
        delta: f64,
        sample_rate: f64,
    ) -> Result<(), StoreError> {
        self.submit(Mutation::AddCounter {
            key: key.into(),
            delta,
            sample_rate,
        })
        .await
    }

    pub async fn update_gauge(&self, key: impl Into<String>, value: f64) -> Result<(), StoreError> {
        self.submit(Mutation::SetGauge {
            key: key.into(),
            value,
        })
        .await
    }

    pub async fn update_timer(&self, key: impl Into<String>, sample: f64) -> Result<(), StoreError> {
        self.submit(Mutation::AppendTimer {
            key: key.into(),
            sample,
        })
        .await
    }

    /// Route a decoded update to the matching entry point.
    pub async fn apply_update(&self, update: MetricUpdate) -> Result<(), StoreError> {
        match update {
            MetricUpdate::Counter {
                key,
                delta,
                sample_rate,
            } => self.update_counter(key, delta, sample_rate).await,
            MetricUpdate::Gauge { key, value } => self.update_gauge(key, value).await,
            MetricUpdate::Timer { key, sample } => self.update_timer(key, sample).await,
        }
    }

    /// Queue removal of `key` from one family. Absent keys are a no-op.
    pub async fn delete(&self, family: MetricFamily, key: impl Into<String>) -> Result<(), StoreError> {
        self.submit(Mutation::Delete {
            family,
            key: key.into(),
        })
        .await
    }

    pub async fn delete_counter(&self, key: impl Into<String>) -> Result<(), StoreError> {
        self.delete(MetricFamily::Counter, key).await
    }

    pub async fn delete_gauge(&self, key: impl Into<String>) -> Result<(), StoreError> {
        self.delete(MetricFamily::Gauge, key).await
    }

    pub async fn delete_timer(&self, key: impl Into<String>) -> Result<(), StoreError> {
        self.delete(MetricFamily::Timer, key).await
    }

    /// Deep copy of the applied state under the shared lock.
    pub fn read(&self) -> Snapshot {
        self.maps.read().snapshot()
    }

    /// Detach the applied state and reset the live maps, in one exclusive hold.
    pub fn flush(&self) -> Snapshot {
        let mut maps = self.maps.write();
        maps.take()
    }

    /// Wait until every mutation submitted before this call has been applied.
    pub async fn sync(&self) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(Mutation::Barrier(done_tx)).await?;
        done_rx.await.map_err(|_| StoreError::Closed)
    }

    /// Blocking counterpart of [`sync`](Self::sync) for non-async callers.
    pub fn blocking_sync(&self) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.blocking_submit(Mutation::Barrier(done_tx))?;
        done_rx.blocking_recv().map_err(|_| StoreError::Closed)
    }

    /// Mutations currently waiting in the queue
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
