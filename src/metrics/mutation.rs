//! Mutation queue and its single consumer
//!
//! Every write to the store is expressed as a [`Mutation`] value and pushed onto
//! a bounded FIFO channel. Exactly one [`MutationActor`] drains that channel and
//! applies each mutation under the exclusive store lock before receiving the
//! next one, so producers never race on the maps and submission order is
//! application order.
//!
//! ```text
//! UDP packet ──┐
//! UDP packet ──┤──► mpsc (bounded) ──► MutationActor ──► write lock ──► MetricMaps
//! mgmt delete ─┘
//! ```

use super::error::{check_sample_rate, StoreError};
use super::types::{MetricFamily, MetricMaps};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// A queued write against the store.
#[derive(Debug)]
pub enum Mutation {
    /// `counters[key] += delta / sample_rate`
    AddCounter {
        key: String,
        delta: f64,
        sample_rate: f64,
    },
    /// `gauges[key] = value`
    SetGauge { key: String, value: f64 },
    /// `timers[key].push(sample)`
    AppendTimer { key: String, sample: f64 },
    /// Remove `key` from one family; absent keys are ignored
    Delete { family: MetricFamily, key: String },
    /// Signals once every mutation queued ahead of it has been applied
    Barrier(oneshot::Sender<()>),
}

impl Mutation {
    /// Check the mutation before it is queued.
    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Mutation::AddCounter { sample_rate, .. } => check_sample_rate(*sample_rate),
            _ => Ok(()),
        }
    }

    /// Apply this mutation to the maps.
    ///
    /// A counter update with an unusable sample rate leaves the maps untouched.
    pub fn apply(self, maps: &mut MetricMaps, max_timer_samples: Option<usize>) {
        match self {
            Mutation::AddCounter {
                key,
                delta,
                sample_rate,
            } => {
                if check_sample_rate(sample_rate).is_err() {
                    debug!("counter update for {} dropped, sample rate {}", key, sample_rate);
                    return;
                }
                *maps.counters.entry(key).or_insert(0.0) += delta / sample_rate;
            }
            Mutation::SetGauge { key, value } => {
                maps.gauges.insert(key, value);
            }
            Mutation::AppendTimer { key, sample } => {
                let samples = maps.timers.entry(key).or_default();
                match max_timer_samples {
                    Some(max) if samples.len() >= max => {
                        debug!("timer sample dropped, {} samples already held", max);
                    }
                    _ => samples.push(sample),
                }
            }
            Mutation::Delete { family, key } => match family {
                MetricFamily::Counter => {
                    maps.counters.remove(&key);
                }
                MetricFamily::Gauge => {
                    maps.gauges.remove(&key);
                }
                MetricFamily::Timer => {
                    maps.timers.remove(&key);
                }
            },
            Mutation::Barrier(done_tx) => {
                let _ = done_tx.send(());
            }
        }
    }
}

/// The serializer: sole consumer of the mutation queue.
pub struct MutationActor {
    maps: Arc<RwLock<MetricMaps>>,
    rx: mpsc::Receiver<Mutation>,
    max_timer_samples: Option<usize>,
}

impl MutationActor {
    pub fn new(
        maps: Arc<RwLock<MetricMaps>>,
        rx: mpsc::Receiver<Mutation>,
        max_timer_samples: Option<usize>,
    ) -> Self {
        MutationActor {
            maps,
            rx,
            max_timer_samples,
        }
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(mut self) {
        let mut applied: u64 = 0;
        while let Some(mutation) = self.rx.recv().await {
            match mutation {
                Mutation::Barrier(done_tx) => {
                    let _ = done_tx.send(());
                }
                mutation => {
                    let mut maps = self.maps.write();
                    mutation.apply(&mut maps, self.max_timer_samples);
                    applied = applied.wrapping_add(1);
                }
            }
        }
        debug!("Mutation queue closed after {} writes", applied);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(key: &str, delta: f64, sample_rate: f64) -> Mutation {
        Mutation::AddCounter {
            key: key.to_string(),
            delta,
            sample_rate,
        }
    }

    #[test]
    fn test_counter_sample_rate_scaling() {
        let mut maps = MetricMaps::new();
        counter("a", 1.0, 1.0).apply(&mut maps, None);
        counter("a", 1.0, 1.0).apply(&mut maps, None);
        counter("a", 1.0, 0.5).apply(&mut maps, None);
        assert_eq!(maps.counters["a"], 4.0);
    }

    #[test]
    fn test_counter_negative_delta() {
        let mut maps = MetricMaps::new();
        counter("a", 5.0, 1.0).apply(&mut maps, None);
        counter("a", -2.0, 1.0).apply(&mut maps, None);
        assert_eq!(maps.counters["a"], 3.0);
    }

    #[test]
    fn test_invalid_sample_rate_is_rejected_and_never_applied() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mutation = counter("a", 1.0, rate);
            assert!(matches!(mutation.validate(), Err(StoreError::InvalidSampleRate(_))));

            let mut maps = MetricMaps::new();
            mutation.apply(&mut maps, None);
            assert!(maps.counters.is_empty());
        }
        assert_eq!(counter("a", 1.0, 0.5).validate(), Ok(()));
    }

    #[test]
    fn test_gauge_overwrite() {
        let mut maps = MetricMaps::new();
        Mutation::SetGauge {
            key: "g".to_string(),
            value: 1.0,
        }
        .apply(&mut maps, None);
        Mutation::SetGauge {
            key: "g".to_string(),
            value: 2.5,
        }
        .apply(&mut maps, None);
        assert_eq!(maps.gauges["g"], 2.5);
    }

    #[test]
    fn test_timer_append_order() {
        let mut maps = MetricMaps::new();
        for sample in [1.0, 3.0, 2.0] {
            Mutation::AppendTimer {
                key: "t".to_string(),
                sample,
            }
            .apply(&mut maps, None);
        }
        assert_eq!(maps.timers["t"], vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_timer_cap_drops_excess() {
        let mut maps = MetricMaps::new();
        for sample in [1.0, 2.0, 3.0] {
            Mutation::AppendTimer {
                key: "t".to_string(),
                sample,
            }
            .apply(&mut maps, Some(2));
        }
        assert_eq!(maps.timers["t"], vec![1.0, 2.0]);
    }

    #[test]
    fn test_delete_only_touches_one_family() {
        let mut maps = MetricMaps::new();
        counter("a", 1.0, 1.0).apply(&mut maps, None);
        Mutation::SetGauge {
            key: "a".to_string(),
            value: 1.0,
        }
        .apply(&mut maps, None);

        Mutation::Delete {
            family: MetricFamily::Counter,
            key: "a".to_string(),
        }
        .apply(&mut maps, None);

        assert!(!maps.counters.contains_key("a"));
        assert_eq!(maps.gauges.get("a"), Some(&1.0));
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let mut maps = MetricMaps::new();
        counter("b", 1.0, 1.0).apply(&mut maps, None);
        Mutation::Delete {
            family: MetricFamily::Counter,
            key: "missing".to_string(),
        }
        .apply(&mut maps, None);
        assert_eq!(maps.counters.len(), 1);
    }

    #[test]
    fn test_barrier_signals() {
        let (tx, mut rx) = oneshot::channel();
        Mutation::Barrier(tx).apply(&mut MetricMaps::new(), None);
        assert_eq!(rx.try_recv(), Ok(()));
    }

    #[tokio::test]
    async fn test_actor_applies_in_fifo_order() {
        let maps = Arc::new(RwLock::new(MetricMaps::new()));
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(MutationActor::new(maps.clone(), rx, None).run());

        for value in [1.0, 2.0, 3.0] {
            tx.send(Mutation::SetGauge {
                key: "g".to_string(),
                value,
            })
            .await
            .unwrap();
        }
        tx.send(Mutation::Delete {
            family: MetricFamily::Gauge,
            key: "g".to_string(),
        })
        .await
        .unwrap();
        tx.send(Mutation::SetGauge {
            key: "g".to_string(),
            value: 9.0,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(maps.read().gauges.get("g"), Some(&9.0));
    }
}
