pub mod collection;
pub mod config;
pub mod error;
pub mod flusher;
pub mod management;
pub mod metrics;
pub mod observability;

pub use collection::CollectionServer;
pub use config::{Config, ConfigError};
pub use error::ServerError;
pub use flusher::{FlushSink, Flusher, LogSink};
pub use management::ManagementServer;
pub use metrics::{MetricFamily, MetricUpdate, MetricsStore, Snapshot, StoreConfig, StoreError};
