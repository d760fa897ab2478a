//! StatsD-style aggregation daemon
//!
//! Listens for metric packets over UDP, aggregates them in memory and serves a
//! line-oriented management interface over TCP. See [`statsd_rs::config`] for
//! the environment variables it reads.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use statsd_rs::observability::init_tracing;
use statsd_rs::{
    CollectionServer, Config, FlushSink, Flusher, LogSink, ManagementServer, MetricsStore,
    ServerError,
};
use tokio::signal;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_tracing(config.debug, config.json_logs);
    info!("Starting statsd-rs {}", env!("CARGO_PKG_VERSION"));

    let store = MetricsStore::spawn(config.store_config());
    let shutdown = CancellationToken::new();

    let management = ManagementServer::bind(&config.management_address, store.clone()).await?;
    let management_task = tokio::spawn(management.run(shutdown.clone()));

    let flusher_task = config.flush_interval().map(|interval| {
        let flusher = Flusher::new(store.clone(), interval, Box::new(LogSink));
        tokio::spawn(flusher.run(shutdown.clone()))
    });

    let collection =
        CollectionServer::bind(&config.address, store.clone(), config.max_packet_size).await?;
    let mut collection_task = tokio::spawn(collection.run(shutdown.clone()));

    let (mut outcome, collection_done) = tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => {
                info!("Shutdown signal received");
                (Ok(()), false)
            }
            Err(e) => (Err(e.into()), false),
        },
        joined = &mut collection_task => (collection_outcome(joined), true),
    };

    shutdown.cancel();
    // No packet may be mid-submission when the final flush runs
    if !collection_done {
        let stopped = collection_outcome(collection_task.await);
        if outcome.is_ok() {
            outcome = stopped;
        }
    }
    match management_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Management server stopped: {}", e),
        Err(e) => error!("Management server task failed: {}", e),
    }
    if let Some(task) = flusher_task {
        let _ = task.await;
    }

    // Report whatever was applied since the last window
    if store.sync().await.is_ok() {
        LogSink.export(store.flush());
    }

    if let Err(e) = &outcome {
        error!("Collection server stopped: {}", e);
    }
    outcome
}

fn collection_outcome(
    joined: Result<Result<(), ServerError>, JoinError>,
) -> Result<(), Box<dyn std::error::Error>> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}
