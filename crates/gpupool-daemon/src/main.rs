//! gpupool daemon
//!
//! Main daemon process: wires the store handle, the engine, the scheduler
//! workers, and the REST API together. The store handle is constructed once
//! here and passed to every component.

use clap::Parser;
use gpupool_api::create_router;
use gpupool_compute::NoopBackend;
use gpupool_core::DaemonConfig;
use gpupool_engine::{
    AllocationMatcher, CostTracker, LifecycleOrchestrator, PoolService, ResourceCatalog,
    SchedulerWorker,
};
use gpupool_store::{MemoryStore, PoolStore, RetryingStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tower_http::cors::CorsLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// gpupool daemon - tenant-scoped GPU allocation and job-lifecycle engine
#[derive(Parser, Debug)]
#[command(name = "gpupoold")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind the API server (overrides config)
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Number of concurrent scheduler workers (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Seconds between scheduling passes (overrides config)
    #[arg(long)]
    tick_interval_secs: Option<u64>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_file(path).expect("Failed to load config"),
        None => DaemonConfig::default(),
    };
    if let Some(address) = args.address {
        config.api.address = address;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(workers) = args.workers {
        config.scheduler.workers = workers;
    }
    if let Some(secs) = args.tick_interval_secs {
        config.scheduler.tick_interval_secs = secs;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    info!("Starting gpupool daemon v{}", env!("CARGO_PKG_VERSION"));

    // One explicit store handle, shared by every component
    let store: Arc<dyn PoolStore> = Arc::new(RetryingStore::from_config(
        MemoryStore::new(),
        &config.store,
    ));
    let compute = Arc::new(NoopBackend::new());

    let catalog = ResourceCatalog::new(store.clone());
    let cost = CostTracker::new(store.clone());
    let lifecycle = Arc::new(LifecycleOrchestrator::new(
        store.clone(),
        catalog.clone(),
        cost,
        compute,
    ));
    let matcher = AllocationMatcher::new(
        catalog,
        lifecycle.clone(),
        config.scheduler.max_reserve_attempts,
    );

    let kick = Arc::new(Notify::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_count = config.scheduler.workers.max(1);
    let mut workers = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let worker = SchedulerWorker::new(
            id,
            store.clone(),
            matcher.clone(),
            &config.scheduler,
            kick.clone(),
            shutdown_rx.clone(),
        );
        workers.push(worker.spawn());
    }

    let service = Arc::new(PoolService::new(store, lifecycle, kick));
    let mut router = create_router(service);
    if config.api.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.api.address, config.api.port)
        .parse()
        .expect("Invalid address");

    info!("API server listening on {}", addr);
    info!("Scheduler workers: {}", worker_count);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Stop the scheduler workers before exiting
    let _ = shutdown_tx.send(true);
    for handle in workers {
        let _ = handle.await;
    }
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install signal handler");
    info!("Shutdown signal received");
}
