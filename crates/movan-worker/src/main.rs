//! Movement analyzer worker binary.

use std::sync::Arc;
use tracing::{error, info};

use movan_media::FfmpegBackend;
use movan_worker::logging::init_tracing;
use movan_worker::metrics::init_metrics;
use movan_worker::{JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting movan-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        if let Err(e) = init_metrics(addr) {
            error!("Failed to start metrics exporter: {}", e);
            std::process::exit(1);
        }
        info!("Serving metrics on {}", addr);
    }

    let executor = Arc::new(JobExecutor::new(config, Arc::new(FfmpegBackend::new())));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
