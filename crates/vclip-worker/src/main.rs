//! Karaoke render worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vclip_models::RenderClipConfig;
use vclip_queue::{ConfigChannel, JobQueue, ProgressChannel};
use vclip_worker::{config_watcher, observability, JobDriver, JobStore, RetrieveClient, WorkerConfig};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("vclip=info".parse().unwrap()))
        .init();

    info!("starting vclip-worker");

    let worker_config = WorkerConfig::from_env();
    let render_config = RenderClipConfig::from_env();
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let retrieve_base_url = std::env::var("RETRIEVE_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8090".to_string());

    let queue = match JobQueue::from_env() {
        Ok(q) => Arc::new(q),
        Err(e) => {
            error!(error = %e, "failed to create job queue");
            std::process::exit(1);
        }
    };
    if let Err(e) = queue.init().await {
        error!(error = %e, "failed to initialize job queue");
        std::process::exit(1);
    }

    let progress = match ProgressChannel::new(&redis_url) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to create progress channel");
            std::process::exit(1);
        }
    };
    let job_store = JobStore::new(progress);

    let config_channel = match ConfigChannel::new(&redis_url) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to create config hot-reload channel");
            std::process::exit(1);
        }
    };
    let config_rx = config_watcher::spawn(config_channel, render_config);

    let retrieve = match RetrieveClient::new(retrieve_base_url) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to create retrieve client");
            std::process::exit(1);
        }
    };

    observability::init_metrics(worker_config.metrics_port);

    let driver = match JobDriver::new(queue, job_store, config_rx, retrieve, worker_config, &redis_url) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!(error = %e, "failed to create job driver");
            std::process::exit(1);
        }
    };

    let shutdown_driver = driver.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_driver.shutdown();
    });

    if let Err(e) = driver.run().await {
        error!(error = %e, "job driver exited with an error");
        std::process::exit(1);
    }

    info!("worker shutdown complete");
}
