//! Subscribes to the config hot-reload channel and keeps a `watch` cell
//! holding the current `RenderClipConfig` up to date.
//!
//! Resilient to broker disconnects: a subscribe failure is logged and
//! retried with a fixed backoff rather than killing the watcher task, since
//! a worker should keep running its current config through a transient
//! Redis outage.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use vclip_models::RenderClipConfig;
use vclip_queue::ConfigChannel;

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Starts the watcher as a background task and returns a receiver that
/// always holds the current config.
pub fn spawn(channel: ConfigChannel, initial: RenderClipConfig) -> watch::Receiver<Arc<RenderClipConfig>> {
    let (tx, rx) = watch::channel(Arc::new(initial));

    tokio::spawn(async move {
        loop {
            match channel.subscribe().await {
                Ok(mut stream) => {
                    info!("subscribed to config hot-reload channel");
                    use futures_util::StreamExt;
                    while let Some(patch) = stream.next().await {
                        apply_patch(&tx, &patch);
                    }
                    warn!("config hot-reload stream ended, resubscribing");
                }
                Err(e) => {
                    error!(error = %e, "failed to subscribe to config hot-reload channel, retrying");
                }
            }
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    });

    rx
}

fn apply_patch(tx: &watch::Sender<Arc<RenderClipConfig>>, patch: &serde_json::Value) {
    let current = tx.borrow().clone();
    match current.apply_patch(patch) {
        Ok(updated) => {
            info!(patch = %patch, "applied config hot-reload patch");
            let _ = tx.send(Arc::new(updated));
        }
        Err(e) => {
            warn!(error = %e, patch = %patch, "rejected invalid config hot-reload patch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_real_placeholder() -> (tempfile::NamedTempFile, RenderClipConfig) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = RenderClipConfig::default();
        cfg.placeholder_asset_path = file.path().to_string_lossy().to_string();
        (file, cfg)
    }

    #[test]
    fn apply_patch_updates_on_valid_input() {
        let (_file, cfg) = config_with_real_placeholder();
        let (tx, rx) = watch::channel(Arc::new(cfg));
        apply_patch(&tx, &serde_json::json!({ "max_parallelism": 2 }));
        assert_eq!(rx.borrow().max_parallelism, 2);
    }

    #[test]
    fn apply_patch_ignores_invalid_input() {
        let (_file, cfg) = config_with_real_placeholder();
        let default_parallelism = cfg.max_parallelism;
        let (tx, rx) = watch::channel(Arc::new(cfg));
        apply_patch(&tx, &serde_json::json!({ "max_parallelism": 99 }));
        assert_eq!(rx.borrow().max_parallelism, default_parallelism);
    }

    #[test]
    fn apply_patch_rejects_nonexistent_placeholder_path() {
        let (_file, cfg) = config_with_real_placeholder();
        let original_path = cfg.placeholder_asset_path.clone();
        let (tx, rx) = watch::channel(Arc::new(cfg));
        apply_patch(&tx, &serde_json::json!({ "placeholder_asset_path": "/no/such/placeholder.mp4" }));
        assert_eq!(rx.borrow().placeholder_asset_path, original_path);
    }
}
