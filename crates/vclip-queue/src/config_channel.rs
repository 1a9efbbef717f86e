//! Pub/sub channel for config hot-reload.
//!
//! An operator writes a partial JSON patch to Redis; every worker process
//! subscribed to `render:config` receives it and applies it via
//! `RenderClipConfig::apply_patch`, atomically swapping the config a running
//! job driver reads from. This reuses the same pub/sub primitive as
//! [`crate::progress::ProgressChannel`], just with one fixed channel instead
//! of one per job.

use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

use crate::error::QueueResult;

const DEFAULT_CONFIG_CHANNEL: &str = "render:config";

#[derive(Clone)]
pub struct ConfigChannel {
    client: redis::Client,
    channel: String,
}

impl ConfigChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let channel = std::env::var("RENDER_CONFIG_CHANNEL")
            .unwrap_or_else(|_| DEFAULT_CONFIG_CHANNEL.to_string());
        Ok(Self { client, channel })
    }

    /// Publish a partial config patch to every subscribed worker.
    pub async fn publish_patch(&self, patch: &Value) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(patch)?;

        debug!("publishing config patch to {}", self.channel);
        conn.publish::<_, _, ()>(&self.channel, payload).await?;

        Ok(())
    }

    /// Subscribe to config patches. Yields one parsed `Value` per publish;
    /// patches that fail to parse as JSON are silently dropped rather than
    /// killing the stream, since a patch author's typo should not crash
    /// every running worker.
    pub async fn subscribe(
        &self,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = Value> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channel_name_is_stable() {
        assert_eq!(DEFAULT_CONFIG_CHANNEL, "render:config");
    }

    #[test]
    fn channel_name_honors_env_override() {
        // SAFETY: test runs single-threaded within this process's env mutation; no
        // other test in this module reads RENDER_CONFIG_CHANNEL concurrently.
        unsafe {
            std::env::set_var("RENDER_CONFIG_CHANNEL", "render:config:staging");
        }
        let channel = ConfigChannel::new("redis://localhost:6379").unwrap();
        assert_eq!(channel.channel, "render:config:staging");
        unsafe {
            std::env::remove_var("RENDER_CONFIG_CHANNEL");
        }
    }
}
