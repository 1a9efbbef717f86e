//! Per-job cache of resolved stream URLs, keyed by source video.
//!
//! Stream URLs from the retrieve service typically stay valid for hours, so
//! resolving once per job and reusing across every candidate that shares a
//! source video avoids redundant calls. Entries are invalidated on the
//! first 4xx/expired response from that URL.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct StreamUrlCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl StreamUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, source_video_id: &str) -> Option<String> {
        self.entries.read().await.get(source_video_id).cloned()
    }

    pub async fn put(&self, source_video_id: &str, url: String) {
        self.entries.write().await.insert(source_video_id.to_string(), url);
    }

    /// Evict an entry after it is observed to be stale (4xx/expired).
    pub async fn invalidate(&self, source_video_id: &str) {
        self.entries.write().await.remove(source_video_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_hit_after_put() {
        let cache = StreamUrlCache::new();
        cache.put("vid-1", "https://stream.example/vid-1".to_string()).await;
        assert_eq!(cache.get("vid-1").await.as_deref(), Some("https://stream.example/vid-1"));
    }

    #[tokio::test]
    async fn invalidate_evicts_entry() {
        let cache = StreamUrlCache::new();
        cache.put("vid-1", "https://stream.example/vid-1".to_string()).await;
        cache.invalidate("vid-1").await;
        assert_eq!(cache.get("vid-1").await, None);
    }
}
