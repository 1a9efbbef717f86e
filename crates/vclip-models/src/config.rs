//! Process-wide runtime parameters for the render pipeline.
//!
//! Loaded from the environment at startup, then replaced atomically on
//! hot-reload events received over the `render:config` channel
//! (`vclip_worker::config_watcher`). A config update is applied only if it
//! validates; an invalid update is rejected and logged without mutating state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_parallelism must be in 1..=6, got {0}")]
    MaxParallelism(u32),
    #[error("per_video_limit must be >= 1, got {0}")]
    PerVideoLimit(u32),
    #[error("metrics_flush_interval_s must be >= 1, got {0}")]
    MetricsFlushInterval(u64),
    #[error("placeholder_asset_path does not exist: {0}")]
    PlaceholderPathMissing(String),
}

/// Runtime parameters for the clip scheduler and fetch/cut engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderClipConfig {
    /// Global max concurrent clip tasks, bounded 1..=6.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: u32,
    /// Max concurrent tasks sharing one source_video_id.
    #[serde(default = "default_per_video_limit")]
    pub per_video_limit: u32,
    /// Max retry attempts per candidate.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    /// Exponential backoff base, milliseconds.
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    /// Path to the pre-provisioned placeholder asset.
    #[serde(default = "default_placeholder_asset_path")]
    pub placeholder_asset_path: String,
    /// How often aggregate metrics are flushed, seconds.
    #[serde(default = "default_metrics_flush_interval_s")]
    pub metrics_flush_interval_s: u64,
    /// External retrieve service rate limit, requests/minute.
    #[serde(default = "default_retrieve_rate_per_minute")]
    pub retrieve_rate_per_minute: u32,
}

fn default_max_parallelism() -> u32 {
    4
}
fn default_per_video_limit() -> u32 {
    2
}
fn default_max_retry() -> u32 {
    2
}
fn default_retry_backoff_base_ms() -> u64 {
    500
}
fn default_placeholder_asset_path() -> String {
    "media/fallback/clip_placeholder.mp4".to_string()
}
fn default_metrics_flush_interval_s() -> u64 {
    15
}
fn default_retrieve_rate_per_minute() -> u32 {
    40
}

impl Default for RenderClipConfig {
    fn default() -> Self {
        Self {
            max_parallelism: default_max_parallelism(),
            per_video_limit: default_per_video_limit(),
            max_retry: default_max_retry(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            placeholder_asset_path: default_placeholder_asset_path(),
            metrics_flush_interval_s: default_metrics_flush_interval_s(),
            retrieve_rate_per_minute: default_retrieve_rate_per_minute(),
        }
    }
}

impl RenderClipConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallelism < 1 || self.max_parallelism > 6 {
            return Err(ConfigError::MaxParallelism(self.max_parallelism));
        }
        if self.per_video_limit < 1 {
            return Err(ConfigError::PerVideoLimit(self.per_video_limit));
        }
        if self.metrics_flush_interval_s < 1 {
            return Err(ConfigError::MetricsFlushInterval(self.metrics_flush_interval_s));
        }
        if !std::path::Path::new(&self.placeholder_asset_path).exists() {
            return Err(ConfigError::PlaceholderPathMissing(self.placeholder_asset_path.clone()));
        }
        Ok(())
    }

    /// Loads from `RENDER_*` environment variables, falling back to the
    /// compiled default (and logging a warning) for any value that is
    /// missing, unparsable, or fails [`Self::validate`] on its own.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("RENDER_CLIP_CONCURRENCY") {
            match v.parse() {
                Ok(n) => cfg.max_parallelism = n,
                Err(_) => tracing::warn!(value = %v, "RENDER_CLIP_CONCURRENCY is not a valid integer, using default"),
            }
        }
        if let Ok(v) = std::env::var("RENDER_PER_VIDEO_LIMIT") {
            match v.parse() {
                Ok(n) => cfg.per_video_limit = n,
                Err(_) => tracing::warn!(value = %v, "RENDER_PER_VIDEO_LIMIT is not a valid integer, using default"),
            }
        }
        if let Ok(v) = std::env::var("RENDER_MAX_RETRY") {
            match v.parse() {
                Ok(n) => cfg.max_retry = n,
                Err(_) => tracing::warn!(value = %v, "RENDER_MAX_RETRY is not a valid integer, using default"),
            }
        }
        if let Ok(v) = std::env::var("RENDER_RETRY_BACKOFF_BASE_MS") {
            match v.parse() {
                Ok(n) => cfg.retry_backoff_base_ms = n,
                Err(_) => tracing::warn!(value = %v, "RENDER_RETRY_BACKOFF_BASE_MS is not a valid integer, using default"),
            }
        }
        if let Ok(v) = std::env::var("PLACEHOLDER_CLIP_PATH") {
            cfg.placeholder_asset_path = v;
        }
        if let Ok(v) = std::env::var("RENDER_METRICS_FLUSH_INTERVAL_S") {
            match v.parse() {
                Ok(n) => cfg.metrics_flush_interval_s = n,
                Err(_) => tracing::warn!(value = %v, "RENDER_METRICS_FLUSH_INTERVAL_S is not a valid integer, using default"),
            }
        }
        if let Ok(v) = std::env::var("RENDER_RETRIEVE_RATE_PER_MINUTE") {
            match v.parse() {
                Ok(n) => cfg.retrieve_rate_per_minute = n,
                Err(_) => tracing::warn!(value = %v, "RENDER_RETRIEVE_RATE_PER_MINUTE is not a valid integer, using default"),
            }
        }

        if let Err(e) = cfg.validate() {
            tracing::warn!(error = %e, "environment-derived RenderClipConfig failed validation, falling back to default");
            return Self::default();
        }

        cfg
    }

    /// Merges a partial JSON patch (as received on `render:config`) onto a
    /// clone of `self`, ignoring unknown keys, without mutating `self`.
    /// Returns an error (and leaves `self` untouched) if the result fails
    /// validation.
    pub fn apply_patch(&self, patch: &serde_json::Value) -> Result<Self, ConfigError> {
        let mut merged = serde_json::to_value(self).expect("RenderClipConfig always serializes");
        if let (Some(base), Some(patch_obj)) = (merged.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_obj {
                if base.contains_key(k) {
                    base.insert(k.clone(), v.clone());
                }
            }
        }
        let candidate: Self = serde_json::from_value(merged).unwrap_or_else(|_| self.clone());
        candidate.validate()?;
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with_real_placeholder() -> (tempfile::NamedTempFile, RenderClipConfig) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = RenderClipConfig::default();
        cfg.placeholder_asset_path = file.path().to_string_lossy().to_string();
        (file, cfg)
    }

    #[test]
    fn default_config_validates_when_placeholder_exists() {
        let (_file, cfg) = cfg_with_real_placeholder();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_missing_placeholder_path() {
        let mut cfg = RenderClipConfig::default();
        cfg.placeholder_asset_path = "/no/such/placeholder.mp4".to_string();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::PlaceholderPathMissing("/no/such/placeholder.mp4".to_string()))
        );
    }

    #[test]
    fn rejects_out_of_range_parallelism() {
        let mut cfg = RenderClipConfig::default();
        cfg.max_parallelism = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::MaxParallelism(0)));
        cfg.max_parallelism = 7;
        assert_eq!(cfg.validate(), Err(ConfigError::MaxParallelism(7)));
    }

    #[test]
    fn patch_applies_known_keys_only() {
        let (_file, cfg) = cfg_with_real_placeholder();
        let patch = serde_json::json!({ "max_parallelism": 2, "unknown_key": "ignored" });
        let merged = cfg.apply_patch(&patch).unwrap();
        assert_eq!(merged.max_parallelism, 2);
        assert_eq!(merged.per_video_limit, cfg.per_video_limit);
    }

    #[test]
    fn patch_rejects_invalid_value_without_mutating() {
        let (_file, cfg) = cfg_with_real_placeholder();
        let patch = serde_json::json!({ "max_parallelism": 99 });
        assert!(cfg.apply_patch(&patch).is_err());
    }

    #[test]
    fn patch_pointing_placeholder_at_missing_file_is_rejected() {
        let (_file, cfg) = cfg_with_real_placeholder();
        let patch = serde_json::json!({ "placeholder_asset_path": "/no/such/placeholder.mp4" });
        assert!(cfg.apply_patch(&patch).is_err());
    }
}
