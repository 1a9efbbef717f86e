//! Shared data models for the render pipeline.
//!
//! This crate provides serde-serializable types for:
//! - Render jobs and their lifecycle (`job`)
//! - The locked timeline: lyric lines and candidate video segments (`timeline`)
//! - Clip tasks, the scheduler's unit of work (`clip_task`)
//! - Hot-reloadable runtime configuration (`config`)
//! - Aggregate per-job statistics (`stats`)
//! - Encoding parameters shared by clip cuts and final assembly (`encoding`)

pub mod clip_task;
pub mod config;
pub mod encoding;
pub mod job;
pub mod stats;
pub mod timeline;

pub use clip_task::{ClipTask, ClipTaskState, ClipWindow, SourceType};
pub use config::{ConfigError, RenderClipConfig};
pub use encoding::EncodingConfig;
pub use job::{JobId, JobStatus, RenderJob};
pub use stats::{AggregateRenderMetrics, ClipStats};
pub use timeline::{Candidate, LyricLine, Timeline, TimelineError};
