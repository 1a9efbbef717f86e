//! Redis Streams job queue for the render pipeline.
//!
//! This crate provides:
//! - Render-job enqueueing via Redis Streams, with consumer-group delivery,
//!   crash recovery (`claim_pending`) and a dead-letter stream
//! - Real-time progress events and job-status caching via Redis Pub/Sub
//! - A config hot-reload broadcast channel

pub mod config_channel;
pub mod error;
pub mod job;
pub mod progress;
pub mod queue;

pub use config_channel::ConfigChannel;
pub use error::{QueueError, QueueResult};
pub use job::RenderJobMessage;
pub use progress::{
    ProgressChannel, ProgressEvent, HEARTBEAT_TTL_SECS, JOB_STATUS_TTL_SECS, STALE_THRESHOLD_SECS,
};
pub use queue::{JobQueue, QueueConfig};
