#![deny(unreachable_patterns)]
//! Karaoke clip render worker.
//!
//! Consumes render jobs off the queue, resolves each lyric line's clip
//! through the candidate fallback state machine under bounded concurrency,
//! then assembles the final output with subtitles burned in and the mixed
//! vocal track muxed over it.

pub mod assembly;
pub mod config;
pub mod config_watcher;
pub mod error;
pub mod fallback;
pub mod fetch_cut;
pub mod job_driver;
pub mod job_store;
pub mod logging;
pub mod observability;
pub mod rate_limiter;
pub mod retrieve_client;
pub mod retry;
pub mod scheduler;
pub mod stream_cache;
pub mod subtitle;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use fallback::{FallbackContext, FallbackOutcome, LineOutcome};
pub use job_driver::JobDriver;
pub use job_store::JobStore;
pub use logging::{JobLogger, JobSpan};
pub use rate_limiter::RetrieveRateLimiter;
pub use retrieve_client::RetrieveClient;
pub use scheduler::{ClipScheduler, VideoSlotLimiter};
pub use stream_cache::StreamUrlCache;
