#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for the render pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with output-side seeking
//! - Progress parsing from `-progress pipe:2`
//! - Frame-accurate clip cutting with post-cut verification
//! - Source-agnostic footage production (remote stream / local file / placeholder)

pub mod clip;
pub mod command;
pub mod core;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod progress;

pub use clip::{cut_window, DURATION_TOLERANCE_MS};
pub use command::{FfmpegCommand, FfmpegRunner};
pub use core::{produce, produce_placeholder, CircuitBreaker, CircuitState, ProcessingResult, ProduceInput};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use probe::{get_duration, probe_video, verify_cut, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
