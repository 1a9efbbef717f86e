//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid timestamp format: {0}")]
    InvalidTimestamp(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Produced file contains no video stream: {0}")]
    NoVideoStream(PathBuf),

    #[error("Cut duration {actual_ms}ms deviates from requested {requested_ms}ms by more than {tolerance_ms}ms")]
    DurationOutOfTolerance {
        requested_ms: i64,
        actual_ms: i64,
        tolerance_ms: i64,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::FfprobeFailed {
            message: message.into(),
            stderr,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a retry of the same cut is worth attempting (verification
    /// failures get exactly one retry per the fetch/cut engine's contract).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::NoVideoStream(_)
                | MediaError::DurationOutOfTolerance { .. }
                | MediaError::Io(_)
                | MediaError::Timeout(_)
        )
    }
}
