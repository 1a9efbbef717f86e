//! Core domain types for producing one clip's footage.
//!
//! A clip's footage can come from three places — a remote stream, a local
//! file, or the placeholder asset. Those three only ever differ in how the
//! input is located, not in what happens to it afterward, so they are
//! modeled as a tagged input rather than one trait implementation per
//! source: a single `produce` function matches on the input and always ends
//! at the same cut-and-verify step in [`crate::clip`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use vclip_models::{ClipWindow, EncodingConfig};

use crate::clip::cut_window;
use crate::error::MediaResult;
use crate::progress::FfmpegProgress;

pub mod infrastructure;

pub use infrastructure::{CircuitBreaker, CircuitState};

/// Where the footage for one `produce` call comes from.
#[derive(Debug, Clone)]
pub enum ProduceInput {
    /// A streaming URL already resolved by the caller (FFmpeg reads directly
    /// from it; nothing is downloaded to disk first).
    RemoteUrl(String),
    /// A file already on local disk (the fallback-local lookup result).
    LocalFile(PathBuf),
}

impl ProduceInput {
    fn as_ffmpeg_input(&self) -> &str {
        match self {
            ProduceInput::RemoteUrl(url) => url,
            ProduceInput::LocalFile(path) => path.to_str().expect("non-utf8 local media path"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProduceInput::RemoteUrl(_) => "remote-stream",
            ProduceInput::LocalFile(_) => "local-file",
        }
    }
}

/// Outcome of a successful `produce` call.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub output_path: PathBuf,
    pub duration_ms: i64,
    pub file_size_bytes: u64,
    pub processing_time_ms: u64,
}

/// Cuts `window` out of `input` into `target_path`, re-encoding per
/// `encoding`, regardless of whether the input is a remote URL or a local
/// file — FFmpeg treats both as an `-i` argument.
pub async fn produce<F>(
    input: &ProduceInput,
    target_path: &Path,
    window: &ClipWindow,
    encoding: &EncodingConfig,
    progress_callback: F,
) -> MediaResult<ProcessingResult>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let started = Instant::now();
    let duration_ms = cut_window(
        input.as_ffmpeg_input(),
        target_path.to_str().expect("non-utf8 target path"),
        window,
        encoding,
        progress_callback,
    )
    .await?;

    let file_size_bytes = tokio::fs::metadata(target_path).await.map(|m| m.len()).unwrap_or(0);

    Ok(ProcessingResult {
        output_path: target_path.to_path_buf(),
        duration_ms,
        file_size_bytes,
        processing_time_ms: started.elapsed().as_millis() as u64,
    })
}

/// Re-times the placeholder asset to `window`'s duration: the asset is
/// shorter than almost every requested window, so it is looped
/// (`-stream_loop -1`) and then trimmed on the output side to the exact
/// duration, the same way any other cut is verified.
pub async fn produce_placeholder<F>(
    placeholder_asset_path: &Path,
    target_path: &Path,
    window: &ClipWindow,
    encoding: &EncodingConfig,
    progress_callback: F,
) -> MediaResult<ProcessingResult>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let started = Instant::now();
    let input = placeholder_asset_path.to_str().expect("non-utf8 placeholder path");
    let output = target_path.to_str().expect("non-utf8 target path");
    let duration_secs = window.duration_ms() as f64 / 1000.0;

    let cmd = crate::command::FfmpegCommand::new(input, output)
        .input_arg("-stream_loop")
        .input_arg("-1")
        .duration_output(duration_secs)
        .video_codec(&encoding.codec)
        .preset(&encoding.preset)
        .crf(encoding.crf)
        .audio_codec(&encoding.audio_codec)
        .audio_bitrate(&encoding.audio_bitrate);

    crate::command::FfmpegRunner::new()
        .run_with_progress(&cmd, progress_callback)
        .await?;

    let duration_ms =
        crate::probe::verify_cut(target_path, window.duration_ms(), crate::clip::DURATION_TOLERANCE_MS).await?;

    let file_size_bytes = tokio::fs::metadata(target_path).await.map(|m| m.len()).unwrap_or(0);

    Ok(ProcessingResult {
        output_path: target_path.to_path_buf(),
        duration_ms,
        file_size_bytes,
        processing_time_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_labels_match_source_type_naming() {
        assert_eq!(ProduceInput::RemoteUrl("http://x".into()).label(), "remote-stream");
        assert_eq!(ProduceInput::LocalFile("a.mp4".into()).label(), "local-file");
    }
}
