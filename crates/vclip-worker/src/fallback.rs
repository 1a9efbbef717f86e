//! Candidate fallback state machine for one clip task.
//!
//! Walks a lyric line's ranked candidates in order. A candidate that fails
//! its retry budget advances the index rather than the task; only when
//! every candidate is exhausted does the task fall through to a local file
//! lookup, and only when that also fails does it fall through to the
//! placeholder asset.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use vclip_media::produce_placeholder;
use vclip_models::{Candidate, ClipWindow, EncodingConfig, LyricLine};

use crate::error::{WorkerError, WorkerResult};
use crate::fetch_cut::fetch_and_cut;
use crate::rate_limiter::RetrieveRateLimiter;
use crate::retrieve_client::RetrieveClient;
use crate::scheduler::VideoSlotLimiter;
use crate::stream_cache::StreamUrlCache;

/// Where a clip task's footage ultimately came from, after the fallback
/// chain has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    Candidate,
    LocalFile,
    Placeholder,
}

pub struct FallbackContext<'a> {
    pub cache: &'a StreamUrlCache,
    pub rate_limiter: &'a RetrieveRateLimiter,
    pub retrieve: &'a RetrieveClient,
    pub video_slots: &'a VideoSlotLimiter,
    pub media_root: &'a Path,
    pub placeholder_asset_path: &'a Path,
    pub encoding: &'a EncodingConfig,
    pub retry_backoff_base_ms: u64,
    pub max_retry: u32,
    /// Identifies this clip task in every log line emitted while resolving
    /// it, so a log aggregator can correlate candidate attempts, fallback
    /// transitions, and the terminal `log_clip_task` record.
    pub clip_task_id: &'a str,
}

/// Result of running the fallback chain for one clip task.
pub struct LineOutcome {
    pub outcome: FallbackOutcome,
    pub candidate_index: Option<usize>,
    /// Source video this outcome is attributable to, for observability;
    /// `None` only for a placeholder on a line with no candidates at all.
    pub video_id: Option<String>,
    pub duration_ms: i64,
    pub attempts: u32,
    /// Number of clip tasks in flight (including this one) at the moment
    /// this task was admitted past the global semaphore. Filled in by
    /// [`crate::scheduler::ClipScheduler::run_line`], not by this module.
    pub parallel_slot: u32,
}

/// Runs the full fallback chain for one line: every ranked candidate, then
/// local file, then placeholder.
pub async fn resolve_line(ctx: &FallbackContext<'_>, line: &LyricLine, target_path: &Path) -> WorkerResult<LineOutcome> {
    let window = ClipWindow { start_ms: line.start_ms, end_ms: line.end_ms };

    for (index, candidate) in line.candidates.iter().enumerate() {
        match try_candidate(ctx, candidate, &window, target_path).await {
            Ok((duration_ms, attempts)) => {
                return Ok(LineOutcome {
                    outcome: FallbackOutcome::Candidate,
                    candidate_index: Some(index),
                    video_id: Some(candidate.source_video_id.clone()),
                    duration_ms,
                    attempts,
                    parallel_slot: 0,
                });
            }
            Err(e) => {
                warn!(
                    clip_task_id = ctx.clip_task_id,
                    line_id = line.line_id,
                    candidate_index = index,
                    source_video_id = %candidate.source_video_id,
                    error = %e,
                    "candidate exhausted, advancing fallback state machine"
                );
            }
        }
    }

    match try_local_file(ctx, line, &window, target_path).await {
        Ok(duration_ms) => {
            return Ok(LineOutcome {
                outcome: FallbackOutcome::LocalFile,
                candidate_index: None,
                video_id: line.candidates.first().map(|c| c.source_video_id.clone()),
                duration_ms,
                attempts: 1,
                parallel_slot: 0,
            });
        }
        Err(e) => {
            info!(clip_task_id = ctx.clip_task_id, line_id = line.line_id, error = %e, "local file fallback unavailable, using placeholder");
        }
    }

    let duration_ms = try_placeholder(ctx, &window, target_path).await?;
    Ok(LineOutcome {
        outcome: FallbackOutcome::Placeholder,
        candidate_index: None,
        video_id: line.candidates.first().map(|c| c.source_video_id.clone()),
        duration_ms,
        attempts: 1,
        parallel_slot: 0,
    })
}

/// Runs one candidate through the fetch/cut engine's own retry schedule
/// (exponential backoff up to `max_retry` attempts, handled inside
/// `fetch_and_cut`). Once that budget is exhausted the candidate is
/// considered failed and this line moves to the next one, since the ranked
/// list moving on is cheaper than hammering a struggling source forever.
///
/// Holds a per-source-video slot for the duration of the attempt, so two
/// candidates (from this line or another) that name the same source video
/// never exceed the configured per-video concurrency.
async fn try_candidate(
    ctx: &FallbackContext<'_>,
    candidate: &Candidate,
    window: &ClipWindow,
    target_path: &Path,
) -> WorkerResult<(i64, u32)> {
    let _video_slot = ctx.video_slots.acquire(&candidate.source_video_id).await;

    let (result, attempts) = fetch_and_cut(
        &candidate.source_video_id,
        ctx.cache,
        ctx.rate_limiter,
        ctx.retrieve,
        target_path,
        window,
        ctx.encoding,
        ctx.retry_backoff_base_ms,
        ctx.max_retry,
    )
    .await?;
    Ok((result.duration_ms, attempts))
}

/// Looks for a pre-downloaded file under `media/video/<source_video_id>.*`
/// for any candidate this line named, preferring the highest-ranked one
/// that actually exists on disk.
async fn try_local_file(
    ctx: &FallbackContext<'_>,
    line: &LyricLine,
    window: &ClipWindow,
    target_path: &Path,
) -> WorkerResult<i64> {
    let local_path = find_local_file(ctx.media_root, line)
        .await
        .ok_or_else(|| WorkerError::FallbackLocalMissing("no local fallback file for any candidate".to_string()))?;

    let result = vclip_media::produce(
        &vclip_media::ProduceInput::LocalFile(local_path),
        target_path,
        window,
        ctx.encoding,
        |_p| {},
    )
    .await
    .map_err(|e| WorkerError::FallbackLocalMissing(e.to_string()))?;

    Ok(result.duration_ms)
}

async fn find_local_file(media_root: &Path, line: &LyricLine) -> Option<PathBuf> {
    const EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];

    for candidate in &line.candidates {
        for ext in EXTENSIONS {
            let path = media_root.join("video").join(format!("{}.{}", candidate.source_video_id, ext));
            if tokio::fs::metadata(&path).await.is_ok() {
                return Some(path);
            }
        }
    }
    None
}

/// Re-times the placeholder asset to this line's window. Failure here is
/// fatal to the clip task: there is nowhere left to fall back to.
async fn try_placeholder(ctx: &FallbackContext<'_>, window: &ClipWindow, target_path: &Path) -> WorkerResult<i64> {
    let result = produce_placeholder(ctx.placeholder_asset_path, target_path, window, ctx.encoding, |_p| {})
        .await
        .map_err(|e| WorkerError::FallbackPlaceholderFailed(e.to_string()))?;
    Ok(result.duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_variants_are_distinct() {
        assert_ne!(FallbackOutcome::Candidate, FallbackOutcome::LocalFile);
        assert_ne!(FallbackOutcome::LocalFile, FallbackOutcome::Placeholder);
    }
}
