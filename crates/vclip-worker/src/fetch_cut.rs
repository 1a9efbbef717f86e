//! Fetch/cut engine: resolve a candidate's stream URL and cut its window.
//!
//! One call here is one attempt against one candidate. Retryable failures
//! (network I/O, rate-limited, 5xx, verification failures) get a same-
//! candidate exponential-backoff retry loop up to `max_retry` attempts;
//! permanent failures (4xx, malformed request) surface immediately so the
//! fallback state machine can advance to the next candidate.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use vclip_media::{produce, MediaError, ProduceInput};
use vclip_models::{ClipWindow, EncodingConfig};

use crate::error::{WorkerError, WorkerResult};
use crate::rate_limiter::RetrieveRateLimiter;
use crate::retrieve_client::RetrieveClient;
use crate::stream_cache::StreamUrlCache;

/// Resolves `source_video_id`'s stream URL, using the per-job cache and
/// falling back to the retrieve service (rate-limited) on a miss. Returns
/// whether the URL came from the cache, so a caller that later finds the
/// URL stale knows whether evicting it is worthwhile.
pub async fn resolve_stream_url(
    source_video_id: &str,
    cache: &StreamUrlCache,
    rate_limiter: &RetrieveRateLimiter,
    retrieve: &RetrieveClient,
) -> WorkerResult<(String, bool)> {
    if let Some(url) = cache.get(source_video_id).await {
        return Ok((url, true));
    }

    rate_limiter.acquire().await;
    let url = retrieve.resolve(source_video_id).await?;
    cache.put(source_video_id, url.clone()).await;
    Ok((url, false))
}

/// Cuts one candidate's window into `target_path`, retrying in place with
/// exponential backoff (`retry_backoff_base_ms * 2^attempt`) up to
/// `max_retry` times for retryable failures, per the fetch/cut engine's
/// retry schedule. A cached stream URL that turns out to be stale (a
/// permanent failure on first use) is evicted so the next candidate
/// referencing this source video re-resolves instead of reusing it.
pub async fn fetch_and_cut(
    source_video_id: &str,
    cache: &StreamUrlCache,
    rate_limiter: &RetrieveRateLimiter,
    retrieve: &RetrieveClient,
    target_path: &Path,
    window: &ClipWindow,
    encoding: &EncodingConfig,
    retry_backoff_base_ms: u64,
    max_retry: u32,
) -> WorkerResult<(vclip_media::ProcessingResult, u32)> {
    let (url, from_cache) = resolve_stream_url(source_video_id, cache, rate_limiter, retrieve).await?;

    let attempt = |url: String| {
        let target_path = target_path.to_path_buf();
        let window = window.clone();
        let encoding = encoding.clone();
        async move { produce(&ProduceInput::RemoteUrl(url), &target_path, &window, &encoding, |_p| {}).await }
    };

    let mut attempt_num: u32 = 0;
    loop {
        match attempt(url.clone()).await {
            Ok(result) => return Ok((result, attempt_num + 1)),
            Err(e) => {
                let worker_err = classify_media_error(e);
                if !worker_err.is_retryable() {
                    if from_cache {
                        cache.invalidate(source_video_id).await;
                    }
                    return Err(worker_err);
                }
                if attempt_num >= max_retry {
                    warn!(source_video_id, attempts = attempt_num + 1, error = %worker_err, "retry budget exhausted");
                    return Err(worker_err);
                }
                let backoff_ms = retry_backoff_base_ms * 2u64.pow(attempt_num);
                warn!(source_video_id, attempt = attempt_num + 1, backoff_ms, error = %worker_err, "retrying candidate after backoff");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt_num += 1;
            }
        }
    }
}

fn classify_media_error(e: MediaError) -> WorkerError {
    if e.is_retryable() {
        debug!(error = %e, "classifying media error as retryable");
        WorkerError::candidate_retryable(e.to_string())
    } else {
        WorkerError::candidate_permanent(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failures_classify_as_retryable() {
        assert!(classify_media_error(MediaError::NoVideoStream("x.mp4".into())).is_retryable());
        assert!(classify_media_error(MediaError::DurationOutOfTolerance {
            requested_ms: 1000,
            actual_ms: 1200,
            tolerance_ms: 50,
        })
        .is_retryable());
    }

    #[test]
    fn ffprobe_not_found_classifies_as_permanent() {
        assert!(!classify_media_error(MediaError::FfprobeNotFound).is_retryable());
    }
}
