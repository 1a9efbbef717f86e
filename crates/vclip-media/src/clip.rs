//! Frame-accurate clip cutting.
//!
//! A single cut attempt: open the input, seek and trim on the *output* side,
//! re-encode, then verify the result actually has a video stream and lands
//! within tolerance of the requested duration. Deciding whether a failed
//! verification is worth retrying belongs to the caller (the fetch/cut
//! engine), not here — this module only ever performs one attempt.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use vclip_models::{ClipWindow, EncodingConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::verify_cut;
use crate::progress::FfmpegProgress;

/// Clips never deviate from the requested duration by more than this.
pub const DURATION_TOLERANCE_MS: i64 = 50;

/// Cuts `window` out of `input` into `output`, re-encoding to H.264/AAC, and
/// verifies the result. On verification failure the partial output file is
/// removed before the error is returned. Returns the probed actual duration
/// in milliseconds.
pub async fn cut_window<P, F>(
    input: P,
    output: P,
    window: &ClipWindow,
    encoding: &EncodingConfig,
    progress_callback: F,
) -> MediaResult<i64>
where
    P: AsRef<Path>,
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let input = input.as_ref();
    let output = output.as_ref();
    let start_secs = window.start_ms as f64 / 1000.0;
    let duration_secs = window.duration_ms() as f64 / 1000.0;

    debug!(
        input = %input.display(),
        output = %output.display(),
        start_secs,
        duration_secs,
        "cutting clip window"
    );

    let cmd = FfmpegCommand::new(input, output)
        .seek_output(start_secs)
        .duration_output(duration_secs)
        .video_codec(&encoding.codec)
        .preset(&encoding.preset)
        .crf(encoding.crf)
        .audio_codec(&encoding.audio_codec)
        .audio_bitrate(&encoding.audio_bitrate);

    FfmpegRunner::new().run_with_progress(&cmd, progress_callback).await?;

    match verify_cut(output, window.duration_ms(), DURATION_TOLERANCE_MS).await {
        Ok(actual_ms) => Ok(actual_ms),
        Err(e) => {
            warn!(output = %output.display(), error = %e, "cut verification failed, removing output");
            let _ = fs::remove_file(output).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_fifty_ms() {
        assert_eq!(DURATION_TOLERANCE_MS, 50);
    }
}
