//! Final assembly: concatenate per-line clips, burn in subtitles, mux the
//! mixed audio track, and verify the overall duration.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use vclip_media::{get_duration, move_file, FfmpegCommand, FfmpegRunner};
use vclip_models::Timeline;

use crate::error::{WorkerError, WorkerResult};
use crate::subtitle::write_subtitle_file;

/// Final output duration tolerance against the sum of line durations.
const ASSEMBLY_DURATION_TOLERANCE_MS: i64 = 200;

/// Assembles the final rendered video at `job_output_path` from one clip
/// file per timeline line (in line order), the mixed audio asset, and the
/// timeline's subtitle text. Fails the job on any step.
pub async fn assemble(
    timeline: &Timeline,
    clip_paths: &[PathBuf],
    mixed_audio_path: &Path,
    job_temp_dir: &Path,
    job_output_path: &Path,
) -> WorkerResult<()> {
    if clip_paths.len() != timeline.lines.len() {
        return Err(WorkerError::assembly_failed(format!(
            "expected {} clip paths, got {}",
            timeline.lines.len(),
            clip_paths.len()
        )));
    }

    let concat_list_path = job_temp_dir.join("concat.txt");
    write_concat_list(clip_paths, &concat_list_path).await?;

    let concatenated_path = job_temp_dir.join("concatenated.mp4");
    concat_clips(&concat_list_path, &concatenated_path).await?;

    let subtitle_path = job_temp_dir.join("subtitles.ass");
    write_subtitle_file(timeline, &subtitle_path)
        .await
        .map_err(|e| WorkerError::assembly_failed(format!("subtitle generation failed: {e}")))?;

    let muxed_path = job_temp_dir.join("muxed.mp4");
    burn_subtitles_and_mux_audio(&concatenated_path, &subtitle_path, mixed_audio_path, timeline.vocal_start_ms, &muxed_path)
        .await?;

    verify_final_duration(&muxed_path, timeline).await?;

    move_file(&muxed_path, job_output_path)
        .await
        .map_err(|e| WorkerError::assembly_failed(format!("failed to move output into place: {e}")))?;

    info!(output = %job_output_path.display(), "assembly complete");
    Ok(())
}

async fn write_concat_list(clip_paths: &[PathBuf], concat_list_path: &Path) -> WorkerResult<()> {
    let mut body = String::new();
    for path in clip_paths {
        let absolute = path.canonicalize().map_err(|e| {
            WorkerError::assembly_failed(format!("clip path {} does not exist: {e}", path.display()))
        })?;
        body.push_str(&format!("file '{}'\n", absolute.display()));
    }
    fs::write(concat_list_path, body).await?;
    Ok(())
}

/// Concatenates clips with the `concat` demuxer and a stream copy is not
/// used here (clips may carry slightly different encoder state across
/// re-encodes), so this re-encodes once more to guarantee a clean, uniform
/// output stream.
async fn concat_clips(concat_list_path: &Path, output_path: &Path) -> WorkerResult<()> {
    let cmd = FfmpegCommand::new(concat_list_path, output_path)
        .input_arg("-f")
        .input_arg("concat")
        .input_arg("-safe")
        .input_arg("0")
        .video_codec("libx264")
        .preset("fast")
        .crf(20)
        .audio_codec("aac");

    FfmpegRunner::new()
        .run(&cmd)
        .await
        .map_err(|e| WorkerError::assembly_failed(format!("concat failed: {e}")))
}

/// Burns the subtitle track in and muxes the mixed audio over the
/// concatenated video, trimmed to the vocal-onset anchor.
async fn burn_subtitles_and_mux_audio(
    concatenated_path: &Path,
    subtitle_path: &Path,
    mixed_audio_path: &Path,
    vocal_start_ms: i64,
    output_path: &Path,
) -> WorkerResult<()> {
    let audio_offset_secs = vocal_start_ms as f64 / 1000.0;
    let subtitle_filter = format!("ass={}", escape_filter_path(subtitle_path));

    // `FfmpegCommand::new`'s own input (concatenated_path) is emitted after
    // the input_args below, so input 0 is the mixed audio file (added here
    // via the extra `-i`) and input 1 is the concatenated video — the maps
    // below must match that order, not source intent.
    let cmd = FfmpegCommand::new(concatenated_path, output_path)
        .input_arg("-ss")
        .input_arg(format!("{audio_offset_secs:.3}"))
        .input_arg("-i")
        .input_arg(mixed_audio_path.to_string_lossy().to_string())
        .output_arg("-map")
        .output_arg("1:v:0")
        .output_arg("-map")
        .output_arg("0:a:0")
        .video_filter(subtitle_filter)
        .video_codec("libx264")
        .preset("fast")
        .crf(20)
        .audio_codec("aac")
        .output_arg("-shortest");

    FfmpegRunner::new()
        .run(&cmd)
        .await
        .map_err(|e| WorkerError::assembly_failed(format!("subtitle burn-in/audio mux failed: {e}")))
}

fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\").replace(':', "\\:")
}

async fn verify_final_duration(output_path: &Path, timeline: &Timeline) -> WorkerResult<()> {
    let expected_ms: i64 = timeline.lines.iter().map(|l| l.duration_ms()).sum();
    let actual_secs = get_duration(output_path)
        .await
        .map_err(|e| WorkerError::assembly_failed(format!("failed to probe final output: {e}")))?;
    let actual_ms = (actual_secs * 1000.0).round() as i64;

    debug!(expected_ms, actual_ms, "verifying final assembly duration");

    if (actual_ms - expected_ms).abs() > ASSEMBLY_DURATION_TOLERANCE_MS {
        return Err(WorkerError::assembly_failed(format!(
            "final duration {actual_ms}ms deviates from expected {expected_ms}ms by more than {ASSEMBLY_DURATION_TOLERANCE_MS}ms"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_path_escapes_colons_for_ffmpeg_filtergraph_syntax() {
        assert_eq!(escape_filter_path(Path::new("/tmp/job:1/subs.ass")), "/tmp/job\\:1/subs.ass");
    }

    #[test]
    fn mux_maps_match_the_actual_input_order() {
        // `FfmpegCommand::new`'s own input is always emitted after any
        // `input_arg("-i")` pair, so the mixed audio file (pushed via
        // input_arg) lands at input 0 and the concatenated video at input 1.
        let cmd = FfmpegCommand::new("concatenated.mp4", "muxed.mp4")
            .input_arg("-ss")
            .input_arg("1.250")
            .input_arg("-i")
            .input_arg("mixed.wav")
            .output_arg("-map")
            .output_arg("1:v:0")
            .output_arg("-map")
            .output_arg("0:a:0");
        let args = cmd.build_args();
        let i_positions: Vec<usize> = args.iter().enumerate().filter(|(_, a)| *a == "-i").map(|(i, _)| i).collect();
        assert_eq!(args[i_positions[0] + 1], "mixed.wav");
        assert_eq!(args[i_positions[1] + 1], "concatenated.mp4");
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "1:v:0"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a:0"));
    }
}
