//! `.ass` subtitle generation from a locked timeline.

use std::path::Path;

use tokio::fs;
use vclip_models::Timeline;

use crate::error::WorkerResult;

const STYLE_HEADER: &str = r#"[Script Info]
ScriptType: v4.00+
PlayResX: 1080
PlayResY: 1920
WrapStyle: 0
ScaledBorderAndShadow: yes

[V4+ Styles]
Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding
Style: Default,Montserrat,64,&H00FFFFFF,&H000000FF,&H00000000,&H80000000,-1,0,0,0,100,100,0,0,1,3,1,2,60,60,120,1

[Events]
Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text
"#;

/// Renders `timeline`'s lines into an `.ass` file at `output_path`. Line
/// timestamps are relative to `timeline.vocal_start_ms` since assembly also
/// aligns the audio and concatenated video to that anchor.
pub async fn write_subtitle_file(timeline: &Timeline, output_path: &Path) -> WorkerResult<()> {
    let mut body = String::from(STYLE_HEADER);

    for line in &timeline.lines {
        let start = format_timestamp(line.start_ms - timeline.vocal_start_ms);
        let end = format_timestamp(line.end_ms - timeline.vocal_start_ms);
        let text = escape_ass_text(&line.text);
        body.push_str(&format!("Dialogue: 0,{start},{end},Default,,0,0,0,,{text}\n"));
    }

    fs::write(output_path, body).await?;
    Ok(())
}

/// `.ass` timestamps are `H:MM:SS.cc` (centiseconds), clamped at zero since
/// the first line can start exactly at the vocal onset.
fn format_timestamp(ms: i64) -> String {
    let ms = ms.max(0);
    let centis = (ms % 1000) / 10;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{hours}:{mins:02}:{secs:02}.{centis:02}")
}

fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\N").replace('{', "(").replace('}', ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sub_second_timestamp() {
        assert_eq!(format_timestamp(0), "0:00:00.00");
        assert_eq!(format_timestamp(1234), "0:00:01.23");
    }

    #[test]
    fn formats_hour_boundary() {
        assert_eq!(format_timestamp(3_661_000), "1:01:01.00");
    }

    #[test]
    fn negative_offsets_clamp_to_zero() {
        assert_eq!(format_timestamp(-500), "0:00:00.00");
    }

    #[test]
    fn escapes_braces_that_ass_would_treat_as_override_tags() {
        assert_eq!(escape_ass_text("{not a tag}"), "(not a tag)");
    }
}
