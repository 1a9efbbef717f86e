//! The locked timeline: one lyric line per entry, each carrying its ranked
//! candidate video segments. Produced upstream (transcription + semantic
//! video matching); consumed read-only by the render pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A reference to a time window in an external source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub source_video_id: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl Candidate {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// One lyric line, ordered by `line_id` within the job's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricLine {
    pub line_id: u32,
    pub text: String,
    /// Timeline-relative; first vocal onset is 0.
    pub start_ms: i64,
    pub end_ms: i64,
    /// Ranked, highest score first. May be empty.
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("line {line_id}: start_ms ({start_ms}) must be < end_ms ({end_ms})")]
    NonMonotonic { line_id: u32, start_ms: i64, end_ms: i64 },
    #[error("line {line_id}: duration {duration_ms}ms is below the 500ms minimum")]
    TooShort { line_id: u32, duration_ms: i64 },
    #[error("line {line_id} overlaps the preceding line (starts at {start_ms}, prior ends at {prev_end_ms})")]
    Overlapping { line_id: u32, start_ms: i64, prev_end_ms: i64 },
}

impl LyricLine {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// The locked timeline for one render job: an ordered, validated set of lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub lines: Vec<LyricLine>,
    /// Offset (ms) of the first vocal onset; assembly aligns audio/subtitles to this.
    pub vocal_start_ms: i64,
}

const MIN_LINE_DURATION_MS: i64 = 500;

impl Timeline {
    /// Validates the invariants in the data model: `start_ms < end_ms`, a
    /// minimum 500ms duration, and non-overlapping, timeline-ordered lines.
    pub fn validate(&self) -> Result<(), TimelineError> {
        let mut prev_end: Option<i64> = None;
        for line in &self.lines {
            if line.start_ms >= line.end_ms {
                return Err(TimelineError::NonMonotonic {
                    line_id: line.line_id,
                    start_ms: line.start_ms,
                    end_ms: line.end_ms,
                });
            }
            let duration = line.duration_ms();
            if duration < MIN_LINE_DURATION_MS {
                return Err(TimelineError::TooShort {
                    line_id: line.line_id,
                    duration_ms: duration,
                });
            }
            if let Some(prev_end_ms) = prev_end {
                if line.start_ms < prev_end_ms {
                    return Err(TimelineError::Overlapping {
                        line_id: line.line_id,
                        start_ms: line.start_ms,
                        prev_end_ms,
                    });
                }
            }
            prev_end = Some(line.end_ms);
        }
        Ok(())
    }

    pub fn total_duration_ms(&self) -> i64 {
        self.lines.last().map(|l| l.end_ms).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: u32, start_ms: i64, end_ms: i64) -> LyricLine {
        LyricLine { line_id: id, text: format!("line {id}"), start_ms, end_ms, candidates: vec![] }
    }

    #[test]
    fn accepts_well_formed_timeline() {
        let tl = Timeline { lines: vec![line(0, 0, 1000), line(1, 1000, 2500)], vocal_start_ms: 0 };
        assert!(tl.validate().is_ok());
        assert_eq!(tl.total_duration_ms(), 2500);
    }

    #[test]
    fn rejects_non_monotonic_line() {
        let tl = Timeline { lines: vec![line(0, 1000, 900)], vocal_start_ms: 0 };
        assert!(matches!(tl.validate(), Err(TimelineError::NonMonotonic { .. })));
    }

    #[test]
    fn rejects_too_short_line() {
        let tl = Timeline { lines: vec![line(0, 0, 200)], vocal_start_ms: 0 };
        assert!(matches!(tl.validate(), Err(TimelineError::TooShort { .. })));
    }

    #[test]
    fn rejects_overlapping_lines() {
        let tl = Timeline { lines: vec![line(0, 0, 1000), line(1, 500, 1500)], vocal_start_ms: 0 };
        assert!(matches!(tl.validate(), Err(TimelineError::Overlapping { .. })));
    }
}
