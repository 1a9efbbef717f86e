//! The clip task: the scheduler's unit of work for one lyric line.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Where a clip's footage is coming from. A tagged variant rather than trait
/// objects: all three shapes share one `produce(target_path, window)` contract
/// and none of them need independent identity or upcasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceType {
    /// Cut from a streaming URL resolved through the external retrieve API.
    RemoteStream { source_video_id: String },
    /// Cut from a pre-downloaded file under `media/video/<source_video_id>.*`.
    LocalFile { path: PathBuf },
    /// Re-timed copy of the placeholder asset.
    Placeholder,
}

impl SourceType {
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::RemoteStream { .. } => "remote-stream",
            SourceType::LocalFile { .. } => "local-file",
            SourceType::Placeholder => "placeholder",
        }
    }
}

/// Terminal and non-terminal states of a [`ClipTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipTaskState {
    Pending,
    Running,
    Success,
    FallbackLocal,
    FallbackPlaceholder,
    Failed,
}

impl ClipTaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClipTaskState::Pending | ClipTaskState::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ClipTaskState::Success | ClipTaskState::FallbackLocal | ClipTaskState::FallbackPlaceholder
        )
    }
}

/// A requested output window: `[start_ms, end_ms)` relative to the source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClipWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl ClipWindow {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Runtime-only unit of work; never persisted directly (its terminal outcome
/// is folded into the job's [`crate::ClipStats`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipTask {
    pub clip_task_id: String,
    pub line_id: u32,
    pub current_candidate_index: usize,
    pub attempt_count: u32,
    pub state: ClipTaskState,
    pub source_type: SourceType,
    pub window: ClipWindow,
    pub target_path: PathBuf,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
    pub error_code: Option<String>,
}

impl ClipTask {
    pub fn new(line_id: u32, window: ClipWindow, source_type: SourceType, target_path: PathBuf) -> Self {
        Self {
            clip_task_id: Uuid::new_v4().to_string(),
            line_id,
            current_candidate_index: 0,
            attempt_count: 0,
            state: ClipTaskState::Pending,
            source_type,
            window,
            target_path,
            started_at_ms: None,
            finished_at_ms: None,
            error_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_states_count_as_success() {
        assert!(ClipTaskState::Success.is_success());
        assert!(ClipTaskState::FallbackLocal.is_success());
        assert!(ClipTaskState::FallbackPlaceholder.is_success());
        assert!(!ClipTaskState::Failed.is_success());
    }

    #[test]
    fn terminal_states() {
        assert!(!ClipTaskState::Pending.is_terminal());
        assert!(!ClipTaskState::Running.is_terminal());
        assert!(ClipTaskState::Failed.is_terminal());
    }

    #[test]
    fn source_type_label() {
        assert_eq!(SourceType::Placeholder.label(), "placeholder");
        assert_eq!(
            SourceType::RemoteStream { source_video_id: "v1".into() }.label(),
            "remote-stream"
        );
    }
}
