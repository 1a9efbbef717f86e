//! The render job: one rendering attempt for one mix, from queued to terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{AggregateRenderMetrics, ClipStats};

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single rendering attempt for one mix.
///
/// Exclusively owned by one job driver invocation from `Queued` to a terminal
/// status; never mutated after reaching a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: JobId,
    pub mix_id: String,
    pub status: JobStatus,
    /// 0.0..=1.0
    pub progress: f32,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub output_asset_path: Option<String>,
    pub clip_stats: Option<ClipStats>,
    pub render_metrics: Option<AggregateRenderMetrics>,
}

impl RenderJob {
    pub fn new(mix_id: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            mix_id: mix_id.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_message: None,
            output_asset_path: None,
            clip_stats: None,
            render_metrics: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(
        &mut self,
        output_asset_path: impl Into<String>,
        clip_stats: ClipStats,
        render_metrics: AggregateRenderMetrics,
    ) {
        self.status = JobStatus::Success;
        self.progress = 1.0;
        self.finished_at = Some(Utc::now());
        self.output_asset_path = Some(output_asset_path.into());
        self.clip_stats = Some(clip_stats);
        self.render_metrics = Some(render_metrics);
    }

    pub fn fail(&mut self, error: impl Into<String>, clip_stats: Option<ClipStats>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error_message = Some(error.into());
        self.clip_stats = clip_stats;
    }

    pub fn with_progress(&mut self, progress: f32) {
        self.progress = progress.clamp(0.0, 1.0);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = RenderJob::new("mix-1");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = RenderJob::new("mix-1");
        job.start();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        let render_metrics = AggregateRenderMetrics::from_deltas(&[10.0, 20.0], 60_000, job.queued_at);
        job.succeed("out/mix-1.mp4", ClipStats::default(), render_metrics);
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.progress, 1.0);
        assert!(job.is_terminal());
        assert!(job.render_metrics.is_some());
    }

    #[test]
    fn test_job_failure() {
        let mut job = RenderJob::new("mix-1");
        job.start();
        job.fail("assembly-failed", None);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.is_terminal());
        assert_eq!(job.error_message.as_deref(), Some("assembly-failed"));
    }
}
