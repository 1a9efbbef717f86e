//! Aggregate statistics written into a [`crate::RenderJob`] at termination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-job clip outcome tally, persisted alongside the job record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipStats {
    pub total_tasks: u32,
    pub success_tasks: u32,
    pub failed_tasks: u32,
    pub placeholder_tasks: u32,
    pub avg_task_duration_ms: f64,
    pub p95_task_duration_ms: f64,
    pub peak_parallelism: u32,
    pub generated_at: Option<DateTime<Utc>>,
}

impl ClipStats {
    /// Builds stats from the durations (ms) of every terminal clip task.
    /// `placeholder_tasks` is the subset of `failed_tasks` that fell through
    /// to a placeholder rather than failing outright (both count as
    /// `success` for `success_tasks` since the clip still has footage).
    pub fn from_durations(
        durations_ms: &[f64],
        success_tasks: u32,
        failed_tasks: u32,
        placeholder_tasks: u32,
        peak_parallelism: u32,
    ) -> Self {
        let total_tasks = success_tasks + failed_tasks;
        let avg_task_duration_ms = if durations_ms.is_empty() {
            0.0
        } else {
            durations_ms.iter().sum::<f64>() / durations_ms.len() as f64
        };
        let p95_task_duration_ms = percentile(durations_ms, 0.95);

        Self {
            total_tasks,
            success_tasks,
            failed_tasks,
            placeholder_tasks,
            avg_task_duration_ms,
            p95_task_duration_ms,
            peak_parallelism,
            generated_at: Some(Utc::now()),
        }
    }
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Alignment and timing metrics for the assembled output, written alongside
/// [`ClipStats`] into the job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRenderMetrics {
    pub line_count: u32,
    pub avg_delta_ms: f64,
    pub max_delta_ms: f64,
    pub total_duration_ms: i64,
    pub queued_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AggregateRenderMetrics {
    /// Builds the aggregate from the per-line alignment deltas (ms) between
    /// each produced clip's actual duration and its requested window.
    pub fn from_deltas(deltas_ms: &[f64], total_duration_ms: i64, queued_at: DateTime<Utc>) -> Self {
        let avg_delta_ms = if deltas_ms.is_empty() { 0.0 } else { deltas_ms.iter().sum::<f64>() / deltas_ms.len() as f64 };
        let max_delta_ms = deltas_ms.iter().cloned().fold(0.0_f64, f64::max);

        Self {
            line_count: deltas_ms.len() as u32,
            avg_delta_ms,
            max_delta_ms,
            total_duration_ms,
            queued_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_tally_is_consistent() {
        let stats = ClipStats::from_durations(&[100.0, 200.0, 300.0], 3, 0, 0, 3);
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.success_tasks + stats.failed_tasks, stats.total_tasks);
        assert_eq!(stats.avg_task_duration_ms, 200.0);
    }

    #[test]
    fn failed_at_least_placeholder() {
        let stats = ClipStats::from_durations(&[], 2, 1, 1, 2);
        assert!(stats.failed_tasks >= stats.placeholder_tasks);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 0.95), 0.0);
    }
}
