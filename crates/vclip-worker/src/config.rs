//! Worker process configuration (distinct from `RenderClipConfig`, which is
//! the hot-reloadable per-job scheduling config held in `vclip-models`).

use std::time::Duration;

/// Process-level configuration: how many jobs this worker instance runs at
/// once, timeouts, and the crash-recovery sweep cadence.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent render jobs this worker instance drives.
    pub max_concurrent_jobs: usize,
    /// How long a job may go without any clip task finishing before the
    /// driver cancels it as stalled. There is no cap on total job duration,
    /// only on zero-progress stretches.
    pub stall_timeout: Duration,
    /// Grace period for in-flight clip tasks to finish during shutdown.
    pub shutdown_timeout: Duration,
    /// Root directory under which per-job temp directories are created.
    pub work_dir: String,
    /// How often the claim-pending sweep runs.
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message can be reclaimed from a
    /// dead consumer.
    pub claim_min_idle: Duration,
    /// How often a running job refreshes its message's visibility.
    pub job_heartbeat_interval: Duration,
    /// Port the Prometheus metrics exporter listens on.
    pub metrics_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            stall_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/vclip-render".to_string(),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            job_heartbeat_interval: Duration::from_secs(30),
            metrics_port: 9100,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            stall_timeout: Duration::from_secs(
                std::env::var("WORKER_STALL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or_else(|_| "/tmp/vclip-render".to_string()),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            job_heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_JOB_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(9100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.metrics_port, 9100);
    }
}
