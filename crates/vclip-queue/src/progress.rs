//! Job progress and status via Redis Pub/Sub and caching.
//!
//! This module provides:
//! - Real-time progress events via Redis Pub/Sub
//! - Worker heartbeat tracking for stale job detection
//! - Job status caching for fast polling (the API layer reads this instead
//!   of querying the queue directly)

use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vclip_models::{JobId, RenderJob};

use crate::error::QueueResult;

/// Prefix for worker heartbeat keys: `heartbeat:{job_id}`
const HEARTBEAT_KEY_PREFIX: &str = "heartbeat:";

/// Prefix for job status cache: `job:status:{job_id}`
const JOB_STATUS_PREFIX: &str = "job:status:";

/// Prefix for active jobs set: `jobs:active`
const ACTIVE_JOBS_KEY: &str = "jobs:active";

/// Heartbeat TTL - job considered dead after this duration without heartbeat (seconds)
pub const HEARTBEAT_TTL_SECS: u64 = 60;

/// Job status cache TTL (seconds)
pub const JOB_STATUS_TTL_SECS: u64 = 86400; // 24 hours

/// Stale threshold - no heartbeat for this long means stale (seconds)
pub const STALE_THRESHOLD_SECS: i64 = 60;

/// A progress notification for one render job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub line_id: Option<String>,
    pub message: String,
    #[serde(default = "default_timestamp")]
    pub timestamp_ms: i64,
}

fn default_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}

impl ProgressEvent {
    pub fn new(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            job_id,
            line_id: None,
            message: message.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn for_line(mut self, line_id: impl Into<String>) -> Self {
        self.line_id = Some(line_id.into());
        self
    }
}

/// Channel for publishing/subscribing to progress events and caching job status.
#[derive(Clone)]
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn channel_name(job_id: &JobId) -> String {
        format!("render:progress:{}", job_id)
    }

    /// Publish a progress event for real-time delivery to connected clients.
    pub async fn publish(&self, event: &ProgressEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!("publishing progress event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    /// Subscribe to progress events for a job.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = ProgressEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(job_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }

    // ========================================================================
    // Heartbeat Methods
    // ========================================================================

    /// Update worker heartbeat for a job. Workers call this periodically
    /// while driving the job; a missed heartbeat window marks it stale for
    /// the crash-recovery sweep.
    pub async fn heartbeat(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", HEARTBEAT_KEY_PREFIX, job_id);
        let now = Utc::now().timestamp();

        conn.set_ex::<_, _, ()>(&key, now, HEARTBEAT_TTL_SECS).await?;
        debug!("updated heartbeat for job {}", job_id);

        Ok(())
    }

    pub async fn is_alive(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", HEARTBEAT_KEY_PREFIX, job_id);
        let exists: bool = conn.exists(&key).await?;
        Ok(exists)
    }

    pub async fn clear_heartbeat(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", HEARTBEAT_KEY_PREFIX, job_id);
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }

    // ========================================================================
    // Job Status Cache Methods
    // ========================================================================

    /// Persist the current state of a render job for fast polling.
    pub async fn update_job_status(&self, job: &RenderJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", JOB_STATUS_PREFIX, job.id);
        let payload = serde_json::to_string(job)?;

        conn.set_ex::<_, _, ()>(&key, payload, JOB_STATUS_TTL_SECS).await?;

        if job.is_terminal() {
            self.remove_from_active_jobs(&job.id).await?;
            self.clear_heartbeat(&job.id).await?;
        } else {
            self.add_to_active_jobs(&job.id).await?;
        }

        Ok(())
    }

    pub async fn get_job_status(&self, job_id: &JobId) -> QueueResult<Option<RenderJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("{}{}", JOB_STATUS_PREFIX, job_id);

        let value: Option<String> = conn.get(&key).await?;
        Ok(value.and_then(|s| serde_json::from_str(&s).ok()))
    }

    // ========================================================================
    // Active Jobs Tracking
    // ========================================================================

    async fn add_to_active_jobs(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let score = Utc::now().timestamp_millis() as f64;
        conn.zadd::<_, _, _, ()>(ACTIVE_JOBS_KEY, job_id.to_string(), score).await?;
        Ok(())
    }

    async fn remove_from_active_jobs(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.zrem::<_, _, ()>(ACTIVE_JOBS_KEY, job_id.to_string()).await?;
        Ok(())
    }

    /// All jobs considered active, for the stale-job sweep.
    pub async fn get_active_jobs(&self) -> QueueResult<Vec<RenderJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job_ids: Vec<String> = conn.zrange(ACTIVE_JOBS_KEY, 0, -1).await?;

        let mut jobs = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            if let Some(job) = self.get_job_status(&JobId::from_string(job_id)).await? {
                jobs.push(job);
            }
        }

        Ok(jobs)
    }

    /// Remove stale entries (jobs whose status cache has expired) from the
    /// active-jobs set.
    pub async fn cleanup_active_jobs(&self) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job_ids: Vec<String> = conn.zrange(ACTIVE_JOBS_KEY, 0, -1).await?;

        let mut removed = 0u32;
        for job_id in job_ids {
            let key = format!("{}{}", JOB_STATUS_PREFIX, job_id);
            let exists: bool = conn.exists(&key).await?;
            if !exists {
                conn.zrem::<_, _, ()>(ACTIVE_JOBS_KEY, &job_id).await?;
                removed += 1;
                warn!("cleaned up orphaned active job: {}", job_id);
            }
        }

        Ok(removed)
    }
}
