//! Queue message type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vclip_models::JobId;

/// Message placed on the render stream: a render-job identifier plus the
/// mix it belongs to. The job driver looks up the rest of the job's state
/// (lyric timeline, config snapshot) itself; the queue only needs to know
/// which job to pick up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJobMessage {
    pub job_id: JobId,
    pub mix_id: String,
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

impl RenderJobMessage {
    pub fn new(job_id: JobId, mix_id: impl Into<String>) -> Self {
        Self {
            job_id,
            mix_id: mix_id.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// Key used to deduplicate repeated enqueues of the same job.
    pub fn idempotency_key(&self) -> String {
        format!("render:{}", self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_job_message_serde_roundtrip() {
        let msg = RenderJobMessage::new(JobId::new(), "mix-42");
        let json = serde_json::to_string(&msg).expect("serialize");
        let decoded: RenderJobMessage = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded.job_id, msg.job_id);
        assert_eq!(decoded.mix_id, msg.mix_id);
    }

    #[test]
    fn idempotency_key_is_keyed_on_job_id() {
        let a = RenderJobMessage::new(JobId::from_string("job-1"), "mix-1");
        let b = RenderJobMessage::new(JobId::from_string("job-1"), "mix-2");
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }
}
