//! Thin wrapper around the queue crate's progress channel for persisting
//! and reading back `RenderJob` state.

use vclip_models::{JobId, RenderJob};
use vclip_queue::ProgressChannel;

use crate::error::WorkerResult;

#[derive(Clone)]
pub struct JobStore {
    progress: ProgressChannel,
}

impl JobStore {
    pub fn new(progress: ProgressChannel) -> Self {
        Self { progress }
    }

    pub async fn save(&self, job: &RenderJob) -> WorkerResult<()> {
        self.progress.update_job_status(job).await?;
        Ok(())
    }

    pub async fn load(&self, job_id: &JobId) -> WorkerResult<Option<RenderJob>> {
        Ok(self.progress.get_job_status(job_id).await?)
    }

    pub async fn heartbeat(&self, job_id: &JobId) -> WorkerResult<()> {
        self.progress.heartbeat(job_id).await?;
        Ok(())
    }
}
