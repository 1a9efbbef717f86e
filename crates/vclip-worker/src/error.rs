//! Worker error taxonomy.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Timeline not locked, or the mixed audio asset is unreachable. Fails
    /// the job before any clip work starts.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Transient failure on a candidate: network I/O, rate-limited, 5xx,
    /// or a verification failure within its retry budget.
    #[error("candidate retryable: {0}")]
    CandidateRetryable(String),

    /// Non-retryable failure on a candidate (4xx, malformed request).
    /// Advances the fallback state machine to the next candidate.
    #[error("candidate permanent: {0}")]
    CandidatePermanent(String),

    /// Local-file fallback lookup found nothing for this source video.
    #[error("fallback local file missing: {0}")]
    FallbackLocalMissing(String),

    /// The placeholder re-encode itself failed. Fatal to the clip, not the job.
    #[error("fallback placeholder failed: {0}")]
    FallbackPlaceholderFailed(String),

    /// Final concatenation/subtitle/mux failed. Fatal to the job.
    #[error("assembly failed: {0}")]
    AssemblyFailed(String),

    /// Job or worker shutdown interrupted the operation.
    #[error("cancelled")]
    Cancelled,

    #[error("media error: {0}")]
    Media(#[from] vclip_media::MediaError),

    #[error("queue error: {0}")]
    Queue(#[from] vclip_queue::QueueError),

    #[error("config error: {0}")]
    Config(#[from] vclip_models::ConfigError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn candidate_retryable(msg: impl Into<String>) -> Self {
        Self::CandidateRetryable(msg.into())
    }

    pub fn candidate_permanent(msg: impl Into<String>) -> Self {
        Self::CandidatePermanent(msg.into())
    }

    pub fn assembly_failed(msg: impl Into<String>) -> Self {
        Self::AssemblyFailed(msg.into())
    }

    /// Whether a candidate-level fetch should be retried at the same
    /// candidate (as opposed to advancing the fallback state machine).
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::CandidateRetryable(_) => true,
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Http(_) => true,
            _ => false,
        }
    }

    /// Whether this error fails the whole job rather than just a clip task.
    pub fn is_fatal_to_job(&self) -> bool {
        matches!(
            self,
            WorkerError::PreconditionFailed(_) | WorkerError::AssemblyFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_retryable_is_retryable_but_not_fatal() {
        let e = WorkerError::candidate_retryable("timeout");
        assert!(e.is_retryable());
        assert!(!e.is_fatal_to_job());
    }

    #[test]
    fn assembly_failed_is_fatal() {
        let e = WorkerError::assembly_failed("concat error");
        assert!(e.is_fatal_to_job());
        assert!(!e.is_retryable());
    }

    #[test]
    fn precondition_failed_is_fatal_not_retryable() {
        let e = WorkerError::precondition_failed("timeline not locked");
        assert!(e.is_fatal_to_job());
        assert!(!e.is_retryable());
    }
}
