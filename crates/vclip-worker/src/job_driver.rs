//! Top-level job orchestration: pulls render-job identifiers off the queue
//! and runs each one through precondition checks, the clip scheduler, and
//! assembly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use vclip_models::{
    AggregateRenderMetrics, ClipStats, ClipTask, ClipTaskState, ClipWindow, EncodingConfig, RenderClipConfig, RenderJob,
    SourceType, Timeline,
};
use vclip_queue::{JobQueue, RenderJobMessage};

use crate::error::{WorkerError, WorkerResult};
use crate::fallback::{FallbackContext, FallbackOutcome};
use crate::job_store::JobStore;
use crate::logging::JobSpan;
use crate::observability;
use crate::rate_limiter::RetrieveRateLimiter;
use crate::retrieve_client::RetrieveClient;
use crate::scheduler::ClipScheduler;
use crate::stream_cache::StreamUrlCache;
use crate::{assembly, config::WorkerConfig};

const TIMELINE_KEY_PREFIX: &str = "render:input:";

/// A job with no completed clip task in this long is considered stalled and
/// has its in-flight tasks cancelled; assembly then runs on whatever
/// resolved before the stall.
const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(15);

/// Everything the job driver needs besides the timeline itself to run one
/// job: where the mixed audio asset lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RenderJobInput {
    timeline: Timeline,
    mixed_audio_path: String,
}

pub struct JobDriver {
    queue: Arc<JobQueue>,
    job_store: JobStore,
    config_rx: watch::Receiver<Arc<RenderClipConfig>>,
    retrieve: RetrieveClient,
    worker_config: WorkerConfig,
    redis_client: redis::Client,
    consumer_name: String,
    job_semaphore: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl JobDriver {
    pub fn new(
        queue: Arc<JobQueue>,
        job_store: JobStore,
        config_rx: watch::Receiver<Arc<RenderClipConfig>>,
        retrieve: RetrieveClient,
        worker_config: WorkerConfig,
        redis_url: &str,
    ) -> WorkerResult<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let job_semaphore = Arc::new(Semaphore::new(worker_config.max_concurrent_jobs));
        let consumer_name = format!("worker-{}", uuid::Uuid::new_v4());

        Ok(Self {
            queue,
            job_store,
            config_rx,
            retrieve,
            worker_config,
            redis_client,
            consumer_name,
            job_semaphore,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Runs the claim-pending sweep and the main consumption loop until
    /// shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        let claim_task = self.run_claim_sweep();
        let consume_task = self.run_consume_loop();

        tokio::select! {
            _ = claim_task => {}
            _ = consume_task => {}
        }

        Ok(())
    }

    async fn run_claim_sweep(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut interval = tokio::time::interval(self.worker_config.claim_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    match self
                        .queue
                        .claim_pending(&self.consumer_name, self.worker_config.claim_min_idle.as_millis() as u64, 5)
                        .await
                    {
                        Ok(claimed) if !claimed.is_empty() => {
                            info!(count = claimed.len(), "claimed pending render jobs from crashed consumers");
                            for (message_id, message) in claimed {
                                self.spawn_job(message_id, message);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "claim-pending sweep failed"),
                    }
                }
            }
        }
    }

    async fn run_consume_loop(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let available = self.job_semaphore.available_permits();
            if available == 0 {
                tokio::select! {
                    _ = shutdown_rx.changed() => continue,
                    _ = tokio::time::sleep(Duration::from_millis(500)) => continue,
                }
            }

            let consume = self.queue.consume(&self.consumer_name, 1000, available.min(5));

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                result = consume => {
                    match result {
                        Ok(messages) => {
                            for (message_id, message) in messages {
                                self.spawn_job(message_id, message);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to consume render jobs");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    fn spawn_job(&self, message_id: String, message: RenderJobMessage) {
        let permit = match self.job_semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                warn!(job_id = %message.job_id, "no job slot available, leaving message pending for reclaim");
                return;
            }
        };

        let queue = self.queue.clone();
        let job_store = self.job_store.clone();
        let config_rx = self.config_rx.clone();
        let retrieve = self.retrieve.clone();
        let redis_client = self.redis_client.clone();
        let worker_config = self.worker_config.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let outcome = run_one_job(&message, &config_rx, &retrieve, &redis_client, &job_store, &worker_config).await;

            match outcome {
                Ok(()) => {
                    let _ = queue.ack(&message_id).await;
                    let _ = queue.clear_dedup(&message).await;
                }
                Err(e) => {
                    error!(job_id = %message.job_id, error = %e, "render job terminated with an unexpected driver error");
                    let _ = queue.dlq(&message_id, &message, &e.to_string()).await;
                    let _ = queue.clear_dedup(&message).await;
                }
            }
        });
    }
}

/// Runs a single render job end to end. Only driver-level errors (queue
/// connectivity, panics in setup) return `Err`; once a `RenderJob` row is
/// successfully written in a terminal state this always returns `Ok(())`,
/// since the job's own failure has already been persisted and reported.
async fn run_one_job(
    message: &RenderJobMessage,
    config_rx: &watch::Receiver<Arc<RenderClipConfig>>,
    retrieve: &RetrieveClient,
    redis_client: &redis::Client,
    job_store: &JobStore,
    worker_config: &WorkerConfig,
) -> WorkerResult<()> {
    let span = JobSpan::open(&message.job_id, &message.mix_id);
    let _entered = span.enter();

    if let Some(existing) = job_store.load(&message.job_id).await? {
        if existing.status.is_terminal() {
            info!(job_id = %message.job_id, "job already in terminal state, skipping");
            return Ok(());
        }
    }

    let mut job = RenderJob::new(message.mix_id.clone());
    job.id = message.job_id.clone();
    job.start();
    job_store.save(&job).await?;

    let started_at = Instant::now();
    let heartbeat_handle = spawn_job_heartbeat(job_store.clone(), message.job_id.clone(), worker_config.job_heartbeat_interval);

    let input = match load_job_input(redis_client, &message.job_id).await {
        Ok(input) => input,
        Err(e) => {
            heartbeat_handle.abort();
            return fail_job(job_store, &mut job, WorkerError::precondition_failed(e.to_string()), None, started_at).await;
        }
    };

    if let Err(e) = input.timeline.validate() {
        heartbeat_handle.abort();
        return fail_job(job_store, &mut job, WorkerError::precondition_failed(e.to_string()), None, started_at).await;
    }
    let mixed_audio_path = PathBuf::from(&input.mixed_audio_path);
    if tokio::fs::metadata(&mixed_audio_path).await.is_err() {
        heartbeat_handle.abort();
        return fail_job(
            job_store,
            &mut job,
            WorkerError::precondition_failed(format!("mixed audio asset unreachable: {}", input.mixed_audio_path)),
            None,
            started_at,
        )
        .await;
    }

    let job_temp_dir = PathBuf::from(&worker_config.work_dir).join(message.job_id.as_str());
    if let Err(e) = tokio::fs::create_dir_all(&job_temp_dir).await {
        heartbeat_handle.abort();
        return fail_job(job_store, &mut job, WorkerError::precondition_failed(e.to_string()), None, started_at).await;
    }

    let result = run_clip_phase_and_assembly(
        &input.timeline,
        &mixed_audio_path,
        &job_temp_dir,
        message,
        config_rx,
        retrieve,
        job.queued_at,
        worker_config.stall_timeout,
    )
    .await;

    let _ = tokio::fs::remove_dir_all(&job_temp_dir).await;
    heartbeat_handle.abort();

    match result {
        Ok((output_path, stats, render_metrics)) => {
            observability::set_alignment_deltas(render_metrics.avg_delta_ms, render_metrics.max_delta_ms);
            job.succeed(output_path.to_string_lossy().to_string(), stats, render_metrics);
            job_store.save(&job).await?;
            observability::record_render_job_duration("success", started_at.elapsed().as_secs_f64());
            info!(job_id = %message.job_id, "render job succeeded");
            Ok(())
        }
        Err((e, stats)) => fail_job(job_store, &mut job, e, stats, started_at).await,
    }
}

/// Keeps `heartbeat:{job_id}` alive in Redis for the duration of the job so
/// the active-jobs sweep doesn't consider it stale. Logging backs off after
/// repeated failures rather than spamming on every missed tick.
fn spawn_job_heartbeat(job_store: JobStore, job_id: vclip_models::JobId, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = crate::retry::FailureTracker::new(3);
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match job_store.heartbeat(&job_id).await {
                Ok(()) => tracker.record_success(),
                Err(e) => {
                    if tracker.record_failure() {
                        warn!(job_id = %job_id, error = %e, "job heartbeat failed");
                    }
                }
            }
        }
    })
}

async fn fail_job(
    job_store: &JobStore,
    job: &mut RenderJob,
    error: WorkerError,
    stats: Option<ClipStats>,
    started_at: Instant,
) -> WorkerResult<()> {
    warn!(job_id = %job.id, error = %error, "render job failed");
    job.fail(error.to_string(), stats);
    job_store.save(job).await?;
    observability::record_render_job_failed(error_kind(&error));
    observability::record_render_job_duration("failed", started_at.elapsed().as_secs_f64());
    Ok(())
}

fn error_kind(e: &WorkerError) -> &'static str {
    match e {
        WorkerError::PreconditionFailed(_) => "precondition_failed",
        WorkerError::AssemblyFailed(_) => "assembly_failed",
        WorkerError::Cancelled => "cancelled",
        _ => "other",
    }
}

fn clip_task_state_label(state: ClipTaskState) -> &'static str {
    match state {
        ClipTaskState::Pending => "pending",
        ClipTaskState::Running => "running",
        ClipTaskState::Success => "success",
        ClipTaskState::FallbackLocal => "fallback_local",
        ClipTaskState::FallbackPlaceholder => "fallback_placeholder",
        ClipTaskState::Failed => "failed",
    }
}

/// Runs every lyric line's clip task through the scheduler concurrently
/// (the scheduler's semaphores are what bound concurrency, not this
/// function), then assembles the final output. Per-line failures never
/// abort the job here: the scheduler can only return `FallbackPlaceholderFailed`
/// or `Cancelled` for a line, and neither is fatal, so assembly always runs
/// once every line has resolved. Only assembly's own failure is returned.
async fn run_clip_phase_and_assembly(
    timeline: &Timeline,
    mixed_audio_path: &std::path::Path,
    job_temp_dir: &std::path::Path,
    message: &RenderJobMessage,
    config_rx: &watch::Receiver<Arc<RenderClipConfig>>,
    retrieve: &RetrieveClient,
    queued_at: chrono::DateTime<chrono::Utc>,
    stall_timeout: Duration,
) -> Result<(PathBuf, ClipStats, AggregateRenderMetrics), (WorkerError, Option<ClipStats>)> {
    let config = config_rx.borrow().clone();
    let encoding = EncodingConfig::default();
    let cache = StreamUrlCache::new();
    let rate_limiter = RetrieveRateLimiter::new(config.retrieve_rate_per_minute);
    let scheduler = ClipScheduler::new(config.max_parallelism, config.per_video_limit);
    let placeholder_path = PathBuf::from(&config.placeholder_asset_path);

    let durations_ms = Arc::new(std::sync::Mutex::new(Vec::<f64>::new()));
    let alignment_deltas_ms = Arc::new(std::sync::Mutex::new(Vec::<f64>::new()));
    let success_count = Arc::new(AtomicU32::new(0));
    let failed_count = Arc::new(AtomicU32::new(0));
    let placeholder_count = Arc::new(AtomicU32::new(0));
    let last_progress = Arc::new(std::sync::Mutex::new(Instant::now()));

    // Every line's target path is computed upfront so the futures below can
    // borrow it rather than the loop variable; the scheduler's semaphore is
    // what actually bounds how many of these run at once, not the for loop.
    let target_paths: Vec<PathBuf> =
        timeline.lines.iter().map(|line| job_temp_dir.join(format!("line-{:04}.mp4", line.line_id))).collect();

    let media_root = std::path::Path::new("media");
    let job_id_str = message.job_id.as_str().to_string();

    let line_futures = timeline.lines.iter().zip(target_paths.iter()).map(|(line, target_path)| {
        let durations_ms = &durations_ms;
        let alignment_deltas_ms = &alignment_deltas_ms;
        let success_count = &success_count;
        let failed_count = &failed_count;
        let placeholder_count = &placeholder_count;
        let last_progress = &last_progress;
        let scheduler = &scheduler;
        let cache = &cache;
        let rate_limiter = &rate_limiter;
        let config = &config;
        let placeholder_path = &placeholder_path;
        let encoding = &encoding;
        let job_id_str = &job_id_str;
        async move {
            let clip_task_id = uuid::Uuid::new_v4().to_string();
            let fallback_ctx = FallbackContext {
                cache,
                rate_limiter,
                retrieve,
                video_slots: &scheduler.video_slots,
                media_root,
                placeholder_asset_path: placeholder_path,
                encoding,
                retry_backoff_base_ms: config.retry_backoff_base_ms,
                max_retry: config.max_retry,
                clip_task_id: &clip_task_id,
            };

            let started = Instant::now();
            let started_at_ms = chrono::Utc::now().timestamp_millis();
            let outcome = scheduler.run_line(&fallback_ctx, line, target_path).await;
            let finished_at_ms = chrono::Utc::now().timestamp_millis();

            let state = match &outcome {
                Ok(o) => match o.outcome {
                    FallbackOutcome::Candidate => ClipTaskState::Success,
                    FallbackOutcome::LocalFile => ClipTaskState::FallbackLocal,
                    FallbackOutcome::Placeholder => ClipTaskState::FallbackPlaceholder,
                },
                Err(_) => ClipTaskState::Failed,
            };

            if state.is_success() {
                success_count.fetch_add(1, Ordering::Relaxed);
            } else {
                failed_count.fetch_add(1, Ordering::Relaxed);
            }
            if matches!(state, ClipTaskState::FallbackPlaceholder) {
                placeholder_count.fetch_add(1, Ordering::Relaxed);
                observability::record_render_clip_placeholder();
            }
            if let Err(ref e) = outcome {
                observability::record_render_clip_failure(error_kind(e));
            }
            if let Ok(o) = &outcome {
                let delta_ms = (o.duration_ms - line.duration_ms()).unsigned_abs() as f64;
                alignment_deltas_ms.lock().unwrap().push(delta_ms);
            }

            let source_type = match &outcome {
                Ok(o) => match o.outcome {
                    FallbackOutcome::Candidate => {
                        SourceType::RemoteStream { source_video_id: o.video_id.clone().unwrap_or_default() }
                    }
                    FallbackOutcome::LocalFile => SourceType::LocalFile { path: target_path.clone() },
                    FallbackOutcome::Placeholder => SourceType::Placeholder,
                },
                Err(_) => SourceType::Placeholder,
            };

            let mut clip_task = ClipTask::new(
                line.line_id,
                ClipWindow { start_ms: line.start_ms, end_ms: line.end_ms },
                source_type,
                target_path.clone(),
            );
            clip_task.clip_task_id = clip_task_id;
            clip_task.state = state;
            clip_task.started_at_ms = Some(started_at_ms);
            clip_task.finished_at_ms = Some(finished_at_ms);

            let (video_id, parallel_slot, attempt, duration_ms, error_code) = match &outcome {
                Ok(o) => {
                    clip_task.current_candidate_index = o.candidate_index.unwrap_or(0);
                    clip_task.attempt_count = o.attempts;
                    (o.video_id.clone(), o.parallel_slot, o.attempts, Some(o.duration_ms), None)
                }
                Err(e) => {
                    clip_task.attempt_count = 1;
                    clip_task.error_code = Some(error_kind(e).to_string());
                    (None, 0, 1, None, Some(error_kind(e).to_string()))
                }
            };

            observability::log_clip_task(&observability::ClipLogFields {
                clip_task_id: &clip_task.clip_task_id,
                render_job_id: job_id_str.as_str(),
                line_id: clip_task.line_id,
                video_id: video_id.as_deref(),
                parallel_slot,
                attempt,
                state: clip_task_state_label(state),
                source_type: clip_task.source_type.label(),
                duration_ms,
                bytes: None,
                error_code: error_code.as_deref(),
                stderr_tail: None,
            });
            observability::record_render_clip_duration_ms(clip_task.source_type.label(), started.elapsed().as_millis() as f64);

            durations_ms.lock().unwrap().push(started.elapsed().as_millis() as f64);
            *last_progress.lock().unwrap() = Instant::now();
            state
        }
    });

    let mut config_watch = config_rx.clone();
    let mut join_fut = Box::pin(futures_util::future::join_all(line_futures));
    loop {
        tokio::select! {
            _results = &mut join_fut => break,
            _ = tokio::time::sleep(STALL_CHECK_INTERVAL) => {
                let elapsed = last_progress.lock().unwrap().elapsed();
                if elapsed > stall_timeout {
                    warn!(job_id = %message.job_id, stalled_for_secs = elapsed.as_secs(), "no clip task progress, cancelling in-flight tasks");
                    scheduler.cancel();
                }
            }
            changed = config_watch.changed() => {
                if changed.is_err() {
                    continue;
                }
                let new_config = config_watch.borrow().clone();
                info!(
                    job_id = %message.job_id,
                    max_parallelism = new_config.max_parallelism,
                    per_video_limit = new_config.per_video_limit,
                    "applying hot-reloaded clip config to running job"
                );
                scheduler.reconfigure(new_config.max_parallelism, new_config.per_video_limit);
            }
        }
    }

    let clip_paths = target_paths;
    let job_output_dir = PathBuf::from("media/output").join(message.job_id.as_str());
    let job_output_path = job_output_dir.join(format!("{}.mp4", message.job_id));
    if let Err(e) = tokio::fs::create_dir_all(&job_output_dir).await {
        let stats = build_stats(&durations_ms, &success_count, &failed_count, &placeholder_count, scheduler.peak_parallelism());
        return Err((WorkerError::assembly_failed(e.to_string()), Some(stats)));
    }

    if let Err(e) = assembly::assemble(timeline, &clip_paths, mixed_audio_path, job_temp_dir, &job_output_path).await {
        let stats = build_stats(&durations_ms, &success_count, &failed_count, &placeholder_count, scheduler.peak_parallelism());
        return Err((e, Some(stats)));
    }

    let stats = build_stats(&durations_ms, &success_count, &failed_count, &placeholder_count, scheduler.peak_parallelism());
    let total_duration_ms: i64 = timeline.lines.iter().map(|l| l.duration_ms()).sum();
    let render_metrics =
        AggregateRenderMetrics::from_deltas(&alignment_deltas_ms.lock().unwrap(), total_duration_ms, queued_at);
    Ok((job_output_path, stats, render_metrics))
}

fn build_stats(
    durations_ms: &Arc<std::sync::Mutex<Vec<f64>>>,
    success_count: &Arc<AtomicU32>,
    failed_count: &Arc<AtomicU32>,
    placeholder_count: &Arc<AtomicU32>,
    peak_parallelism: u32,
) -> ClipStats {
    let durations = durations_ms.lock().unwrap().clone();
    ClipStats::from_durations(
        &durations,
        success_count.load(Ordering::Relaxed),
        failed_count.load(Ordering::Relaxed),
        placeholder_count.load(Ordering::Relaxed),
        peak_parallelism,
    )
}

async fn load_job_input(redis_client: &redis::Client, job_id: &vclip_models::JobId) -> WorkerResult<RenderJobInput> {
    let mut conn = redis_client.get_multiplexed_async_connection().await?;
    let key = format!("{TIMELINE_KEY_PREFIX}{job_id}");
    let payload: Option<String> = conn.get(&key).await?;
    let payload = payload.ok_or_else(|| WorkerError::precondition_failed(format!("no timeline input found for job at {key}")))?;
    let input: RenderJobInput = serde_json::from_str(&payload)?;
    Ok(input)
}
