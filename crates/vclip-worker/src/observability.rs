//! Per-clip structured logging and Prometheus metrics for the render
//! pipeline.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Installs the Prometheus recorder and its own `/metrics` HTTP listener on
/// `0.0.0.0:{port}`. Call once at process start, inside a Tokio runtime.
pub fn init_metrics(port: u16) {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .expect("failed to install Prometheus exporter");
}

pub mod names {
    pub const RENDER_JOBS_INFLIGHT: &str = "vclip_render_jobs_inflight";
    pub const RENDER_JOB_DURATION_SECONDS: &str = "vclip_render_job_duration_seconds";
    pub const RENDER_JOBS_FAILED_TOTAL: &str = "vclip_render_jobs_failed_total";

    pub const RENDER_CLIP_INFLIGHT: &str = "vclip_render_clip_inflight";
    pub const RENDER_CLIP_DURATION_MS: &str = "vclip_render_clip_duration_ms";
    pub const RENDER_CLIP_FAILURES_TOTAL: &str = "vclip_render_clip_failures_total";
    pub const RENDER_CLIP_PLACEHOLDER_TOTAL: &str = "vclip_render_clip_placeholder_total";

    pub const RENDER_ALIGNMENT_AVG_DELTA_MS: &str = "vclip_render_alignment_avg_delta_ms";
    pub const RENDER_ALIGNMENT_MAX_DELTA_MS: &str = "vclip_render_alignment_max_delta_ms";
}

/// Fields logged for every terminal clip-task attempt, per the structured
/// per-clip observability contract.
pub struct ClipLogFields<'a> {
    pub clip_task_id: &'a str,
    pub render_job_id: &'a str,
    pub line_id: u32,
    pub video_id: Option<&'a str>,
    pub parallel_slot: u32,
    pub attempt: u32,
    pub state: &'a str,
    pub source_type: &'a str,
    pub duration_ms: Option<i64>,
    pub bytes: Option<u64>,
    pub error_code: Option<&'a str>,
    pub stderr_tail: Option<&'a str>,
}

pub fn log_clip_task(fields: &ClipLogFields<'_>) {
    if fields.error_code.is_some() {
        error!(
            clip_task_id = fields.clip_task_id,
            render_job_id = fields.render_job_id,
            line_id = fields.line_id,
            video_id = fields.video_id,
            parallel_slot = fields.parallel_slot,
            attempt = fields.attempt,
            state = fields.state,
            source_type = fields.source_type,
            duration_ms = fields.duration_ms,
            bytes = fields.bytes,
            error_code = fields.error_code,
            stderr_tail = fields.stderr_tail,
            "clip task finished"
        );
    } else {
        info!(
            clip_task_id = fields.clip_task_id,
            render_job_id = fields.render_job_id,
            line_id = fields.line_id,
            video_id = fields.video_id,
            parallel_slot = fields.parallel_slot,
            attempt = fields.attempt,
            state = fields.state,
            source_type = fields.source_type,
            duration_ms = fields.duration_ms,
            bytes = fields.bytes,
            "clip task finished"
        );
    }
}

pub fn set_render_jobs_inflight(count: i64) {
    gauge!(names::RENDER_JOBS_INFLIGHT).set(count as f64);
}

pub fn record_render_job_duration(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    histogram!(names::RENDER_JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_render_job_failed(error_kind: &str) {
    let labels = [("error_kind", error_kind.to_string())];
    counter!(names::RENDER_JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn set_render_clip_inflight(count: i64) {
    gauge!(names::RENDER_CLIP_INFLIGHT).set(count as f64);
}

pub fn record_render_clip_duration_ms(source_type: &str, duration_ms: f64) {
    let labels = [("source_type", source_type.to_string())];
    histogram!(names::RENDER_CLIP_DURATION_MS, &labels).record(duration_ms);
}

pub fn record_render_clip_failure(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::RENDER_CLIP_FAILURES_TOTAL, &labels).increment(1);
}

pub fn record_render_clip_placeholder() {
    counter!(names::RENDER_CLIP_PLACEHOLDER_TOTAL).increment(1);
}

pub fn set_alignment_deltas(avg_delta_ms: f64, max_delta_ms: f64) {
    gauge!(names::RENDER_ALIGNMENT_AVG_DELTA_MS).set(avg_delta_ms);
    gauge!(names::RENDER_ALIGNMENT_MAX_DELTA_MS).set(max_delta_ms);
}
