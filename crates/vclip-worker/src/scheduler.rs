//! Bounded-concurrency scheduler: one clip task per lyric line, respecting
//! the global parallelism cap, the per-source-video cap, and (via the
//! fetch/cut engine) the retrieve rate limit, all at once.
//!
//! Tasks are submitted upfront; the global semaphore is the only thing that
//! blocks a task from starting, so a line whose candidates are all local
//! files never waits behind one stuck on a saturated source video.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{info, warn};

use vclip_models::LyricLine;

use crate::error::{WorkerError, WorkerResult};
use crate::fallback::{resolve_line, FallbackContext, LineOutcome};
use crate::observability;

/// Per-source-video admission limiter. Semaphores are created lazily and
/// never shrunk: a config change to `per_video_limit` only affects videos
/// first seen after the change, matching the scheduler's existing-tasks-
/// keep-their-limits hot-reload rule.
#[derive(Clone, Default)]
pub struct VideoSlotLimiter {
    slots: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
    per_video_limit: Arc<AtomicU32>,
}

impl VideoSlotLimiter {
    pub fn new(per_video_limit: u32) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            per_video_limit: Arc::new(AtomicU32::new(per_video_limit.max(1))),
        }
    }

    pub fn set_limit(&self, per_video_limit: u32) {
        self.per_video_limit.store(per_video_limit.max(1), Ordering::Relaxed);
    }

    /// Blocks until a slot for `source_video_id` is free, returning a guard
    /// that releases it on drop.
    pub async fn acquire(&self, source_video_id: &str) -> tokio::sync::OwnedSemaphorePermit {
        let semaphore = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(source_video_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_video_limit.load(Ordering::Relaxed) as usize)))
                .clone()
        };
        semaphore.acquire_owned().await.expect("video slot semaphore never closes")
    }
}

/// Global admission control across every clip task in one job. Capacity can
/// shrink or grow at runtime via [`Self::set_capacity`]; a shrink only takes
/// effect as permits already on loan are returned.
pub struct ClipScheduler {
    global: Arc<Semaphore>,
    capacity: AtomicU32,
    /// Permits still to be forgotten as outstanding loans are returned, for
    /// a shrink that arrived while more permits were checked out than the
    /// new capacity allows. `forget_permits` only affects permits sitting
    /// idle in the semaphore right now, so the remainder of any shrink is
    /// applied lazily by [`GlobalSlot::drop`] instead of being lost.
    pending_forgets: Arc<AtomicU32>,
    pub video_slots: VideoSlotLimiter,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    peak_parallelism: Arc<AtomicU32>,
    in_flight: Arc<AtomicU32>,
}

/// Owned global-slot permit that honors a pending shrink: if a reconfigure
/// is still owed forgotten permits when this one is released, it forgets
/// itself instead of returning to the pool.
struct GlobalSlot {
    permit: Option<tokio::sync::OwnedSemaphorePermit>,
    pending_forgets: Arc<AtomicU32>,
}

impl Drop for GlobalSlot {
    fn drop(&mut self) {
        let Some(permit) = self.permit.take() else { return };
        loop {
            let pending = self.pending_forgets.load(Ordering::SeqCst);
            if pending == 0 {
                return;
            }
            if self
                .pending_forgets
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                permit.forget();
                return;
            }
        }
    }
}

impl ClipScheduler {
    pub fn new(max_parallelism: u32, per_video_limit: u32) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            global: Arc::new(Semaphore::new(max_parallelism as usize)),
            capacity: AtomicU32::new(max_parallelism),
            pending_forgets: Arc::new(AtomicU32::new(0)),
            video_slots: VideoSlotLimiter::new(per_video_limit),
            cancel_tx,
            cancel_rx,
            peak_parallelism: Arc::new(AtomicU32::new(0)),
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Applies a hot-reloaded `max_parallelism`/`per_video_limit`. Growing
    /// the global cap adds permits immediately. Shrinking forgets idle
    /// permits right away and queues the rest in `pending_forgets`, so
    /// permits currently on loan to running tasks are forgotten as those
    /// tasks finish rather than being returned to the pool at full size.
    pub fn reconfigure(&self, max_parallelism: u32, per_video_limit: u32) {
        let previous = self.capacity.swap(max_parallelism, Ordering::SeqCst);
        if max_parallelism > previous {
            self.global.add_permits((max_parallelism - previous) as usize);
        } else if max_parallelism < previous {
            let deficit = previous - max_parallelism;
            let available = self.global.available_permits() as u32;
            let forget_now = deficit.min(available);
            if forget_now > 0 {
                self.global.forget_permits(forget_now as usize);
            }
            let remaining = deficit - forget_now;
            if remaining > 0 {
                self.pending_forgets.fetch_add(remaining, Ordering::SeqCst);
            }
        }
        self.video_slots.set_limit(per_video_limit);
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }

    pub fn peak_parallelism(&self) -> u32 {
        self.peak_parallelism.load(Ordering::Relaxed)
    }

    /// Runs one lyric line's clip task end to end: waits for a global slot,
    /// then delegates candidate/local/placeholder resolution to the
    /// fallback state machine, which itself respects the per-video cap.
    pub async fn run_line(
        &self,
        fallback_ctx: &FallbackContext<'_>,
        line: &LyricLine,
        target_path: &std::path::Path,
    ) -> WorkerResult<LineOutcome> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancelled() => {
                return Err(WorkerError::Cancelled);
            }
            permit = self.global.clone().acquire_owned() => {
                GlobalSlot {
                    permit: Some(permit.expect("global semaphore never closes")),
                    pending_forgets: self.pending_forgets.clone(),
                }
            }
        };

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_parallelism.fetch_max(now_in_flight, Ordering::SeqCst);
        observability::set_render_clip_inflight(now_in_flight as i64);

        info!(line_id = line.line_id, in_flight = now_in_flight, "clip task admitted");

        let result = tokio::select! {
            biased;
            _ = self.cancelled() => Err(WorkerError::Cancelled),
            result = resolve_line(fallback_ctx, line, target_path) => result,
        };

        let still_in_flight = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        observability::set_render_clip_inflight(still_in_flight as i64);

        if let Err(ref e) = result {
            if matches!(e, WorkerError::Cancelled) {
                warn!(line_id = line.line_id, "clip task cancelled");
            }
        }

        result.map(|outcome| LineOutcome { parallel_slot: now_in_flight, ..outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn video_slots_are_created_lazily_and_reused() {
        let limiter = VideoSlotLimiter::new(2);
        let a = limiter.acquire("vid-1").await;
        let b = limiter.acquire("vid-1").await;
        drop(a);
        drop(b);
    }

    #[test]
    fn scheduler_starts_with_zero_peak() {
        let scheduler = ClipScheduler::new(4, 2);
        assert_eq!(scheduler.peak_parallelism(), 0);
    }

    #[tokio::test]
    async fn reconfigure_grows_and_shrinks_capacity() {
        let scheduler = ClipScheduler::new(2, 2);
        scheduler.reconfigure(4, 2);
        assert_eq!(scheduler.global.available_permits(), 4);
        scheduler.reconfigure(1, 2);
        assert_eq!(scheduler.global.available_permits(), 1);
    }

    #[tokio::test]
    async fn shrink_while_saturated_applies_as_permits_return() {
        let scheduler = ClipScheduler::new(4, 2);
        let permits: Vec<_> = futures_util::future::join_all(
            (0..4).map(|_| self_acquire(&scheduler)),
        )
        .await;
        assert_eq!(scheduler.global.available_permits(), 0);

        scheduler.reconfigure(2, 2);
        assert_eq!(scheduler.global.available_permits(), 0);

        drop(permits);
        assert_eq!(scheduler.global.available_permits(), 2);
    }

    async fn self_acquire(scheduler: &ClipScheduler) -> GlobalSlot {
        GlobalSlot {
            permit: Some(scheduler.global.clone().acquire_owned().await.unwrap()),
            pending_forgets: scheduler.pending_forgets.clone(),
        }
    }
}
