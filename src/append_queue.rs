//! AppendQueue (spec §4.6): bounded FIFO into a `Sink`, with a video/audio
//! sub-queue pair when a `Transmuxer` is present, quota-aware eviction, and
//! the `needs_more_data()` backpressure gate that drives `StreamSession`'s
//! download loop (spec §5).
//!
//! The source's `setTimeout(fn, 1000)` buffer-full spin-wait (spec §9
//! redesign note) becomes a polled async gate here: `needs_more_data()` is a
//! plain predicate the session loop checks and sleeps on, rather than a
//! callback registration — simpler than a notify channel and sufficient
//! since the session already owns its own poll loop.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::config::AppendQueueConfig;
use crate::sink::{MediaKind, Sink};

struct PendingChunk {
    sequence: u64,
    bytes: Bytes,
}

struct SubQueueState {
    pending: VecDeque<PendingChunk>,
    is_appending: bool,
    init: Option<Bytes>,
    init_appended: bool,
    last_appended_sequence: Option<u64>,
}

impl SubQueueState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            is_appending: false,
            init: None,
            init_appended: false,
            last_appended_sequence: None,
        }
    }
}

struct IsAppendingGuard<'a> {
    state: &'a Mutex<SubQueueState>,
}

impl Drop for IsAppendingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().is_appending = false;
    }
}

/// Bounded FIFO feeding a `Sink`, one instance per `StreamSession`.
pub struct AppendQueue {
    sink: Arc<dyn Sink>,
    config: AppendQueueConfig,
    video: Mutex<SubQueueState>,
    audio: Mutex<SubQueueState>,
}

impl AppendQueue {
    pub fn new(sink: Arc<dyn Sink>, config: AppendQueueConfig) -> Self {
        Self {
            sink,
            config,
            video: Mutex::new(SubQueueState::new()),
            audio: Mutex::new(SubQueueState::new()),
        }
    }

    fn state(&self, kind: MediaKind) -> &Mutex<SubQueueState> {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        }
    }

    /// Set the init segment for a sub-queue. Must be called before the
    /// first `enqueue` for that `kind` to take effect as a true prefix;
    /// calling it again has no further effect once it has been appended.
    pub fn set_init(&self, kind: MediaKind, bytes: Bytes) {
        let mut state = self.state(kind).lock();
        if !state.init_appended {
            state.init = Some(bytes);
        }
    }

    /// `true` when the producer should keep fetching: buffered-ahead is
    /// below `BUFFER_AHEAD_LIMIT` or nothing is buffered yet (spec §4.6).
    pub fn needs_more_data(&self, kind: MediaKind) -> bool {
        let ranges = self.sink.buffered(kind);
        let Some(last) = ranges.last() else {
            return true;
        };
        let current = self.sink.current_time_s();
        (last.end_s - current) < self.config.buffer_ahead_limit.as_secs_f64()
    }

    /// Enqueue a chunk and drive the sub-queue until it, and everything
    /// already pending, has been appended (or the queue is left mid-retry
    /// after a `QuotaExceeded`, in which case a later call resumes it).
    pub async fn enqueue(&self, kind: MediaKind, sequence: u64, bytes: Bytes) {
        {
            let mut state = self.state(kind).lock();
            state.pending.push_back(PendingChunk { sequence, bytes });
        }
        self.drive(kind).await;
    }

    async fn drive(&self, kind: MediaKind) {
        loop {
            let next = {
                let mut state = self.state(kind).lock();
                if state.is_appending {
                    return; // another drive() call already owns this sub-queue
                }
                match state.pending.pop_front() {
                    Some(item) => {
                        state.is_appending = true;
                        Some(item)
                    }
                    None => None,
                }
            };

            let Some(item) = next else { return };
            // Guards against the calling step() future being dropped mid-await
            // by the outer select! in session::run — is_appending must clear
            // even if append_with_retry never returns, or drive() wedges shut
            // for the rest of the session.
            let _guard = IsAppendingGuard { state: self.state(kind) };
            self.append_with_retry(kind, item).await;
        }
    }

    async fn append_with_retry(&self, kind: MediaKind, item: PendingChunk) {
        self.append_init_if_needed(kind).await;

        loop {
            match self.sink.append(kind, item.bytes.clone()).await {
                Ok(()) => {
                    self.record_success(kind, item.sequence);
                    return;
                }
                Err(_quota_exceeded) => {
                    self.evict_for_quota(kind).await;
                    tokio::time::sleep(self.config.quota_retry_delay).await;
                }
            }
        }
    }

    async fn append_init_if_needed(&self, kind: MediaKind) {
        let init_bytes = {
            let mut state = self.state(kind).lock();
            if state.init_appended {
                None
            } else if let Some(bytes) = state.init.clone() {
                Some(bytes)
            } else {
                state.init_appended = true; // no init configured for this sub-queue
                None
            }
        };

        let Some(bytes) = init_bytes else { return };

        loop {
            match self.sink.append(kind, bytes.clone()).await {
                Ok(()) => {
                    self.state(kind).lock().init_appended = true;
                    return;
                }
                Err(_quota_exceeded) => {
                    self.evict_for_quota(kind).await;
                    tokio::time::sleep(self.config.quota_retry_delay).await;
                }
            }
        }
    }

    /// Drop `[buffered_start, current_time - keep_behind]`; if total
    /// buffered still exceeds `BUFFER_MAX_SECONDS`, keep dropping from the
    /// front of the buffered range (spec §4.6).
    async fn evict_for_quota(&self, kind: MediaKind) {
        let current = self.sink.current_time_s();
        let keep_behind = self.config.keep_behind.as_secs_f64();
        let buffer_max = self.config.buffer_max.as_secs_f64();

        loop {
            let ranges = self.sink.buffered(kind);
            let Some(first) = ranges.first().copied() else {
                break;
            };
            let remove_end = (current - keep_behind).max(first.start_s);
            if remove_end > first.start_s {
                self.sink.remove(kind, first.start_s, remove_end).await;
            }

            let total: f64 = self.sink.buffered(kind).iter().map(|r| r.end_s - r.start_s).sum();
            if total <= buffer_max {
                break;
            }
            // Still over budget: drop further from the tail of the start.
            let ranges = self.sink.buffered(kind);
            let Some(first) = ranges.first().copied() else {
                break;
            };
            if remove_end >= first.end_s {
                break; // nothing further to safely drop without touching the playhead
            }
            self.sink.remove(kind, first.start_s, first.end_s.min(first.start_s + 1.0)).await;
        }
    }

    /// Drop everything not yet appended and forget the last-appended
    /// sequence, for both sub-queues (spec §4.7 `seek`). A seek invalidates
    /// the pending FIFO's ordering assumptions — the next enqueued chunk may
    /// carry a lower sequence than whatever was last appended before the
    /// jump — so the monotonicity tracking has to reset along with the
    /// queue, not just the queue contents.
    pub fn clear_pending(&self) {
        for kind in [MediaKind::Video, MediaKind::Audio] {
            let mut state = self.state(kind).lock();
            state.pending.clear();
            state.last_appended_sequence = None;
        }
    }

    fn record_success(&self, kind: MediaKind, sequence: u64) {
        let mut state = self.state(kind).lock();
        if let Some(last) = state.last_appended_sequence {
            if sequence <= last {
                error!(kind = ?kind, sequence, last, "append queue received a non-monotonic sequence");
                debug_assert!(sequence > last, "spec invariant 1: appends must be strictly increasing");
            }
        }
        state.last_appended_sequence = Some(sequence);
        debug!(kind = ?kind, sequence, "appended segment chunk");
    }
}
