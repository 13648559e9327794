//! External collaborators consumed by `AppendQueue`/`StreamSession`:
//! `Sink` (spec §6 "Sink") and `Transmuxer` (spec §6 "Transmuxer").
//!
//! Both are out-of-scope implementations per spec §1 — only the seam is
//! defined here, the way the teacher defines `SegmentTransformer` /
//! `PlaylistProvider` as traits its coordinator wires concrete
//! implementations into.

use async_trait::async_trait;
use bytes::Bytes;

/// Which media kind a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A chunk emitted by a `Transmuxer` for one `MediaKind` sub-queue.
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub kind: MediaKind,
    pub init: Option<Bytes>,
    pub data: Option<Bytes>,
}

/// Optional TS-to-fMP4 transmuxer (spec §6). When absent, fetched bytes are
/// appended directly to the sink (the fMP4/MP4 path).
#[async_trait]
pub trait Transmuxer: Send + Sync {
    /// Push one segment's raw bytes.
    async fn push(&self, bytes: Bytes);
    /// Flush after a segment's bytes have all been pushed.
    async fn flush(&self);
    /// Drain chunks produced so far (replaces a push-based `data` event: the
    /// session polls after `flush()`, matching Rust's pull-oriented async
    /// idiom over the source's event callback).
    async fn drain(&self) -> Vec<MediaChunk>;
}

/// A rejected append that the sink couldn't accept (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct QuotaExceeded;

/// A contiguous buffered time range, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedRange {
    pub start_s: f64,
    pub end_s: f64,
}

/// Buffered media consumer with quota and a playback clock (spec §6 "Sink").
#[async_trait]
pub trait Sink: Send + Sync {
    async fn append(&self, kind: MediaKind, bytes: Bytes) -> Result<(), QuotaExceeded>;
    fn buffered(&self, kind: MediaKind) -> Vec<BufferedRange>;
    fn current_time_s(&self) -> f64;
    async fn remove(&self, kind: MediaKind, start_s: f64, end_s: f64);
    async fn end_of_stream(&self);
}
