//! Typed playlist records (spec §3).

use serde::{Deserialize, Serialize};

/// A variant (rendition) referenced from an HLS master playlist.
///
/// Immutable once parsed: the parser never mutates a `Variant` after
/// construction, only reorders the `Vec` they're returned in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub url: String,
    pub bitrate_bps: u64,
    pub resolution: Option<(u32, u32)>,
    pub codecs: Option<String>,
}

/// A byte-range restriction on a segment fetch (`EXT-X-BYTERANGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// One media segment reference.
///
/// `sequence` is monotonic non-decreasing within a playlist instance.
/// `id` is the dedup key used across live refreshes: `"{sequence}_{url}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub sequence: u64,
    pub url: String,
    pub duration_s: f64,
    pub byte_range: Option<ByteRange>,
    pub id: String,
}

impl SegmentRef {
    pub fn new(sequence: u64, url: String, duration_s: f64, byte_range: Option<ByteRange>) -> Self {
        let id = format!("{sequence}_{url}");
        Self {
            sequence,
            url,
            duration_s,
            byte_range,
            id,
        }
    }
}

/// Whether a playlist was a master (variant list) or media (segment list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaylistKind {
    Master,
    Media,
}

/// Tagged container kind decided once at manifest resolution (spec §9
/// redesign note; SPEC_FULL.md §3 supplement), replacing the source's
/// duck-typed `"hls"|"dash"|"mp4"|"segment"` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Hls,
    Progressive,
}

/// Parsed playlist. A `Master` snapshot carries only `variants`; a `Media`
/// snapshot carries only `segments` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub kind: PlaylistKind,
    pub variants: Option<Vec<Variant>>,
    pub segments: Option<Vec<SegmentRef>>,
    pub media_sequence: Option<u64>,
    pub is_live: bool,
    pub base_url: String,
}

impl PlaylistSnapshot {
    /// Build the single-segment synthetic snapshot for a progressive
    /// (direct-file) manifest URL (SPEC_FULL.md §3 supplement).
    pub fn progressive(url: String, base_url: String) -> Self {
        Self {
            kind: PlaylistKind::Media,
            variants: None,
            segments: Some(vec![SegmentRef::new(0, url, 0.0, None)]),
            media_sequence: Some(0),
            is_live: false,
            base_url,
        }
    }
}
