//! Owner-facing observability events (spec §6), one per session.
//!
//! Mirrors the teacher's `HlsStreamEvent`: a flat enum the coordinator/
//! session pushes onto a channel for whoever is watching.

use crate::error::StreamError;
use crate::playlist::Variant;
use crate::session::SessionState;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    StateChanged(SessionState),
    Qualities(Vec<Variant>),
    /// Fired once, `SessionConfig::playback_start_grace` after the first
    /// segment lands (spec §4.7 step 3) — the owner's signal to start
    /// feeding the player rather than inferring it from `Progress`/`Stats`.
    PlaybackStarted,
    Progress {
        current_s: f64,
        duration_s: Option<f64>,
        buffered_ahead_s: f64,
    },
    Stats {
        bytes_downloaded: u64,
        segment_count: u64,
        bps_ema: f64,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl StreamEvent {
    pub fn error(err: &StreamError) -> Self {
        Self::Error {
            kind: format!("{err:?}").split_whitespace().next().unwrap_or("Error").to_string(),
            message: err.to_string(),
        }
    }
}
