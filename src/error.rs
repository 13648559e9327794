//! Error taxonomy shared across the engine.
//!
//! Mirrors the teacher crate's `DownloadError`: one flat `thiserror` enum,
//! `#[from]` conversions at the network boundary, and classification helpers
//! instead of matching on variants at every call site.

/// Top-level failure taxonomy (spec §7).
///
/// `Fatal` variants end the owning session; `Transient` is retried by the
/// caller; `Skip` advances past the offending item; `Recoverable` is handled
/// in place and never surfaces; `Ignorable` is logged and discarded.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("authentication expired")]
    AuthExpired,

    #[error("stream ended (410 Gone)")]
    StreamEnded,

    #[error("manifest malformed: {reason}")]
    ManifestMalformed { reason: String },

    #[error("sink closed")]
    SinkClosed,

    #[error("variant {index} has no segment with sequence >= {target_sequence}")]
    VariantMisaligned { index: usize, target_sequence: u64 },

    #[error("transient failure: {reason}")]
    Transient { reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("session `{0}` not found")]
    SessionNotFound(String),

    #[error("owner `{0}` already has an active session")]
    DuplicateOwner(String),

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl StreamError {
    pub fn manifest_malformed(reason: impl Into<String>) -> Self {
        Self::ManifestMalformed {
            reason: reason.into(),
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Whether this error should end the session (spec §7 `Fatal`).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthExpired
                | Self::StreamEnded
                | Self::ManifestMalformed { .. }
                | Self::SinkClosed
                | Self::VariantMisaligned { .. }
        )
    }
}

/// Outcome of a single `FetchPipeline::get` call, classified per spec §4.2's
/// status/condition table.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fatal: {0}")]
    Fatal(#[source] StreamError),

    #[error("skip: {reason}")]
    Skip { reason: String },

    #[error("transient after exhausting retries: {reason}")]
    Transient { reason: String },

    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Reasons the append queue re-queues a chunk instead of surfacing an error
/// (spec §7 `Recoverable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverableReason {
    QuotaExceeded,
    BufferEviction,
}

/// A parser warning that doesn't prevent producing a `PlaylistSnapshot`
/// (spec §7 `Ignorable`).
#[derive(Debug, Clone)]
pub struct ParseWarning {
    pub line: usize,
    pub message: String,
}

/// Hard parse failure: the text isn't a playlist at all (spec §4.1).
#[derive(Debug, Clone, thiserror::Error)]
#[error("playlist parse error: {reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
