//! Ambient tuning knobs for every component, grouped the way the teacher
//! groups its `HlsConfig` into `FetcherConfig` / `PlaylistConfig` /
//! `BufferPoolConfig` sub-structs instead of one flat bag of fields.

use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Mobile Safari/537.36";

/// Retry/backoff and per-attempt timeout for `FetchPipeline` (spec §4.2).
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Attempts beyond the first before giving up as `Transient`.
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
    /// Linear backoff base: delay for attempt `n` is `backoff_base * n`.
    pub backoff_base: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            attempt_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// `BandwidthEstimator` tuning (spec §4.3).
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    pub ema_alpha: f64,
    pub window_capacity: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.15,
            window_capacity: 20,
        }
    }
}

/// `ABRController` tuning (spec §4.4).
#[derive(Debug, Clone)]
pub struct AbrConfig {
    pub switch_interval: Duration,
    pub panic_buffer: Duration,
    pub safe_buffer: Duration,
    pub rich_buffer: Duration,
    /// Fraction of EMA bandwidth considered "safe" to commit to (0.8).
    pub safety_factor: f64,
    /// A step-up is allowed only if the next variant's bitrate is below
    /// `step_up_factor * ema` (1.1).
    pub step_up_factor: f64,
}

impl Default for AbrConfig {
    fn default() -> Self {
        Self {
            switch_interval: Duration::from_millis(10_000),
            panic_buffer: Duration::from_secs(5),
            safe_buffer: Duration::from_secs(20),
            rich_buffer: Duration::from_secs(60),
            safety_factor: 0.8,
            step_up_factor: 1.1,
        }
    }
}

/// `SegmentStore` tuning (spec §4.5).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Quota per session, `MAX_BUFFER_BYTES` in spec (500 MiB).
    pub max_buffer_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 500 * 1024 * 1024,
        }
    }
}

/// `AppendQueue` tuning (spec §4.6).
#[derive(Debug, Clone)]
pub struct AppendQueueConfig {
    /// How much buffer behind the playhead survives a quota eviction.
    pub keep_behind: Duration,
    /// Hard ceiling on total buffered duration before evicting from the tail too.
    pub buffer_max: Duration,
    /// Producer keeps feeding while buffered-ahead is below this.
    pub buffer_ahead_limit: Duration,
    /// Delay before retrying a chunk rejected with `QuotaExceeded`.
    pub quota_retry_delay: Duration,
}

impl Default for AppendQueueConfig {
    fn default() -> Self {
        Self {
            keep_behind: Duration::from_secs(10),
            buffer_max: Duration::from_secs(60),
            buffer_ahead_limit: Duration::from_secs(30),
            quota_retry_delay: Duration::from_millis(100),
        }
    }
}

/// `StreamSession` state-machine tuning (spec §4.7).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub live_refresh_interval: Duration,
    /// Grace period after the first segment lands before signalling playback start.
    pub playback_start_grace: Duration,
    /// Fixed delay before retrying the same segment after a transient fetch
    /// exhausts `FetchConfig::max_retries` (spec §4.7 step 6; see
    /// SPEC_FULL.md Open Question 2 for why this differs from `FetchConfig::backoff_base`).
    pub retry_segment_delay: Duration,
    /// How long the download loop sleeps before re-checking `needs_more_data()`.
    pub backpressure_poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            live_refresh_interval: Duration::from_millis(4_000),
            playback_start_grace: Duration::from_millis(500),
            retry_segment_delay: Duration::from_secs(2),
            backpressure_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Aggregate configuration handed to a `StreamSession` at creation time.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub fetch: FetchConfig,
    pub estimator: EstimatorConfig,
    pub abr: AbrConfig,
    pub store: StoreConfig,
    pub append_queue: AppendQueueConfig,
    pub session: SessionConfig,
}
