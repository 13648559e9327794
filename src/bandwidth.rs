//! BandwidthEstimator (spec §4.3): EMA + rolling-window percentile from a
//! sample stream. Grounded on the teacher's `PerformanceMetrics`: atomics and
//! a `parking_lot::Mutex` guarding the small bits that need a real lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::EstimatorConfig;

/// One bandwidth sample: `{bps, t}` in spec §3.
#[derive(Debug, Clone, Copy)]
pub struct BandwidthSample {
    pub bps: f64,
    pub t: Instant,
}

struct Window {
    samples: VecDeque<BandwidthSample>,
    capacity: usize,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: BandwidthSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

/// Exponential moving average over bandwidth samples reported by completed
/// fetches, plus percentile queries over the rolling window.
pub struct BandwidthEstimator {
    config: EstimatorConfig,
    window: Mutex<Window>,
    /// EMA stored as bits since `AtomicU64` has no native f64 variant.
    ema_bits: AtomicU64,
    has_sample: std::sync::atomic::AtomicBool,
}

impl BandwidthEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let capacity = config.window_capacity;
        Self {
            config,
            window: Mutex::new(Window::new(capacity)),
            ema_bits: AtomicU64::new(0),
            has_sample: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Record a completed fetch: `bps = 8*bytes/(dt_ms/1000)`.
    pub fn report(&self, bytes: usize, dt_ms: u64) {
        let dt_ms = dt_ms.max(1);
        let bps = 8.0 * bytes as f64 / (dt_ms as f64 / 1000.0);
        self.report_bps(bps);
    }

    fn report_bps(&self, bps: f64) {
        self.window.lock().push(BandwidthSample {
            bps,
            t: Instant::now(),
        });

        let updated = if self.has_sample.swap(true, Ordering::AcqRel) {
            let prev = f64::from_bits(self.ema_bits.load(Ordering::Acquire));
            self.config.ema_alpha * bps + (1.0 - self.config.ema_alpha) * prev
        } else {
            bps
        };
        self.ema_bits.store(updated.to_bits(), Ordering::Release);
    }

    /// Current EMA in bits per second. `+inf` when no samples yet (spec
    /// §4.3: ABR's safety factor of 0 then steers selection to the lowest
    /// bitrate regardless).
    pub fn ema(&self) -> f64 {
        if self.has_sample.load(Ordering::Acquire) {
            f64::from_bits(self.ema_bits.load(Ordering::Acquire))
        } else {
            f64::INFINITY
        }
    }

    /// Percentile `p` (`0.0..=1.0`) over the current window, sorted
    /// ascending. `+inf` when the window is empty.
    pub fn percentile(&self, p: f64) -> f64 {
        let window = self.window.lock();
        if window.samples.is_empty() {
            return f64::INFINITY;
        }
        let mut values: Vec<f64> = window.samples.iter().map(|s| s.bps).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let p = p.clamp(0.0, 1.0);
        let idx = ((values.len() - 1) as f64 * p).round() as usize;
        values[idx]
    }

    pub fn sample_count(&self) -> usize {
        self.window.lock().samples.len()
    }

    /// Age of the oldest sample still in the window, if any.
    pub fn oldest_sample_age(&self) -> Option<Duration> {
        self.window.lock().samples.front().map(|s| s.t.elapsed())
    }
}

impl Default for BandwidthEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}
