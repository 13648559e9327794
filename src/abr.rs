//! ABRController (spec §4.4): variant selection from estimator + buffer
//! level, with hysteresis.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bandwidth::BandwidthEstimator;
use crate::config::AbrConfig;
use crate::playlist::Variant;

/// Selects a variant index from a bitrate-ascending list of variants.
pub struct AbrController {
    config: AbrConfig,
    estimator: Arc<BandwidthEstimator>,
    variants_ascending_bitrates: Vec<u64>,
    current_index: usize,
    last_switch: Option<Instant>,
    /// `set_quality(variant_ix)` pins selection; `None` means "auto".
    locked: Option<usize>,
}

impl AbrController {
    /// `variants` must already be sorted ascending by bitrate; the spec's
    /// `PlaylistSnapshot.variants` is descending, so callers reverse before
    /// constructing this.
    pub fn new(variants: &[Variant], config: AbrConfig, estimator: Arc<BandwidthEstimator>) -> Self {
        let variants_ascending_bitrates = variants.iter().map(|v| v.bitrate_bps).collect();
        Self {
            config,
            estimator,
            variants_ascending_bitrates,
            current_index: 0,
            last_switch: None,
            locked: None,
        }
    }

    pub fn current_index(&self) -> usize {
        self.locked.unwrap_or(self.current_index)
    }

    pub fn set_locked(&mut self, index: Option<usize>) {
        self.locked = index.map(|i| i.min(self.variants_ascending_bitrates.len().saturating_sub(1)));
    }

    /// Run one decision step (spec §4.4 algorithm). `StreamSession::resolve`
    /// also uses this for the initial pick, passing `buffer = Duration::ZERO`
    /// — the panic-buffer branch then always selects the lowest variant on
    /// cold start, which is ABR's initial choice per spec §4.7 `Resolving`.
    pub fn decide(&mut self, buffer: Duration, now: Instant) -> usize {
        if let Some(locked) = self.locked {
            return locked;
        }

        if self.variants_ascending_bitrates.is_empty() {
            return 0;
        }

        let hysteresis_active = self
            .last_switch
            .is_some_and(|last| now.duration_since(last) < self.config.switch_interval);
        if hysteresis_active && buffer > self.config.panic_buffer {
            return self.current_index;
        }

        let ema = self.estimator.ema();
        let safe_bw = self.config.safety_factor * ema;
        let mut target = self.largest_index_within(safe_bw);

        if buffer < self.config.panic_buffer {
            target = 0;
        } else if buffer > self.config.rich_buffer {
            if let Some(next_bitrate) = self.variants_ascending_bitrates.get(target + 1) {
                if (*next_bitrate as f64) < self.config.step_up_factor * ema {
                    target += 1;
                }
            }
        }

        if target != self.current_index {
            self.current_index = target;
            self.last_switch = Some(now);
        }

        self.current_index
    }

    fn largest_index_within(&self, safe_bw: f64) -> usize {
        self.variants_ascending_bitrates
            .iter()
            .enumerate()
            .rev()
            .find(|(_, bitrate)| (**bitrate as f64) <= safe_bw)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(bitrate: u64) -> Variant {
        Variant {
            url: format!("{bitrate}.m3u8"),
            bitrate_bps: bitrate,
            resolution: None,
            codecs: None,
        }
    }

    fn controller(bitrates: &[u64]) -> (AbrController, Arc<BandwidthEstimator>) {
        let variants: Vec<Variant> = bitrates.iter().map(|b| variant(*b)).collect();
        let estimator = Arc::new(BandwidthEstimator::default());
        let ctrl = AbrController::new(&variants, AbrConfig::default(), Arc::clone(&estimator));
        (ctrl, estimator)
    }

    #[test]
    fn with_no_samples_ema_is_infinite_so_safe_bw_never_caps_selection() {
        // Matches spec §4.3: empty window -> ema() = +inf, so safe_bw is
        // +inf and largest_index_within picks the top variant. A cold-start
        // caller instead passes buffer=0, which forces the panic-buffer
        // branch below regardless of this (see `decide`'s doc comment).
        let (mut ctrl, _est) = controller(&[1_000_000, 2_000_000, 5_000_000]);
        let idx = ctrl.decide(Duration::from_secs(20), Instant::now());
        assert_eq!(idx, 2);
    }

    #[test]
    fn panic_buffer_forces_lowest_variant() {
        let (mut ctrl, est) = controller(&[1_000_000, 2_000_000, 5_000_000]);
        est.report(5_000_000 / 8, 1000); // ~5 Mbps ema after seed
        let idx = ctrl.decide(Duration::from_secs(2), Instant::now());
        assert_eq!(idx, 0);
    }

    #[test]
    fn safe_bandwidth_caps_selection_at_eighty_percent() {
        let (mut ctrl, est) = controller(&[1_000_000, 2_000_000, 5_000_000]);
        est.report(2_500_000 / 8, 1000); // ema ~= 2.5 Mbps, safe_bw = 2.0 Mbps
        let idx = ctrl.decide(Duration::from_secs(20), Instant::now());
        assert_eq!(idx, 1);
    }

    #[test]
    fn rich_buffer_steps_up_only_when_next_variant_is_comfortably_affordable() {
        let (mut ctrl, est) = controller(&[1_000_000, 2_000_000, 5_000_000]);
        est.report(6_000_000 / 8, 1000); // ema ~= 6 Mbps
        let idx = ctrl.decide(Duration::from_secs(65), Instant::now());
        // safe_bw = 4.8M -> caps at index 1 (2M); rich buffer steps to index
        // 2 only if variants[2]=5M < 1.1*6M=6.6M, which holds.
        assert_eq!(idx, 2);
    }

    #[test]
    fn hysteresis_blocks_a_second_switch_within_the_interval_unless_panicking() {
        let (mut ctrl, est) = controller(&[1_000_000, 2_000_000, 5_000_000]);
        est.report(2_500_000 / 8, 1000);
        let t0 = Instant::now();
        let first = ctrl.decide(Duration::from_secs(20), t0);
        assert_eq!(first, 1);

        // Bandwidth improves immediately after, but switchInterval hasn't elapsed.
        est.report(6_000_000 / 8, 1000);
        let second = ctrl.decide(Duration::from_secs(20), t0 + Duration::from_millis(500));
        assert_eq!(second, 1, "hysteresis should hold the prior index");

        // Invariant 4: a switch within switchInterval is only allowed when
        // panicking.
        let third = ctrl.decide(Duration::from_secs(1), t0 + Duration::from_millis(800));
        assert_eq!(third, 0);
    }

    #[test]
    fn locked_index_overrides_everything() {
        let (mut ctrl, est) = controller(&[1_000_000, 2_000_000, 5_000_000]);
        est.report(6_000_000 / 8, 1000);
        ctrl.set_locked(Some(0));
        let idx = ctrl.decide(Duration::from_secs(65), Instant::now());
        assert_eq!(idx, 0);
    }
}
