//! Brightness → analog gain response curve
//!
//! The accumulator holds `round(luma * 100)` summed over every sample, so
//! `combined * 10 / samples / 1000` brings it back to an average luma in
//! [0, 1]. That average is doubled into a "percent" and pushed through a
//! hand-tuned cubic.

use crate::config::{MAX_ANALOG_GAIN, MIN_ANALOG_GAIN};

/// Inclusive range the headset accepts for its analog gain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRange {
    pub min: f32,
    pub max: f32,
}

impl Default for GainRange {
    fn default() -> Self {
        Self {
            min: MIN_ANALOG_GAIN,
            max: MAX_ANALOG_GAIN,
        }
    }
}

impl GainRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, gain: f32) -> f32 {
        gain.clamp(self.min, self.max)
    }
}

/// Average luma of the sampled region, truncated to 0.001 steps.
/// Zero samples reads as black.
pub fn average_brightness(combined: u32, sampled_width: u32, sampled_height: u32) -> f32 {
    let samples = sampled_width as u64 * sampled_height as u64;
    if samples == 0 {
        return 0.0;
    }
    // Integer per-mille first, widened so `combined * 10` cannot overflow
    let per_mille = combined as u64 * 10 / samples;
    per_mille as f32 / 1000.0
}

/// Empirical perceptual response. Not clamped.
pub fn percent_to_gain(percent: f32) -> f32 {
    0.1 * (2.0 * percent).powi(3) + 0.3 * (2.0 * percent).powi(2) + 0.2 * percent
}

/// Maps a combined accumulator value to a clamped target gain
#[derive(Debug, Clone, Copy, Default)]
pub struct GainMapper {
    range: GainRange,
}

impl GainMapper {
    pub fn new(range: GainRange) -> Self {
        Self { range }
    }

    pub fn target_gain(&self, combined: u32, sampled_width: u32, sampled_height: u32) -> f32 {
        let average = average_brightness(combined, sampled_width, sampled_height);
        self.range.clamp(percent_to_gain(average * 2.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bright_frame_clamps_to_max() {
        // 500000 * 10 / 10000 / 1000 = 0.5 → percent 1.0 → 0.8 + 1.2 + 0.2 = 2.2
        assert!((average_brightness(500_000, 100, 100) - 0.5).abs() < 1e-6);
        assert!((percent_to_gain(1.0) - 2.2).abs() < 1e-5);

        let mapper = GainMapper::default();
        assert_eq!(mapper.target_gain(500_000, 100, 100), 1.6);
    }

    #[test]
    fn test_black_frame_clamps_to_min() {
        let mapper = GainMapper::default();
        assert_eq!(percent_to_gain(0.0), 0.0);
        assert_eq!(mapper.target_gain(0, 100, 100), 0.028);
    }

    #[test]
    fn test_mid_range_is_unclamped() {
        // average 0.1 → percent 0.2 → 0.1*0.064 + 0.3*0.16 + 0.04 = 0.0944
        let mapper = GainMapper::default();
        let gain = mapper.target_gain(100_000, 100, 100);
        assert!((gain - 0.0944).abs() < 1e-5, "gain = {}", gain);
    }

    #[test]
    fn test_average_truncates_to_per_mille() {
        // 1234560 / 10000 = 123 in integer steps, not 123.456
        assert_eq!(average_brightness(123_456, 100, 100), 0.123);
        let gain = GainMapper::default().target_gain(123_456, 100, 100);
        assert!((gain - percent_to_gain(0.246)).abs() < 1e-6, "gain = {}", gain);

        // combined * 10 would overflow u32 here
        assert_eq!(average_brightness(u32::MAX, 1 << 16, 1 << 16), 0.009);
    }

    #[test]
    fn test_zero_samples_reads_as_black() {
        assert_eq!(average_brightness(12345, 0, 480), 0.0);
        assert_eq!(GainMapper::default().target_gain(12345, 0, 0), 0.028);
    }

    #[test]
    fn test_deterministic_and_in_range() {
        let mapper = GainMapper::default();
        let dims = [(1, 1), (16, 9), (504, 560), (2016, 2240)];
        for &(w, h) in &dims {
            for combined in (0..=u32::MAX).step_by(1 << 26).chain([u32::MAX]) {
                let a = mapper.target_gain(combined, w, h);
                let b = mapper.target_gain(combined, w, h);
                assert_eq!(a.to_bits(), b.to_bits());
                assert!((0.028..=1.6).contains(&a), "{} out of range for {}x{}", a, w, h);
            }
        }
    }

    #[test]
    fn test_curve_is_monotonic() {
        let mut prev = percent_to_gain(0.0);
        for i in 1..=200 {
            let next = percent_to_gain(i as f32 / 100.0);
            assert!(next >= prev);
            prev = next;
        }
    }
}
