//! Compiled-in tuning constants and the configuration built from them

use std::time::Duration;

/// Control loop frequency in Hz
pub const TARGET_FREQUENCY_HZ: f64 = 30.0;

/// Only every Nth texel along each axis is sampled; we only need an average
pub const DOWNSAMPLE: u32 = 4;

/// Crop divisor per axis. 1 samples the whole frame, 2 the central half.
pub const CROP: (u32, u32) = (1, 1);

/// Must match `@workgroup_size` in `luminance.wgsl`
pub const THREADS_PER_GROUP: (u32, u32) = (16, 16);

/// Luma in [0, 1] is scaled by this before the atomic add
pub const BRIGHTNESS_SCALE: u32 = 100;

/// Supported headset display analog gain range
pub const MIN_ANALOG_GAIN: f32 = 0.028;
pub const MAX_ANALOG_GAIN: f32 = 1.6;

pub const SETTINGS_SECTION: &str = "steamvr";
pub const SETTINGS_KEY: &str = "analogGain";

pub const APP_KEY: &str = "virus.adaptiveBrightness";
pub const APP_MANIFEST: &str = "AdaptiveBrightness.vrmanifest";

/// How the reduction samples the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingConfig {
    pub downsample: u32,
    pub crop: (u32, u32),
    pub threads_per_group: (u32, u32),
    pub brightness_scale: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            downsample: DOWNSAMPLE,
            crop: CROP,
            threads_per_group: THREADS_PER_GROUP,
            brightness_scale: BRIGHTNESS_SCALE,
        }
    }
}

/// Top-level configuration for the brightness loop
#[derive(Debug, Clone)]
pub struct BrightnessConfig {
    /// Ticks per second
    pub target_frequency: f64,
    pub sampling: SamplingConfig,
    /// Inclusive gain clamp (min, max)
    pub gain_range: (f32, f32),
    /// Upper bound on a single GPU completion wait
    pub fence_timeout: Duration,
    /// Sleep between completion polls
    pub fence_poll_interval: Duration,
    pub settings_section: String,
    pub settings_key: String,
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            target_frequency: TARGET_FREQUENCY_HZ,
            sampling: SamplingConfig::default(),
            gain_range: (MIN_ANALOG_GAIN, MAX_ANALOG_GAIN),
            fence_timeout: Duration::from_secs(2),
            fence_poll_interval: Duration::from_micros(100),
            settings_section: SETTINGS_SECTION.to_string(),
            settings_key: SETTINGS_KEY.to_string(),
        }
    }
}

impl BrightnessConfig {
    /// Length of one tick
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_period_is_30hz() {
        let period = BrightnessConfig::default().period();
        let expected_us = 1_000_000.0 / 30.0;
        assert!((period.as_micros() as f64 - expected_us).abs() < 1.0);
    }
}
