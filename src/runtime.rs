//! Seams to the headset runtime: frame source, settings store, registration.
//!
//! The core only talks to these traits. `HeadlessRuntime` is an in-memory
//! stand-in used when no headset runtime is attached.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{BrightnessError, Result};
use crate::gain::GainRange;
use crate::gpu::GpuContext;

/// One frame borrowed from the surface source for a single tick
pub struct SourceImage {
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl SourceImage {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Supplies the current composited eye image
pub trait SurfaceSource {
    fn acquire(&mut self, ctx: &GpuContext) -> Result<SourceImage>;
}

/// Receives the target gain every tick
pub trait BrightnessSink {
    fn apply_gain(&mut self, gain: f32) -> Result<()>;
}

/// Key/value settings of the headset runtime
pub trait SettingsStore {
    fn set_float(
        &mut self,
        section: &str,
        key: &str,
        value: f32,
    ) -> std::result::Result<(), String>;
    fn get_float(&self, section: &str, key: &str) -> Option<f32>;
}

/// Application registration with the headset runtime
pub trait AppRegistry {
    fn is_installed(&self, app_key: &str) -> bool;
    fn add_manifest(&mut self, manifest: &Path) -> std::result::Result<(), String>;
    fn set_auto_launch(&mut self, app_key: &str, enabled: bool) -> std::result::Result<(), String>;
}

/// Writes the gain into a fixed section/key of a [`SettingsStore`]
pub struct SettingsSink<S: SettingsStore> {
    store: S,
    section: String,
    key: String,
    range: GainRange,
}

impl<S: SettingsStore> SettingsSink<S> {
    pub fn new(
        store: S,
        section: impl Into<String>,
        key: impl Into<String>,
        range: GainRange,
    ) -> Self {
        Self {
            store,
            section: section.into(),
            key: key.into(),
            range,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SettingsStore> BrightnessSink for SettingsSink<S> {
    fn apply_gain(&mut self, gain: f32) -> Result<()> {
        let clamped = self.range.clamp(gain);
        self.store
            .set_float(&self.section, &self.key, clamped)
            .map_err(BrightnessError::Settings)
    }
}

/// Registers the app for auto-launch if the runtime doesn't know it yet.
///
/// Failures are logged and swallowed; startup continues either way.
/// Returns whether the app ended up registered.
pub fn register_auto_launch<R: AppRegistry>(
    registry: &mut R,
    app_key: &str,
    manifest: &Path,
) -> bool {
    if registry.is_installed(app_key) {
        log::debug!("{} already registered", app_key);
        return true;
    }

    if let Err(e) = registry.add_manifest(manifest) {
        log::warn!("Failed to add application manifest {}: {}", manifest.display(), e);
        return false;
    }

    match registry.set_auto_launch(app_key, true) {
        Ok(()) => {
            log::info!("Registered {} for auto-launch", app_key);
            true
        }
        Err(e) => {
            log::warn!("Failed to enable auto-launch for {}: {}", app_key, e);
            false
        }
    }
}

/// In-memory settings and registry, for running without a headset runtime
#[derive(Debug, Default)]
pub struct HeadlessRuntime {
    settings: HashMap<(String, String), f32>,
    manifests: Vec<String>,
    auto_launch: HashMap<String, bool>,
}

impl HeadlessRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_auto_launch(&self, app_key: &str) -> bool {
        self.auto_launch.get(app_key).copied().unwrap_or(false)
    }
}

impl SettingsStore for HeadlessRuntime {
    fn set_float(
        &mut self,
        section: &str,
        key: &str,
        value: f32,
    ) -> std::result::Result<(), String> {
        log::debug!("{}/{} = {:.4}", section, key, value);
        self.settings.insert((section.to_string(), key.to_string()), value);
        Ok(())
    }

    fn get_float(&self, section: &str, key: &str) -> Option<f32> {
        self.settings.get(&(section.to_string(), key.to_string())).copied()
    }
}

impl AppRegistry for HeadlessRuntime {
    fn is_installed(&self, app_key: &str) -> bool {
        self.auto_launch.contains_key(app_key)
    }

    fn add_manifest(&mut self, manifest: &Path) -> std::result::Result<(), String> {
        self.manifests.push(manifest.display().to_string());
        Ok(())
    }

    fn set_auto_launch(&mut self, app_key: &str, enabled: bool) -> std::result::Result<(), String> {
        if self.manifests.is_empty() {
            return Err(format!("no manifest registered for {}", app_key));
        }
        self.auto_launch.insert(app_key.to_string(), enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SETTINGS_KEY, SETTINGS_SECTION};

    struct RejectingRegistry {
        manifest_attempts: usize,
    }

    impl AppRegistry for RejectingRegistry {
        fn is_installed(&self, _app_key: &str) -> bool {
            false
        }

        fn add_manifest(&mut self, _manifest: &Path) -> std::result::Result<(), String> {
            self.manifest_attempts += 1;
            Err("manifest not found".to_string())
        }

        fn set_auto_launch(
            &mut self,
            _app_key: &str,
            _enabled: bool,
        ) -> std::result::Result<(), String> {
            panic!("auto-launch must not be touched after a manifest failure");
        }
    }

    #[test]
    fn test_settings_sink_clamps_before_writing() {
        let mut sink = SettingsSink::new(
            HeadlessRuntime::new(),
            SETTINGS_SECTION,
            SETTINGS_KEY,
            GainRange::default(),
        );

        sink.apply_gain(2.2).unwrap();
        assert_eq!(sink.store().get_float("steamvr", "analogGain"), Some(1.6));

        sink.apply_gain(0.0).unwrap();
        assert_eq!(sink.store().get_float("steamvr", "analogGain"), Some(0.028));

        sink.apply_gain(0.5).unwrap();
        assert_eq!(sink.store().get_float("steamvr", "analogGain"), Some(0.5));
    }

    #[test]
    fn test_register_auto_launch_once() {
        let mut runtime = HeadlessRuntime::new();
        let manifest = Path::new("AdaptiveBrightness.vrmanifest");

        assert!(register_auto_launch(&mut runtime, "app.key", manifest));
        assert!(runtime.is_auto_launch("app.key"));

        // Second call sees it installed and does not add another manifest
        assert!(register_auto_launch(&mut runtime, "app.key", manifest));
        assert_eq!(runtime.manifests.len(), 1);
    }

    #[test]
    fn test_register_failure_is_tolerated() {
        let mut registry = RejectingRegistry { manifest_attempts: 0 };
        assert!(!register_auto_launch(&mut registry, "app.key", Path::new("missing.vrmanifest")));
        assert_eq!(registry.manifest_attempts, 1);
    }
}
