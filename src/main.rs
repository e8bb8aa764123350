mod config;
mod control;
mod cpu;
mod error;
mod gain;
mod gpu;
mod runtime;


use std::path::PathBuf;

use config::{APP_KEY, APP_MANIFEST, BrightnessConfig};
use control::{ControlLoop, ShutdownSignal};
use error::Result;
use gain::{GainMapper, GainRange};
use gpu::{GpuProbe, KernelLocator, SyntheticSurface};
use runtime::{HeadlessRuntime, SettingsSink, SettingsStore};

/// Eye texture size used when no compositor is attached
const HEADLESS_EYE_SIZE: (u32, u32) = (2016, 2240);

fn main() {
    env_logger::init();

    let shutdown = ShutdownSignal::new();
    let handler_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_signal.trigger()) {
        log::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    if let Err(e) = run(&BrightnessConfig::default(), &shutdown) {
        log::error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

/// The runtime wants the manifest by absolute path
fn manifest_path() -> PathBuf {
    match std::env::current_dir() {
        Ok(dir) => dir.join(APP_MANIFEST),
        Err(e) => {
            log::warn!("Failed to read working directory: {}", e);
            PathBuf::from(APP_MANIFEST)
        }
    }
}

fn run(config: &BrightnessConfig, shutdown: &ShutdownSignal) -> Result<()> {
    let mut headset = HeadlessRuntime::new();
    runtime::register_auto_launch(&mut headset, APP_KEY, &manifest_path());

    let (width, height) = HEADLESS_EYE_SIZE;
    let surface = SyntheticSurface::sweeping(width, height, 0, 1);
    let probe = GpuProbe::new(config, &KernelLocator::default(), surface)?;

    let range = GainRange::new(config.gain_range.0, config.gain_range.1);
    let (section, key) = (&config.settings_section, &config.settings_key);
    let sink = SettingsSink::new(headset, section, key, range);

    let mut control = ControlLoop::new(probe, sink, GainMapper::new(range), config.period());
    let stats = control.run(shutdown)?;

    let (probe, sink) = control.into_parts();
    // Release the device before exit
    drop(probe);

    match (stats.last_gain, sink.store().get_float(section, key)) {
        (Some(target), Some(stored)) => {
            log::info!("Last target gain {:.4}, {}/{} = {:.4}", target, section, key, stored)
        }
        _ => log::info!("No gain was applied"),
    }
    Ok(())
}
