//! Self-pacing control loop: sample → gain → sink, at a fixed frequency

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{BrightnessError, Result};
use crate::gain::GainMapper;
use crate::runtime::BrightnessSink;

/// Cooperative shutdown flag, cheap to clone across threads
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Raw accumulator value and the sampled region it was summed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrightnessSample {
    pub combined: u32,
    pub sampled_width: u32,
    pub sampled_height: u32,
}

/// Produces one brightness sample of the current frame
pub trait BrightnessProbe {
    fn sample(&mut self, shutdown: &ShutdownSignal) -> Result<BrightnessSample>;
}

/// Remaining time in the period after a tick took `elapsed`.
/// `None` when the tick overran and the loop should proceed immediately.
pub fn compensated_sleep(period: Duration, elapsed: Duration) -> Option<Duration> {
    period.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// What a single tick did
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub sample: BrightnessSample,
    pub gain: f32,
    pub sink_ok: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStats {
    pub ticks: u64,
    /// Ticks that took a full period or longer
    pub overruns: u64,
    pub sink_failures: u64,
    pub last_gain: Option<f32>,
}

pub struct ControlLoop<P: BrightnessProbe, K: BrightnessSink> {
    probe: P,
    sink: K,
    mapper: GainMapper,
    period: Duration,
    stats: LoopStats,
}

impl<P: BrightnessProbe, K: BrightnessSink> ControlLoop<P, K> {
    pub fn new(probe: P, sink: K, mapper: GainMapper, period: Duration) -> Self {
        Self {
            probe,
            sink,
            mapper,
            period,
            stats: LoopStats::default(),
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    #[cfg(test)]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Hand back the probe and sink, e.g. to release GPU resources explicitly
    pub fn into_parts(self) -> (P, K) {
        (self.probe, self.sink)
    }

    /// One measurement and gain update, without pacing
    pub fn tick(&mut self, shutdown: &ShutdownSignal) -> Result<TickReport> {
        let sample = self.probe.sample(shutdown)?;
        let gain = self
            .mapper
            .target_gain(sample.combined, sample.sampled_width, sample.sampled_height);

        let sink_ok = match self.sink.apply_gain(gain) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}", e);
                self.stats.sink_failures += 1;
                false
            }
        };

        self.stats.ticks += 1;
        self.stats.last_gain = Some(gain);

        Ok(TickReport { sample, gain, sink_ok })
    }

    /// Run until `shutdown` is triggered or a fatal error occurs
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> Result<LoopStats> {
        log::info!("Brightness loop running at {:.1} Hz", 1.0 / self.period.as_secs_f64());

        while !shutdown.is_triggered() {
            let tick_start = Instant::now();

            match self.tick(shutdown) {
                Ok(report) => log::debug!(
                    "Combined brightness {} -> gain {:.4}{}",
                    report.sample.combined,
                    report.gain,
                    if report.sink_ok { "" } else { " (not applied)" }
                ),
                Err(BrightnessError::Cancelled) => break,
                Err(e) => return Err(e),
            }

            let elapsed = tick_start.elapsed();
            match compensated_sleep(self.period, elapsed) {
                Some(remaining) => std::thread::sleep(remaining),
                None => {
                    log::trace!("Tick overran period: {:?}", elapsed);
                    self.stats.overruns += 1;
                }
            }
        }

        log::info!(
            "Brightness loop stopped after {} ticks ({} overruns, {} sink failures)",
            self.stats.ticks,
            self.stats.overruns,
            self.stats.sink_failures
        );
        Ok(self.stats)
    }
}
