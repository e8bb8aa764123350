//! GPU-backed brightness probe: surface + reduction pipeline on one device

use super::context::GpuContext;
use super::kernel::{KernelLocator, LuminanceKernel};
use super::reduction::{Measurement, ReductionPipeline};
use super::synthetic::SyntheticSurface;
use crate::config::{BrightnessConfig, SamplingConfig};
use crate::control::{BrightnessProbe, BrightnessSample, ShutdownSignal};
use crate::cpu;
use crate::error::Result;
use crate::runtime::SurfaceSource;

pub struct GpuProbe<S: SurfaceSource> {
    // Field order is drop order: pipeline resources go before the device
    pipeline: ReductionPipeline,
    surface: S,
    ctx: GpuContext,
}

impl<S: SurfaceSource> GpuProbe<S> {
    /// Device, kernel, buffers, kernel self-check, then the first frame to
    /// size the grid. Any failure here is fatal.
    pub fn new(config: &BrightnessConfig, locator: &KernelLocator, mut surface: S) -> Result<Self> {
        let ctx = GpuContext::new()?;
        let kernel = LuminanceKernel::new(&ctx, locator)?;
        let mut pipeline = ReductionPipeline::new(
            &ctx,
            kernel,
            config.sampling,
            config.fence_timeout,
            config.fence_poll_interval,
        )?;

        verify_kernel(&ctx, &mut pipeline, &config.sampling)?;

        let image = surface.acquire(&ctx)?;
        pipeline.prepare(&ctx, &image)?;

        Ok(Self { pipeline, surface, ctx })
    }

    #[cfg(test)]
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Acquire the current frame and reduce it
    pub fn measure(&mut self, shutdown: &ShutdownSignal) -> Result<Measurement> {
        let image = self.surface.acquire(&self.ctx)?;
        self.pipeline.measure(&self.ctx, &image, shutdown)
    }
}

/// Reduce a known gray frame and compare against the CPU reference.
///
/// A kernel picked up from disk may not be the one this build ships with;
/// a mismatch is logged, not fatal. The calibration grid is dropped
/// afterwards so the first real frame is not reported as a resize.
fn verify_kernel(
    ctx: &GpuContext,
    pipeline: &mut ReductionPipeline,
    sampling: &SamplingConfig,
) -> Result<()> {
    let (width, height) = (64, 64);
    let mut calibration = SyntheticSurface::uniform(width, height, 128);
    let image = calibration.acquire(ctx)?;
    let measured = pipeline.measure(ctx, &image, &ShutdownSignal::new())?;

    let expected = cpu::reference_sum(
        &calibration.pixels(),
        width,
        height,
        &measured.grid,
        sampling.downsample,
        sampling.brightness_scale,
    );
    if measured.combined as u64 == expected {
        log::debug!("Kernel self-check passed ({})", expected);
    } else {
        log::warn!(
            "Kernel self-check mismatch: GPU {} vs CPU reference {}",
            measured.combined,
            expected
        );
    }
    pipeline.reset_grid();
    Ok(())
}

impl<S: SurfaceSource> BrightnessProbe for GpuProbe<S> {
    fn sample(&mut self, shutdown: &ShutdownSignal) -> Result<BrightnessSample> {
        let measurement = self.measure(shutdown)?;
        Ok(BrightnessSample {
            combined: measurement.combined,
            sampled_width: measurement.grid.sampled.0,
            sampled_height: measurement.grid.sampled.1,
        })
    }
}

impl<S: SurfaceSource> Drop for GpuProbe<S> {
    fn drop(&mut self) {
        log::debug!("Releasing GPU resources on {}", self.ctx.adapter_info.name);
    }
}
