//! Reduction pipeline: clear → dispatch → fenced readback of one u32

use std::sync::mpsc::{self, TryRecvError};
use std::time::{Duration, Instant};

use super::context::GpuContext;
use super::kernel::LuminanceKernel;
use crate::config::SamplingConfig;
use crate::control::ShutdownSignal;
use crate::error::{BrightnessError, Result};
use crate::runtime::SourceImage;

const ACCUMULATOR_SIZE: u64 = std::mem::size_of::<u32>() as u64;

/// Uniform data sent to the luminance shader
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ReductionUniforms {
    pub origin: [u32; 2],
    pub sampled: [u32; 2],
    pub downsample: u32,
    pub scale: u32,
    pub _padding: [u32; 2],
}

/// Thread groups needed to cover the cropped, downsampled region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    /// Source texture size this grid was computed for
    pub source: (u32, u32),
    /// Top-left texel of the centered crop
    pub origin: (u32, u32),
    /// Samples per axis after crop and downsample
    pub sampled: (u32, u32),
    pub groups: (u32, u32),
}

impl DispatchGrid {
    pub fn new(width: u32, height: u32, sampling: &SamplingConfig) -> Self {
        let downsample = sampling.downsample.max(1);
        let axis = |dim: u32, crop: u32, threads: u32| {
            let extent = dim.div_ceil(crop.max(1));
            let origin = (dim - extent) / 2;
            let sampled = extent.div_ceil(downsample);
            (origin, sampled, sampled.div_ceil(threads.max(1)))
        };

        let (threads_x, threads_y) = sampling.threads_per_group;
        let (origin_x, sampled_x, groups_x) = axis(width, sampling.crop.0, threads_x);
        let (origin_y, sampled_y, groups_y) = axis(height, sampling.crop.1, threads_y);

        Self {
            source: (width, height),
            origin: (origin_x, origin_y),
            sampled: (sampled_x, sampled_y),
            groups: (groups_x, groups_y),
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.sampled.0 as u64 * self.sampled.1 as u64
    }

    pub fn uniforms(&self, sampling: &SamplingConfig) -> ReductionUniforms {
        ReductionUniforms {
            origin: [self.origin.0, self.origin.1],
            sampled: [self.sampled.0, self.sampled.1],
            downsample: sampling.downsample.max(1),
            scale: sampling.brightness_scale,
            _padding: [0; 2],
        }
    }
}

/// One readback of the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub combined: u32,
    pub grid: DispatchGrid,
}

/// Completion handle for a pending staging-buffer map.
///
/// Signalled by the `map_async` callback once the GPU has finished every
/// command submitted before it.
pub struct CompletionFence {
    receiver: mpsc::Receiver<std::result::Result<(), wgpu::BufferAsyncError>>,
}

impl CompletionFence {
    /// Request a read mapping of `slice`. Must follow the submit it waits on.
    pub fn arm(slice: &wgpu::BufferSlice<'_>) -> Self {
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // Receiver is gone only if the waiter already gave up
            let _ = sender.send(result);
        });
        Self { receiver }
    }

    /// Poll the device until signalled, the timeout expires, or shutdown
    pub fn wait(
        &self,
        device: &wgpu::Device,
        timeout: Duration,
        poll_interval: Duration,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let _ = device.poll(wgpu::Maintain::Poll);

            match self.receiver.try_recv() {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => return Err(BrightnessError::BufferMap(e.to_string())),
                Err(TryRecvError::Disconnected) => {
                    return Err(BrightnessError::BufferMap("map callback dropped".to_string()));
                }
                Err(TryRecvError::Empty) => {}
            }

            if shutdown.is_triggered() {
                return Err(BrightnessError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(BrightnessError::FenceTimeout(timeout));
            }
            std::thread::sleep(poll_interval);
        }
    }
}

/// Owns the accumulator and dispatches the luminance kernel
pub struct ReductionPipeline {
    kernel: LuminanceKernel,
    sampling: SamplingConfig,

    accumulator: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,

    grid: Option<DispatchGrid>,
    fence_timeout: Duration,
    poll_interval: Duration,
}

impl ReductionPipeline {
    pub fn new(
        ctx: &GpuContext,
        kernel: LuminanceKernel,
        sampling: SamplingConfig,
        fence_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        let (accumulator, staging_buffer, uniform_buffer) = ctx
            .validated(|device| {
                let accumulator = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Accumulator Buffer"),
                    size: ACCUMULATOR_SIZE,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_SRC
                        | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Accumulator Staging Buffer"),
                    size: ACCUMULATOR_SIZE,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Luminance Uniform Buffer"),
                    size: std::mem::size_of::<ReductionUniforms>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });

                (accumulator, staging_buffer, uniform_buffer)
            })
            .map_err(BrightnessError::BufferCreation)?;

        Ok(Self {
            kernel,
            sampling,
            accumulator,
            staging_buffer,
            uniform_buffer,
            grid: None,
            fence_timeout,
            poll_interval,
        })
    }

    /// Forget the current grid so the next frame is sized without a resize notice
    pub fn reset_grid(&mut self) {
        self.grid = None;
    }

    #[cfg(test)]
    pub fn grid(&self) -> Option<DispatchGrid> {
        self.grid
    }

    /// Validate `image` and (re)compute the grid if its size changed
    pub fn prepare(&mut self, ctx: &GpuContext, image: &SourceImage) -> Result<DispatchGrid> {
        if image.width == 0 || image.height == 0 {
            return Err(BrightnessError::ResourceQuery(format!(
                "source texture is {}x{}",
                image.width, image.height
            )));
        }
        if !matches!(
            image.format.sample_type(None, None),
            Some(wgpu::TextureSampleType::Float { .. })
        ) {
            return Err(BrightnessError::UnsupportedFormat(image.format));
        }

        match self.grid {
            Some(grid) if grid.source == image.size() => Ok(grid),
            previous => {
                let grid = DispatchGrid::new(image.width, image.height, &self.sampling);
                if let Some(previous) = previous {
                    log::info!(
                        "Source resized {}x{} -> {}x{}",
                        previous.source.0,
                        previous.source.1,
                        image.width,
                        image.height
                    );
                }
                log::info!(
                    "Sampling {}x{} ({} texels) of {}x{} source in {}x{} groups",
                    grid.sampled.0,
                    grid.sampled.1,
                    grid.sample_count(),
                    image.width,
                    image.height,
                    grid.groups.0,
                    grid.groups.1
                );
                let uniforms = grid.uniforms(&self.sampling);
                ctx.queue
                    .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
                self.grid = Some(grid);
                Ok(grid)
            }
        }
    }

    /// Run one full reduction pass over `image` and read the result back
    pub fn measure(
        &mut self,
        ctx: &GpuContext,
        image: &SourceImage,
        shutdown: &ShutdownSignal,
    ) -> Result<Measurement> {
        let grid = self.prepare(ctx, image)?;

        let bind_group = ctx
            .validated(|device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Luminance Bind Group"),
                    layout: self.kernel.bind_group_layout(),
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&image.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: self.accumulator.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: self.uniform_buffer.as_entire_binding(),
                        },
                    ],
                })
            })
            .map_err(BrightnessError::ViewCreation)?;

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Luminance Compute Encoder"),
        });

        // Accumulator must be zero before every dispatch
        encoder.clear_buffer(&self.accumulator, 0, None);

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Luminance Compute Pass"),
                timestamp_writes: None,
            });

            compute_pass.set_pipeline(self.kernel.pipeline());
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(grid.groups.0, grid.groups.1, 1);
        }

        encoder.copy_buffer_to_buffer(
            &self.accumulator,
            0,
            &self.staging_buffer,
            0,
            ACCUMULATOR_SIZE,
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging_buffer.slice(..);
        let fence = CompletionFence::arm(&slice);
        fence.wait(&ctx.device, self.fence_timeout, self.poll_interval, shutdown)?;

        let combined = {
            let mapped = slice.get_mapped_range();
            if mapped.len() < ACCUMULATOR_SIZE as usize {
                None
            } else {
                Some(bytemuck::pod_read_unaligned::<u32>(&mapped[..ACCUMULATOR_SIZE as usize]))
            }
        };
        self.staging_buffer.unmap();

        let combined = combined.ok_or(BrightnessError::MappedRangeEmpty)?;
        Ok(Measurement { combined, grid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type MapSender = mpsc::Sender<std::result::Result<(), wgpu::BufferAsyncError>>;

    /// Fence with no map behind it; stays pending while the sender lives
    fn pending_fence() -> (CompletionFence, MapSender) {
        let (sender, receiver) = mpsc::channel();
        (CompletionFence { receiver }, sender)
    }

    #[test]
    fn test_fence_wait_times_out() {
        let ctx = match GpuContext::new() {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let (fence, _sender) = pending_fence();
        let timeout = Duration::from_millis(5);

        let started = Instant::now();
        let poll = Duration::from_micros(100);
        let result = fence.wait(&ctx.device, timeout, poll, &ShutdownSignal::new());
        assert_eq!(result, Err(BrightnessError::FenceTimeout(timeout)));
        assert!(started.elapsed() >= timeout);
        assert_eq!(result.unwrap_err().exit_code(), -8);
    }

    #[test]
    fn test_fence_wait_is_cancellable() {
        let ctx = match GpuContext::new() {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let (fence, _sender) = pending_fence();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        // Cancellation wins well before the long timeout
        let started = Instant::now();
        let poll = Duration::from_micros(100);
        let result = fence.wait(&ctx.device, Duration::from_secs(30), poll, &shutdown);
        assert_eq!(result, Err(BrightnessError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_fence_wait_reports_signalled_map() {
        let ctx = match GpuContext::new() {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let (timeout, poll) = (Duration::from_millis(5), Duration::from_micros(100));
        let shutdown = ShutdownSignal::new();

        let (fence, sender) = pending_fence();
        sender.send(Ok(())).unwrap();
        assert_eq!(fence.wait(&ctx.device, timeout, poll, &shutdown), Ok(()));

        let (fence, sender) = pending_fence();
        drop(sender);
        let result = fence.wait(&ctx.device, timeout, poll, &shutdown);
        assert!(matches!(result, Err(BrightnessError::BufferMap(_))));
    }

    #[test]
    fn test_grid_for_headset_eye() {
        let grid = DispatchGrid::new(2016, 2240, &SamplingConfig::default());
        assert_eq!(grid.origin, (0, 0));
        assert_eq!(grid.sampled, (504, 560));
        assert_eq!(grid.groups, (32, 35));
        assert_eq!(grid.sample_count(), 504 * 560);
    }

    #[test]
    fn test_grid_covers_source() {
        let sampling = SamplingConfig::default();
        let (tx, ty) = sampling.threads_per_group;
        for width in 1..300 {
            for height in [1, 7, 64, 65, 255, 1080] {
                let grid = DispatchGrid::new(width, height, &sampling);
                assert!(grid.groups.0 * tx * sampling.downsample * sampling.crop.0 >= width);
                assert!(grid.groups.1 * ty * sampling.downsample * sampling.crop.1 >= height);
            }
        }
    }

    #[test]
    fn test_grid_crop_is_centered_and_in_bounds() {
        let sampling = SamplingConfig {
            crop: (2, 3),
            ..SamplingConfig::default()
        };
        for dim in [9u32, 100, 1001, 2016] {
            let grid = DispatchGrid::new(dim, dim, &sampling);
            let last_x = grid.origin.0 + (grid.sampled.0 - 1) * sampling.downsample;
            let last_y = grid.origin.1 + (grid.sampled.1 - 1) * sampling.downsample;
            assert!(last_x < dim && last_y < dim, "dim {} samples out of bounds", dim);
            assert!(grid.groups.0 * 16 * sampling.downsample * 2 >= dim);
            assert!(grid.groups.1 * 16 * sampling.downsample * 3 >= dim);
        }

        let grid = DispatchGrid::new(100, 90, &sampling);
        assert_eq!(grid.origin, (25, 30));
        assert_eq!(grid.sampled, (13, 8));
    }

    #[test]
    fn test_uniforms_layout() {
        assert_eq!(std::mem::size_of::<ReductionUniforms>(), 32);
        let sampling = SamplingConfig::default();
        let uniforms = DispatchGrid::new(64, 32, &sampling).uniforms(&sampling);
        assert_eq!(uniforms.sampled, [16, 8]);
        assert_eq!(uniforms.downsample, 4);
        assert_eq!(uniforms.scale, 100);
    }
}
