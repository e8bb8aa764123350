//! Luminance kernel: source lookup and compute pipeline creation

use std::borrow::Cow;
use std::path::PathBuf;

use super::context::GpuContext;
use crate::error::{BrightnessError, Result};

/// WGSL compiled into the binary, used when no file candidate is found
pub const EMBEDDED_KERNEL: &str = include_str!("shaders/luminance.wgsl");

/// Compute entry point in the kernel source
pub const ENTRY_POINT: &str = "main";

/// One place the kernel source may come from
#[derive(Debug, Clone)]
pub enum KernelSource {
    File(PathBuf),
    Embedded { name: &'static str, source: &'static str },
}

impl KernelSource {
    pub fn describe(&self) -> String {
        match self {
            KernelSource::File(path) => path.display().to_string(),
            KernelSource::Embedded { name, .. } => format!("<embedded {}>", name),
        }
    }

    fn load(&self) -> std::result::Result<Cow<'static, str>, String> {
        match self {
            KernelSource::File(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
                if source.trim().is_empty() {
                    return Err("file is empty".to_string());
                }
                Ok(Cow::Owned(source))
            }
            KernelSource::Embedded { source, .. } => Ok(Cow::Borrowed(source)),
        }
    }
}

/// Kernel source text plus where it was found
#[derive(Debug, Clone)]
pub struct LoadedKernel {
    pub origin: String,
    pub source: Cow<'static, str>,
}

/// Ordered list of kernel candidates; the first one that loads wins.
///
/// The default list ends with the kernel embedded in the binary, so with it
/// loading cannot fail. `KernelLoad` is only reachable with a custom list
/// that has no embedded entry.
#[derive(Debug, Clone)]
pub struct KernelLocator {
    candidates: Vec<KernelSource>,
}

impl Default for KernelLocator {
    fn default() -> Self {
        Self::new(vec![
            KernelSource::File(PathBuf::from("luminance.wgsl")),
            KernelSource::File(PathBuf::from("shaders/luminance.wgsl")),
            KernelSource::File(PathBuf::from("src/gpu/shaders/luminance.wgsl")),
            KernelSource::Embedded {
                name: "luminance.wgsl",
                source: EMBEDDED_KERNEL,
            },
        ])
    }
}

impl KernelLocator {
    pub fn new(candidates: Vec<KernelSource>) -> Self {
        Self { candidates }
    }

    #[cfg(test)]
    pub fn candidates(&self) -> &[KernelSource] {
        &self.candidates
    }

    pub fn load(&self) -> Result<LoadedKernel> {
        for candidate in &self.candidates {
            match candidate.load() {
                Ok(source) => {
                    let origin = candidate.describe();
                    log::info!("Loaded luminance kernel from {}", origin);
                    return Ok(LoadedKernel { origin, source });
                }
                Err(e) => {
                    log::debug!("Kernel candidate {} unavailable: {}", candidate.describe(), e)
                }
            }
        }

        Err(BrightnessError::KernelLoad {
            tried: self.candidates.iter().map(KernelSource::describe).collect(),
        })
    }
}

/// Compiled luminance reduction pipeline and its binding layout
pub struct LuminanceKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl LuminanceKernel {
    pub fn new(ctx: &GpuContext, locator: &KernelLocator) -> Result<Self> {
        let loaded = locator.load()?;

        let bind_group_layout = ctx
            .validated(|device| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Luminance Bind Group Layout"),
                    entries: &[
                        // source image (read-only)
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        // accumulator (atomic u32)
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: false },
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(4),
                            },
                            count: None,
                        },
                        // uniforms
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                })
            })
            .map_err(BrightnessError::ViewCreation)?;

        let pipeline = ctx
            .validated(|device| {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("Luminance Compute Shader"),
                    source: wgpu::ShaderSource::Wgsl(loaded.source.clone()),
                });

                let pipeline_layout =
                    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("Luminance Pipeline Layout"),
                        bind_group_layouts: &[&bind_group_layout],
                        push_constant_ranges: &[],
                    });

                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Luminance Compute Pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(ENTRY_POINT),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })
            .map_err(|e| BrightnessError::KernelCreation(format!("{}: {}", loaded.origin, e)))?;

        Ok(Self {
            pipeline,
            bind_group_layout,
        })
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("adaptive_brightness_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_first_available_candidate_wins() {
        let first = scratch_path("first.wgsl");
        let second = scratch_path("second.wgsl");
        std::fs::write(&second, "// second").unwrap();

        let locator = KernelLocator::new(vec![
            KernelSource::File(first.clone()),
            KernelSource::File(second.clone()),
            KernelSource::Embedded { name: "fallback", source: "// embedded" },
        ]);
        let loaded = locator.load().unwrap();
        assert_eq!(loaded.origin, second.display().to_string());
        assert_eq!(loaded.source, "// second");

        std::fs::remove_file(&second).unwrap();
    }

    #[test]
    fn test_empty_file_is_skipped() {
        let empty = scratch_path("empty.wgsl");
        std::fs::write(&empty, "  \n").unwrap();

        let locator = KernelLocator::new(vec![
            KernelSource::File(empty.clone()),
            KernelSource::Embedded { name: "fallback", source: "// embedded" },
        ]);
        assert_eq!(locator.load().unwrap().origin, "<embedded fallback>");

        std::fs::remove_file(&empty).unwrap();
    }

    #[test]
    fn test_all_missing_is_kernel_load_error() {
        let locator = KernelLocator::new(vec![
            KernelSource::File(scratch_path("nope_a.wgsl")),
            KernelSource::File(scratch_path("nope_b.wgsl")),
        ]);
        match locator.load() {
            Err(BrightnessError::KernelLoad { tried }) => assert_eq!(tried.len(), 2),
            other => panic!("expected KernelLoad, got {:?}", other.map(|k| k.origin)),
        }
    }

    #[test]
    fn test_default_locator_ends_with_embedded() {
        let locator = KernelLocator::default();
        assert!(matches!(locator.candidates().last(), Some(KernelSource::Embedded { .. })));
        assert!(EMBEDDED_KERNEL.contains("@workgroup_size(16, 16, 1)"));
    }
}
