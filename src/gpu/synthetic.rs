//! Uniform-gray test surface, standing in for the compositor mirror texture

use super::context::GpuContext;
use crate::error::{BrightnessError, Result};
use crate::runtime::{SourceImage, SurfaceSource};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A `width`×`height` texture filled with one gray level.
///
/// With a non-zero `sweep_step` the level advances on every acquisition,
/// wrapping past 255, so the loop sees a changing scene.
pub struct SyntheticSurface {
    width: u32,
    height: u32,
    level: u8,
    sweep_step: u8,
    texture: Option<wgpu::Texture>,
    uploaded_level: Option<u8>,
}

impl SyntheticSurface {
    pub fn uniform(width: u32, height: u32, level: u8) -> Self {
        Self {
            width,
            height,
            level,
            sweep_step: 0,
            texture: None,
            uploaded_level: None,
        }
    }

    pub fn sweeping(width: u32, height: u32, start: u8, step: u8) -> Self {
        Self {
            sweep_step: step,
            ..Self::uniform(width, height, start)
        }
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = level;
    }

    /// RGBA8 bytes of the current frame, for CPU-side comparison
    pub fn pixels(&self) -> Vec<u8> {
        let texels = self.width as usize * self.height as usize;
        let mut pixels = Vec::with_capacity(texels * 4);
        for _ in 0..texels {
            pixels.extend_from_slice(&[self.level, self.level, self.level, 255]);
        }
        pixels
    }

    fn create_texture(&self, ctx: &GpuContext) -> wgpu::Texture {
        ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Synthetic Source Texture"),
            size: self.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }

    fn upload(&mut self, ctx: &GpuContext, texture: &wgpu::Texture) {
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            self.extent(),
        );
        self.uploaded_level = Some(self.level);
    }
}

impl SurfaceSource for SyntheticSurface {
    fn acquire(&mut self, ctx: &GpuContext) -> Result<SourceImage> {
        if self.width == 0 || self.height == 0 {
            return Err(BrightnessError::SurfaceAcquisition(format!(
                "synthetic surface is {}x{}",
                self.width, self.height
            )));
        }

        let texture = match self.texture.take() {
            Some(texture) => texture,
            None => self.create_texture(ctx),
        };
        if self.uploaded_level != Some(self.level) {
            self.upload(ctx, &texture);
        }

        let view = texture.create_view(&Default::default());
        self.texture = Some(texture);

        let image = SourceImage {
            view,
            width: self.width,
            height: self.height,
            format: FORMAT,
        };

        if self.sweep_step != 0 {
            self.set_level(self.level.wrapping_add(self.sweep_step));
        }
        Ok(image)
    }
}
