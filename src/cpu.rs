//! CPU reference for the luminance reduction.
//!
//! Walks the same sample positions as the kernel and rounds the same way,
//! so its sum is what the GPU readback should report for an RGBA8 frame.

use rayon::prelude::*;

use crate::gpu::DispatchGrid;

const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Scaled luma contribution of one RGBA8 texel
#[inline]
pub fn texel_contribution(rgba: &[u8], scale: u32) -> u32 {
    let luma = LUMA[0] * (rgba[0] as f32 / 255.0)
        + LUMA[1] * (rgba[1] as f32 / 255.0)
        + LUMA[2] * (rgba[2] as f32 / 255.0);
    // WGSL round() ties to even
    (luma.clamp(0.0, 1.0) * scale as f32).round_ties_even() as u32
}

/// Sum of scaled luma over `grid`'s samples of a tightly packed RGBA8 frame
pub fn reference_sum(
    pixels: &[u8],
    width: u32,
    height: u32,
    grid: &DispatchGrid,
    downsample: u32,
    scale: u32,
) -> u64 {
    let row_bytes = width as usize * 4;
    let downsample = downsample.max(1);

    (0..grid.sampled.1)
        .into_par_iter()
        .map(|gy| {
            let y = grid.origin.1 + gy * downsample;
            if y >= height {
                return 0u64;
            }
            let row = &pixels[y as usize * row_bytes..(y as usize + 1) * row_bytes];
            (0..grid.sampled.0)
                .map(|gx| grid.origin.0 + gx * downsample)
                .take_while(|&x| x < width)
                .map(|x| texel_contribution(&row[x as usize * 4..x as usize * 4 + 4], scale) as u64)
                .sum::<u64>()
        })
        .sum()
}
