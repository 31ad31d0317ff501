// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sampling helpers shared by the CPU shaders.

use nublur_encoding::weights::{blend_alpha, effective_sigma};
use nublur_encoding::GaussianParams;

use super::CpuTexture;

/// Bilinear sample with clamp-to-edge addressing, matching the single static
/// sampler the GPU pipelines use.
pub fn sample_bilinear_clamp(tex: &CpuTexture, uv: [f32; 2]) -> [f32; 4] {
    let tx = uv[0] * tex.width as f32 - 0.5;
    let ty = uv[1] * tex.height as f32 - 0.5;
    let x0 = tx.floor();
    let y0 = ty.floor();
    let fx = tx - x0;
    let fy = ty - y0;
    let clamp_x = |x: f32| (x.max(0.0) as usize).min(tex.width - 1);
    let clamp_y = |y: f32| (y.max(0.0) as usize).min(tex.height - 1);
    let (x0, x1) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (y0, y1) = (clamp_y(y0), clamp_y(y0 + 1.0));
    let c00 = tex.texel(x0, y0);
    let c10 = tex.texel(x1, y0);
    let c01 = tex.texel(x0, y1);
    let c11 = tex.texel(x1, y1);
    let mut out = [0.0; 4];
    for ch in 0..4 {
        let top = c00[ch] + (c10[ch] - c00[ch]) * fx;
        let bottom = c01[ch] + (c11[ch] - c01[ch]) * fx;
        out[ch] = top + (bottom - top) * fy;
    }
    out
}

/// Per-pixel blend alpha; the CPU mirror of `pass_alpha` in
/// `shader/shared/gaussian.wgsl`.
pub fn pass_alpha(params: &GaussianParams, uv: [f32; 2]) -> f32 {
    let pos = [uv[0] * 2.0 - 1.0, uv[1] * 2.0 - 1.0];
    let sigma = effective_sigma(
        params.sigma,
        pos,
        params.focus,
        params.falloff,
        params.falloff_exponent,
    );
    blend_alpha(sigma, params.level, params.num_levels)
}

/// Pixel center uv within an extent.
pub fn texel_center_uv(x: usize, y: usize, width: usize, height: usize) -> [f32; 2] {
    [
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::{sample_bilinear_clamp, CpuTexture};

    #[test]
    fn center_tap_averages_quad() {
        let mut tex = CpuTexture::new(2, 2);
        tex.set_texel(0, 0, [1.0, 0.0, 0.0, 1.0]);
        tex.set_texel(1, 0, [0.0, 1.0, 0.0, 1.0]);
        tex.set_texel(0, 1, [0.0, 0.0, 1.0, 1.0]);
        tex.set_texel(1, 1, [0.0, 0.0, 0.0, 1.0]);
        let c = sample_bilinear_clamp(&tex, [0.5, 0.5]);
        assert_eq!(c, [0.25, 0.25, 0.25, 1.0]);
    }

    #[test]
    fn out_of_range_clamps_to_edge() {
        let mut tex = CpuTexture::new(2, 1);
        tex.set_texel(0, 0, [0.25, 0.25, 0.25, 1.0]);
        tex.set_texel(1, 0, [0.75, 0.75, 0.75, 1.0]);
        assert_eq!(sample_bilinear_clamp(&tex, [0.0, 0.5])[0], 0.25);
        assert_eq!(sample_bilinear_clamp(&tex, [1.0, 0.5])[0], 0.75);
    }
}
