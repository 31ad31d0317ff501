// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU twins of the reconstruction shaders: `shader/upsample.wgsl`,
//! `shader/upsample_blend.wgsl` and `shader/upsample_final.wgsl`.

use nublur_encoding::GaussianParams;

use super::util::{pass_alpha, sample_bilinear_clamp, texel_center_uv};
use super::CpuBinding;

pub fn upsample(_wg_count: [u32; 3], resources: &[CpuBinding]) {
    let params = resources[0].as_typed::<GaussianParams>();
    let fine = resources[2].as_texture();
    let coarse = resources[3].as_texture();
    let mut dst = resources[4].as_texture_rw();
    let (width, height) = (dst.width, dst.height);
    for y in 0..height {
        for x in 0..width {
            let uv = texel_center_uv(x, y, width, height);
            let alpha = pass_alpha(params, uv);
            let fine_color = sample_bilinear_clamp(fine, uv);
            let coarse_color = sample_bilinear_clamp(coarse, uv);
            let mut color = [0.0; 4];
            for ch in 0..4 {
                color[ch] = coarse_color[ch] + (fine_color[ch] - coarse_color[ch]) * alpha;
            }
            dst.set_texel(x, y, color);
        }
    }
}

pub fn upsample_blend(uv: [f32; 2], resources: &[CpuBinding]) -> [f32; 4] {
    let params = resources[0].as_typed::<GaussianParams>();
    let coarse = sample_bilinear_clamp(resources[2].as_texture(), uv);
    [coarse[0], coarse[1], coarse[2], 1.0 - pass_alpha(params, uv)]
}

pub fn upsample_final(uv: [f32; 2], resources: &[CpuBinding]) -> [f32; 4] {
    let params = resources[0].as_typed::<GaussianParams>();
    let alpha = pass_alpha(params, uv);
    let sharp = sample_bilinear_clamp(resources[2].as_texture(), uv);
    let coarse = sample_bilinear_clamp(resources[3].as_texture(), uv);
    let mut color = [0.0; 4];
    for ch in 0..4 {
        color[ch] = coarse[ch] + (sharp[ch] - coarse[ch]) * alpha;
    }
    color
}
