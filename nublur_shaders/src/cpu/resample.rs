// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU twins of `shader/resample.wgsl` and `shader/resample_draw.wgsl`.

use super::util::{sample_bilinear_clamp, texel_center_uv};
use super::CpuBinding;

pub fn resample(_wg_count: [u32; 3], resources: &[CpuBinding]) {
    let src = resources[1].as_texture();
    let mut dst = resources[2].as_texture_rw();
    let (width, height) = (dst.width, dst.height);
    for y in 0..height {
        for x in 0..width {
            let uv = texel_center_uv(x, y, width, height);
            dst.set_texel(x, y, sample_bilinear_clamp(src, uv));
        }
    }
}

pub fn resample_draw(uv: [f32; 2], resources: &[CpuBinding]) -> [f32; 4] {
    sample_bilinear_clamp(resources[1].as_texture(), uv)
}
