// Copyright 2025 the Nublur Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytemuck::{Pod, Zeroable};

use crate::weights::Falloff;

/// Per-pass constants consumed by the upsample shaders.
///
/// This struct must be kept in sync with `GaussianParams` in
/// `nublur_shaders/shader/shared/gaussian.wgsl`.
#[derive(Clone, Copy, Debug, Default, Zeroable, Pod)]
#[repr(C)]
pub struct GaussianParams {
    /// Focus point in [-1, 1] image space.
    pub focus: [f32; 2],
    /// Gaussian standard deviation in pixels at the point of maximum blur.
    pub sigma: f32,
    /// Pyramid level written by this pass.
    pub level: u32,
    /// Total level count of the pyramid.
    pub num_levels: u32,
    /// Falloff policy kind, one of the `weights::FALLOFF_*` constants.
    pub falloff: u32,
    /// Exponent applied to the focus distance by the radial falloff.
    pub falloff_exponent: f32,
    pub pad0: u32,
}

impl GaussianParams {
    pub fn new(
        focus: [f32; 2],
        sigma: f32,
        level: u32,
        num_levels: u32,
        falloff: Falloff,
    ) -> Self {
        Self {
            focus,
            sigma,
            level,
            num_levels,
            falloff: falloff.kind(),
            falloff_exponent: falloff.exponent(),
            pad0: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GaussianParams;

    #[test]
    fn matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<GaussianParams>(), 32);
        assert_eq!(std::mem::offset_of!(GaussianParams, sigma), 8);
        assert_eq!(std::mem::offset_of!(GaussianParams, falloff_exponent), 24);
    }
}
